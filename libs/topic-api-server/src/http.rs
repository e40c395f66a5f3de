use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use reader_bridge::SessionInfo;

use super::AppState;

// ═══════════════════════════════════════════════════════════════
//  REST: GET /api/topics
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_list_topics(State(state): State<AppState>) -> impl IntoResponse {
    let names = state.services.catalog.topics();
    axum::Json(names).into_response()
}

// ═══════════════════════════════════════════════════════════════
//  REST: POST /api/topics/{name}/messages
// ═══════════════════════════════════════════════════════════════

#[derive(Deserialize)]
pub(crate) struct PublishRequest {
    /// Base64 (standard alphabet).
    payload: String,
    #[serde(default)]
    properties: HashMap<String, String>,
    #[serde(default)]
    key: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    message_id: String,
}

pub(crate) async fn handle_publish(
    State(state): State<AppState>,
    Path(name): Path<String>,
    axum::Json(req): axum::Json<PublishRequest>,
) -> impl IntoResponse {
    let payload = match STANDARD.decode(req.payload.as_bytes()) {
        Ok(p) => p,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("error: payload: {e}")).into_response();
        }
    };

    match state
        .services
        .catalog
        .publish(&name, payload, req.properties, req.key)
        .await
    {
        Ok(id) => axum::Json(PublishResponse {
            message_id: id.to_base64(),
        })
        .into_response(),
        Err(e) => (StatusCode::NOT_FOUND, format!("error: {e}")).into_response(),
    }
}

// ═══════════════════════════════════════════════════════════════
//  REST: GET /api/readers
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_list_readers(State(state): State<AppState>) -> impl IntoResponse {
    let readers: Vec<SessionInfo> = state
        .services
        .registry
        .sessions()
        .iter()
        .map(|s| s.info())
        .collect();
    axum::Json(readers).into_response()
}
