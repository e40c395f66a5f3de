mod http;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio_util::sync::CancellationToken;

use reader_api::{Authorizer, ReaderFactory, TopicCatalog};
use reader_bridge::ReaderRegistry;

/// Внешние зависимости API сервера.
#[derive(Clone)]
pub struct ApiServices {
    pub factory: Arc<dyn ReaderFactory>,
    pub catalog: Arc<dyn TopicCatalog>,
    pub authorizer: Arc<dyn Authorizer>,
    pub registry: Arc<ReaderRegistry>,
}

#[derive(Clone)]
struct AppState {
    services: ApiServices,
    /// Заголовок запроса, в котором клиент передаёт свою роль.
    role_header: Arc<str>,
}

/// Topic-based HTTP + WebSocket API сервер.
pub async fn run(
    port: u16,
    services: ApiServices,
    role_header: &str,
    shutdown: CancellationToken,
) -> Result<(), String> {
    let state = AppState {
        services,
        role_header: Arc::from(role_header.to_ascii_lowercase()),
    };

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .map_err(|e| format!("bind api :{port}: {e}"))?;

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.cancelled_owned())
    .await
    .map_err(|e| format!("axum serve: {e}"))?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/topics", get(http::handle_list_topics))
        .route("/api/topics/{name}/messages", post(http::handle_publish))
        .route("/api/readers", get(http::handle_list_readers))
        .route("/ws/reader/{topic}", get(ws::handle_reader))
        .with_state(state)
}
