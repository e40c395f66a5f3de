use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{ConnectInfo, Path, Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::sync::{mpsc, oneshot};

use reader_bridge::{
    BridgeError, CloseReason, PendingBridge, ReaderParams, SessionBridge, TransportError,
    WireTransport,
};

use super::AppState;

// ═══════════════════════════════════════════════════════════════
//  WebSocket: /ws/reader/{topic}?readerName=&receiverQueueSize=&messageId=
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_reader(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let remote = addr.to_string();
    let role = headers
        .get(&*state.role_header)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let prepared = match ReaderParams::from_query(&query) {
        Ok(params) => {
            SessionBridge::prepare(
                state.services.factory.as_ref(),
                state.services.authorizer.as_ref(),
                &topic,
                role,
                params,
            )
            .await
        }
        Err(e) => Err(e),
    };

    let pending = match prepared {
        Ok(pending) => pending,
        Err(e) => {
            tracing::warn!(%remote, %topic, error = %e, "reader rejected");
            return rejection(&e).into_response();
        }
    };

    tracing::info!(
        %remote,
        %topic,
        subscription = pending.subscription(),
        "reader created"
    );

    // Reader уже создан: если upgrade сорвётся, его нужно закрыть.
    let slot = Arc::new(Mutex::new(Some(pending)));
    let on_failed = slot.clone();

    ws.on_failed_upgrade(move |e| {
        tracing::warn!(error = %e, "websocket upgrade failed");
        if let Some(pending) = take(&on_failed) {
            tokio::spawn(pending.abandon());
        }
    })
    .on_upgrade(move |socket| async move {
        if let Some(pending) = take(&slot) {
            reader_connection(socket, state, pending, remote).await;
        }
    })
}

fn take(slot: &Mutex<Option<PendingBridge>>) -> Option<PendingBridge> {
    slot.lock().unwrap_or_else(|e| e.into_inner()).take()
}

/// HTTP-ответ на отказ до upgrade.
fn rejection(err: &BridgeError) -> (StatusCode, &'static str) {
    match err {
        BridgeError::Unauthorized { .. } => (StatusCode::UNAUTHORIZED, "Failed to authorize"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create reader"),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Transport
// ═══════════════════════════════════════════════════════════════

/// Команда из bridge → WS writer.
enum Outbound {
    Frame(String, oneshot::Sender<Result<(), TransportError>>),
    Close(CloseReason),
}

struct WsTransport {
    tx: mpsc::UnboundedSender<Outbound>,
    remote: String,
}

impl WireTransport for WsTransport {
    fn send_text(
        &self,
        frame: String,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'static>> {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Outbound::Frame(frame, done_tx)).is_err() {
            return Box::pin(async { Err(TransportError::Closed) });
        }
        // Writer ушёл, не ответив: соединение уже закрыто.
        Box::pin(async move { done_rx.await.unwrap_or(Err(TransportError::Closed)) })
    }

    fn close(&self, reason: CloseReason) {
        let _ = self.tx.send(Outbound::Close(reason));
    }

    fn remote(&self) -> &str {
        &self.remote
    }
}

// ═══════════════════════════════════════════════════════════════
//  Connection handler
// ═══════════════════════════════════════════════════════════════

async fn reader_connection(
    mut socket: WebSocket,
    state: AppState,
    pending: PendingBridge,
    remote: String,
) {
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
    let transport = Arc::new(WsTransport { tx: out_tx, remote });
    let bridge = pending.attach(transport, state.services.registry.clone());

    loop {
        tokio::select! {
            biased;

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => bridge.on_client_text(text.as_str()),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(remote = bridge.remote(), error = %e, "websocket recv");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }

            out = out_rx.recv() => {
                match out {
                    Some(Outbound::Frame(text, done)) => {
                        let result = socket
                            .send(Message::Text(text.into()))
                            .await
                            .map_err(|e| TransportError::Send(e.to_string()));
                        let _ = done.send(result);
                    }
                    Some(Outbound::Close(reason)) => {
                        let frame = CloseFrame {
                            code: reason.code(),
                            reason: reason.reason().into(),
                        };
                        let _ = socket.send(Message::Close(Some(frame))).await;
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    tracing::info!(
        remote = bridge.remote(),
        topic = bridge.topic(),
        subscription = bridge.subscription(),
        delivered = bridge.msg_delivered_counter(),
        "reader closed"
    );
    bridge.close();
}
