use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;

use reader_api::{Authorizer, MessageReader, ReaderFactory, SubscriptionType};

use crate::delivery::DeliveryLoop;
use crate::{
    BridgeError, CloseReason, DeliveryStats, FlowController, FlowState, ReaderParams,
    SessionRegistry, WireTransport, WindowSize,
};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

// ═══════════════════════════════════════════════════════════════
//  PendingBridge: reader создан, transport ещё не установлен
// ═══════════════════════════════════════════════════════════════

/// Первая фаза создания сессии. Пока она не привязана к transport'у,
/// ошибку ещё можно вернуть клиенту как HTTP-ответ.
pub struct PendingBridge {
    topic: String,
    window: WindowSize,
    reader: Arc<dyn MessageReader>,
}

impl PendingBridge {
    pub fn subscription(&self) -> &str {
        self.reader.subscription()
    }

    /// Привязать к transport'у: регистрация в registry и первый pull.
    pub fn attach(
        self,
        transport: Arc<dyn WireTransport>,
        registry: Arc<dyn SessionRegistry>,
    ) -> Arc<SessionBridge> {
        let remote = transport.remote().to_string();
        let delivery = Arc::new(DeliveryLoop::new(
            self.reader,
            transport,
            FlowController::new(self.window),
        ));
        let bridge = Arc::new(SessionBridge {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            topic: self.topic,
            remote,
            delivery,
            registry: registry.clone(),
            closed: AtomicBool::new(false),
        });

        if !registry.add(bridge.clone()) {
            tracing::warn!(
                remote = %bridge.remote,
                topic = %bridge.topic,
                "failed to add reader handler"
            );
        }
        bridge.delivery.schedule_pull();
        bridge
    }

    /// Upgrade не состоялся: закрыть созданный reader.
    pub async fn abandon(self) {
        if let Err(e) = self.reader.close().await {
            tracing::warn!(topic = %self.topic, error = ?e, "failed to close reader");
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  SessionBridge
// ═══════════════════════════════════════════════════════════════

/// Живая сессия: reader топика ↔ WebSocket клиента.
///
/// Владеет reader'ом, счётчиками и flow control'ом. Transport-слой
/// сообщает ей о входящих text frame'ах и о закрытии соединения.
pub struct SessionBridge {
    id: u64,
    topic: String,
    remote: String,
    delivery: Arc<DeliveryLoop>,
    registry: Arc<dyn SessionRegistry>,
    closed: AtomicBool,
}

/// Сведения о сессии для introspection (не сбрасывают счётчики).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: u64,
    pub topic: String,
    pub subscription: String,
    pub subscription_type: SubscriptionType,
    pub remote: String,
    pub msg_delivered_counter: u64,
    pub pending: usize,
    pub window_size: usize,
    pub state: FlowState,
}

impl SessionBridge {
    pub fn is_authorized(authorizer: &dyn Authorizer, topic: &str, role: &str) -> bool {
        authorizer.can_consume(topic, role)
    }

    /// Проверить права и создать reader на стартовой позиции.
    pub async fn prepare(
        factory: &dyn ReaderFactory,
        authorizer: &dyn Authorizer,
        topic: &str,
        role: &str,
        params: ReaderParams,
    ) -> Result<PendingBridge, BridgeError> {
        if !Self::is_authorized(authorizer, topic, role) {
            return Err(BridgeError::Unauthorized {
                topic: topic.to_string(),
                role: role.to_string(),
            });
        }

        let reader = factory
            .create_reader(topic, params.start.clone(), params.reader_options())
            .await
            .map_err(|source| BridgeError::ReaderCreate {
                topic: topic.to_string(),
                source,
            })?;

        Ok(PendingBridge {
            topic: topic.to_string(),
            window: params.window,
            reader,
        })
    }

    /// Входящий text frame: это ack, содержимое не разбирается.
    pub fn on_client_text(&self, _frame: &str) {
        if self.delivery.flow.release_on_ack() {
            self.delivery.schedule_pull();
        }
    }

    /// Идемпотентно закрыть сессию. Безопасно при конкурентных вызовах
    /// и при pull'ах/отправках в полёте: после Closed их продолжения
    /// не запускают новых pull'ов.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.delivery.flow.close();

        if !self.registry.remove(self) {
            tracing::warn!(topic = %self.topic, "failed to remove reader handler");
        }

        let reader = self.delivery.reader.clone();
        let topic = self.topic.clone();
        tokio::spawn(async move {
            match reader.close().await {
                Ok(()) => tracing::debug!(%topic, "closed reader asynchronously"),
                Err(e) => tracing::warn!(%topic, error = ?e, "failed to close reader"),
            }
        });
    }

    /// Закрыть по инициативе сервера: клиент получает close frame с
    /// указанной причиной, затем сессия закрывается как при `close()`.
    /// Если сессия уже закрыта, close frame не отправляется.
    pub fn shutdown(&self, reason: CloseReason) {
        self.delivery.shutdown(reason);
        self.close();
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn subscription(&self) -> &str {
        self.delivery.reader.subscription()
    }

    pub fn subscription_type(&self) -> SubscriptionType {
        SubscriptionType::Exclusive
    }

    pub fn take_stats(&self) -> DeliveryStats {
        self.delivery.stats.take_snapshot()
    }

    pub fn take_msgs_delivered(&self) -> u64 {
        self.delivery.stats.take_msgs_delivered()
    }

    pub fn take_bytes_delivered(&self) -> u64 {
        self.delivery.stats.take_bytes_delivered()
    }

    pub fn msg_delivered_counter(&self) -> u64 {
        self.delivery.stats.msg_delivered_counter()
    }

    pub fn pending(&self) -> usize {
        self.delivery.flow.pending()
    }

    pub fn window_size(&self) -> usize {
        self.delivery.flow.window()
    }

    pub fn state(&self) -> FlowState {
        self.delivery.flow.state()
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            topic: self.topic.clone(),
            subscription: self.subscription().to_string(),
            subscription_type: self.subscription_type(),
            remote: self.remote.clone(),
            msg_delivered_counter: self.msg_delivered_counter(),
            pending: self.pending(),
            window_size: self.window_size(),
            state: self.state(),
        }
    }
}
