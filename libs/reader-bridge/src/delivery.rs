use std::sync::Arc;

use reader_api::{Message, MessageReader, SourceError};

use crate::{CloseReason, FlowController, MessageEncoder, StatsCounters, WireTransport};

// ═══════════════════════════════════════════════════════════════
//  DeliveryLoop: pull → encode → push
// ═══════════════════════════════════════════════════════════════

/// Цикл доставки одной сессии.
///
/// Каждый следующий pull ставится в очередь runtime'а через
/// `tokio::spawn`, а не вызывается рекурсивно: пачка уже
/// буферизованных сообщений иначе резолвится синхронно и растит стек.
pub(crate) struct DeliveryLoop {
    pub(crate) reader: Arc<dyn MessageReader>,
    pub(crate) transport: Arc<dyn WireTransport>,
    pub(crate) flow: FlowController,
    pub(crate) stats: StatsCounters,
    encoder: MessageEncoder,
}

impl DeliveryLoop {
    pub(crate) fn new(
        reader: Arc<dyn MessageReader>,
        transport: Arc<dyn WireTransport>,
        flow: FlowController,
    ) -> Self {
        Self {
            reader,
            transport,
            flow,
            stats: StatsCounters::new(),
            encoder: MessageEncoder,
        }
    }

    /// Запланировать pull. После Closed: no-op.
    pub(crate) fn schedule_pull(self: &Arc<Self>) {
        if self.flow.is_closed() {
            return;
        }
        let this = self.clone();
        tokio::spawn(async move { this.pull().await });
    }

    async fn pull(self: Arc<Self>) {
        tracing::debug!(
            remote = %self.transport.remote(),
            topic = %self.reader.topic(),
            subscription = %self.reader.subscription(),
            "receive next message"
        );
        match self.reader.read_next().await {
            Ok(msg) => self.on_pull_complete(msg),
            Err(e) => self.on_pull_failed(e),
        }
    }

    pub(crate) fn on_pull_complete(self: &Arc<Self>, msg: Message) {
        if self.flow.is_closed() {
            tracing::debug!(
                subscription = %self.reader.subscription(),
                message_id = ?msg.id,
                "session closed, dropping message"
            );
            return;
        }
        tracing::debug!(
            remote = %self.transport.remote(),
            topic = %self.reader.topic(),
            subscription = %self.reader.subscription(),
            message_id = ?msg.id,
            "got message"
        );

        let frame = match self.encoder.encode(&msg) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(
                    topic = %self.reader.topic(),
                    subscription = %self.reader.subscription(),
                    message_id = ?msg.id,
                    error = %e,
                    "failed to serialize message"
                );
                self.shutdown(CloseReason::FailedToSerialize);
                return;
            }
        };
        let size = msg.size() as u64;

        // Кредит берётся до постановки frame'а в очередь: ack или ошибка
        // отправки этого сообщения не могут обогнать инкремент.
        let pipeline = self.flow.try_pipeline_after_pull();
        let completion = self.transport.send_text(frame);

        let this = self.clone();
        tokio::spawn(async move {
            match completion.await {
                Ok(()) => {
                    tracing::debug!(
                        topic = %this.reader.topic(),
                        subscription = %this.reader.subscription(),
                        remote = %this.transport.remote(),
                        "message is delivered successfully"
                    );
                    this.stats.record_delivery(size);
                }
                Err(e) => {
                    tracing::warn!(
                        topic = %this.reader.topic(),
                        subscription = %this.reader.subscription(),
                        remote = %this.transport.remote(),
                        error = %e,
                        "failed to deliver msg"
                    );
                    if this.flow.release_on_push_failure() {
                        this.schedule_pull();
                    }
                }
            }
        });

        if pipeline {
            self.schedule_pull();
        }
    }

    /// После закрытия сессии ошибка чтения ожидаема и молча игнорируется.
    /// Пока сессия открыта, любая ошибка (в том числе reader, закрытый
    /// извне) терминальна: окно не перевзводится, клиент получает close.
    pub(crate) fn on_pull_failed(&self, error: SourceError) {
        if self.flow.is_closed() {
            tracing::debug!(
                subscription = %self.reader.subscription(),
                error = %error,
                "read stopped"
            );
            return;
        }
        tracing::warn!(
            topic = %self.reader.topic(),
            subscription = %self.reader.subscription(),
            remote = %self.transport.remote(),
            error = ?error,
            "failed to read message"
        );
        self.shutdown(CloseReason::ReaderFailed);
    }

    /// Терминальная остановка по инициативе сервера. Дерегистрацию и
    /// закрытие reader'а выполнит `SessionBridge::close()`, когда
    /// transport сообщит о закрытии соединения.
    pub(crate) fn shutdown(&self, reason: CloseReason) {
        if self.flow.close() {
            self.transport.close(reason);
        }
    }
}
