use std::future::Future;
use std::pin::Pin;

use crate::TransportError;

/// Причина терминального закрытия соединения со стороны сервера.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Сообщение не удалось сериализовать в JSON.
    FailedToSerialize,
    /// Источник вернул ошибку чтения.
    ReaderFailed,
    /// Сервер останавливается.
    GoingAway,
}

impl CloseReason {
    /// WebSocket close code.
    pub fn code(self) -> u16 {
        match self {
            CloseReason::FailedToSerialize | CloseReason::ReaderFailed => 1011,
            CloseReason::GoingAway => 1001,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            CloseReason::FailedToSerialize => "Failed to serialize to JSON",
            CloseReason::ReaderFailed => "Failed to read message",
            CloseReason::GoingAway => "Server shutting down",
        }
    }
}

/// Push-based transport к клиенту.
///
/// `send_text` ставит frame в очередь отправки сразу, а возвращённый
/// future резолвится результатом фактической записи. Future не
/// заимствует transport и может ожидаться в отдельной задаче.
pub trait WireTransport: Send + Sync {
    fn send_text(&self, frame: String)
        -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'static>>;

    /// Закрыть соединение с указанной причиной. Повторные вызовы: no-op.
    fn close(&self, reason: CloseReason);

    /// Адрес клиента для логов.
    fn remote(&self) -> &str;
}
