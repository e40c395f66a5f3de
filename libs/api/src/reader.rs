use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::{Message, MessageId, ReaderOptions, SourceError, StartPosition};

// ════════════════════════════════════════════════════════════════
//  Reader traits
// ════════════════════════════════════════════════════════════════

/// Pull-based reader над упорядоченным логом topic'а.
///
/// Следующее сообщение выдаётся только по явному `read_next()`.
/// Реализация должна допускать конкурентные вызовы `read_next()`:
/// каждое сообщение выдаётся ровно одному из них.
pub trait MessageReader: Send + Sync {
    /// Дождаться следующего сообщения. После `close()` возвращает
    /// ошибку с `ErrorKind::Closed`.
    fn read_next(&self) -> Pin<Box<dyn Future<Output = Result<Message, SourceError>> + Send + '_>>;

    /// Закрыть reader. Повторный вызов: no-op.
    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), SourceError>> + Send + '_>>;

    /// Идентификатор подписки, назначенный при создании.
    fn subscription(&self) -> &str;

    fn topic(&self) -> &str;
}

/// Фабрика reader'ов. Реализации: TopicRegistry (in-memory log).
pub trait ReaderFactory: Send + Sync {
    fn create_reader(
        &self,
        topic: &str,
        start: StartPosition,
        options: ReaderOptions,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn MessageReader>, SourceError>> + Send + '_>>;
}

/// Проверка права роли читать topic.
pub trait Authorizer: Send + Sync {
    fn can_consume(&self, topic: &str, role: &str) -> bool;
}

/// Список topic'ов и публикация в них (REST producer path).
pub trait TopicCatalog: Send + Sync {
    fn topics(&self) -> Vec<String>;

    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        properties: HashMap<String, String>,
        key: Option<String>,
    ) -> Pin<Box<dyn Future<Output = Result<MessageId, SourceError>> + Send + '_>>;
}
