use reader_api::SourceError;

/// Ошибки создания сессии. Все они фатальны для попытки подключения:
/// ни регистрации, ни чтения не происходит.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("role '{role}' is not authorized to consume '{topic}'")]
    Unauthorized { topic: String, role: String },

    #[error("invalid messageId: {0}")]
    InvalidMessageId(#[from] base64::DecodeError),

    #[error("invalid parameter {name}='{value}'")]
    InvalidParameter { name: &'static str, value: String },

    #[error("create reader ({topic}): {source}")]
    ReaderCreate { topic: String, source: SourceError },
}

/// Сообщение не удалось сериализовать в wire frame.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("publish time {0} ms is out of range")]
    PublishTime(i64),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Отправка frame'а в transport не удалась.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,

    #[error("send: {0}")]
    Send(String),
}
