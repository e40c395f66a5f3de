#[derive(Debug, thiserror::Error)]
pub enum TopicError {
    #[error("topic '{0}' not found")]
    NotFound(String),

    #[error("invalid message id: expected 8 bytes, got {0}")]
    InvalidMessageId(usize),
}

impl TopicError {
    /// Convert to SourceError preserving the category.
    ///
    /// `NotFound` → NotFound kind, `InvalidMessageId` → Config kind.
    pub fn into_source_error(self) -> reader_api::SourceError {
        match self {
            TopicError::NotFound(_) => reader_api::SourceError::not_found(self.to_string()),
            TopicError::InvalidMessageId(_) => reader_api::SourceError::config(self.to_string()),
        }
    }
}
