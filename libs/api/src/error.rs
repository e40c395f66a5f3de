/// Category of a source error. Lets the bridge tell a closed reader
/// apart from a real failure and pick between a no-op and a terminal close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid configuration or start position: permanent.
    Config,
    /// I/O or network error.
    Io,
    /// Reader (or its topic) was closed.
    Closed,
    /// Requested entity does not exist.
    NotFound,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Config => f.write_str("config"),
            ErrorKind::Io => f.write_str("io"),
            ErrorKind::Closed => f.write_str("closed"),
            ErrorKind::NotFound => f.write_str("not found"),
        }
    }
}

/// Unified error type for all source-side trait methods.
///
/// Carries an `ErrorKind` for categorization and a human-readable message.
#[derive(Clone)]
pub struct SourceError {
    kind: ErrorKind,
    message: String,
}

impl SourceError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::NotFound, message: msg.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Config, message: msg.into() }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Io, message: msg.into() }
    }

    /// Reader already closed: pending and future reads fail with this.
    pub fn closed(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Closed, message: msg.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_closed(&self) -> bool {
        self.kind == ErrorKind::Closed
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Debug for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SourceError {}
