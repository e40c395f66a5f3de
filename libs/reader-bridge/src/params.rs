use std::collections::HashMap;

use reader_api::{MessageId, ReaderOptions, StartPosition};

use crate::BridgeError;

pub const MAX_WINDOW_SIZE: usize = 1000;

/// Количество доставок, отправленных клиенту, но ещё не подтверждённых.
/// Всегда в диапазоне [1, MAX_WINDOW_SIZE].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize(usize);

impl WindowSize {
    pub fn new(requested: i64) -> Self {
        Self(requested.clamp(1, MAX_WINDOW_SIZE as i64) as usize)
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self(MAX_WINDOW_SIZE)
    }
}

/// Разобрать параметр `messageId`.
///
/// Пусто/нет → Latest, `"earliest"` → Earliest, `"latest"` → Latest,
/// иначе base64-токен позиции.
pub fn resolve_start_position(value: Option<&str>) -> Result<StartPosition, BridgeError> {
    match value {
        None => Ok(StartPosition::Latest),
        Some(v) if v.trim().is_empty() => Ok(StartPosition::Latest),
        Some("earliest") => Ok(StartPosition::Earliest),
        Some("latest") => Ok(StartPosition::Latest),
        Some(v) => Ok(StartPosition::Specific(MessageId::from_base64(v)?)),
    }
}

/// Параметры подключения reader'а из query string WebSocket URL.
#[derive(Debug, Clone, Default)]
pub struct ReaderParams {
    pub reader_name: Option<String>,
    pub window: WindowSize,
    pub start: StartPosition,
}

impl ReaderParams {
    pub fn from_query(query: &HashMap<String, String>) -> Result<Self, BridgeError> {
        let window = match query.get("receiverQueueSize") {
            Some(raw) => {
                let requested: i64 = raw.trim().parse().map_err(|_| BridgeError::InvalidParameter {
                    name: "receiverQueueSize",
                    value: raw.clone(),
                })?;
                WindowSize::new(requested)
            }
            None => WindowSize::default(),
        };

        Ok(Self {
            reader_name: query.get("readerName").cloned(),
            window,
            start: resolve_start_position(query.get("messageId").map(String::as_str))?,
        })
    }

    pub fn reader_options(&self) -> ReaderOptions {
        ReaderOptions {
            reader_name: self.reader_name.clone(),
            receiver_queue_size: self.window.get(),
        }
    }
}
