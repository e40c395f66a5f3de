use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════
//  MessageId
// ════════════════════════════════════════════════════════════════

/// Непрозрачный токен позиции сообщения в логе topic'а.
///
/// Только источник знает его внутреннюю структуру; bridge и клиенты
/// передают его как base64.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MessageId(Vec<u8>);

impl MessageId {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Декодировать из base64 (стандартный алфавит, с padding).
    pub fn from_base64(encoded: &str) -> Result<Self, base64::DecodeError> {
        STANDARD.decode(encoded).map(Self)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MessageId({})", self.to_base64())
    }
}

// ════════════════════════════════════════════════════════════════
//  Message
// ════════════════════════════════════════════════════════════════

/// Сообщение, прочитанное из topic'а. Неизменяемо после создания источником.
#[derive(Clone, Debug)]
pub struct Message {
    pub id: MessageId,
    pub payload: Vec<u8>,
    pub properties: HashMap<String, String>,
    /// Время публикации, Unix ms.
    pub publish_time_ms: i64,
    pub key: Option<String>,
}

impl Message {
    /// Длина payload в байтах (учитывается в статистике доставки).
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

// ════════════════════════════════════════════════════════════════
//  StartPosition
// ════════════════════════════════════════════════════════════════

/// С какой позиции reader начинает чтение.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum StartPosition {
    Earliest,
    #[default]
    Latest,
    /// Начать со следующего сообщения после указанного.
    Specific(MessageId),
}

// ════════════════════════════════════════════════════════════════
//  Reader options
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionType {
    Exclusive,
}

/// Параметры создания reader'а, не влияющие на flow control.
#[derive(Debug, Clone, Default)]
pub struct ReaderOptions {
    /// Самоидентификация reader'а (логируется источником).
    pub reader_name: Option<String>,
    /// Размер очереди приёма (уже clamp'нутый bridge'ем).
    pub receiver_queue_size: usize,
}
