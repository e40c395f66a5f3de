pub mod auth;
pub mod error;
mod reader;

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, watch};

use reader_api::{
    Message, MessageId, MessageReader, ReaderFactory, ReaderOptions,
    SourceError, StartPosition, TopicCatalog, now_ms,
};

pub use auth::{Grant, StaticAuthorizer};
pub use error::TopicError;
pub use reader::MemoryReader;

// ═══════════════════════════════════════════════════════════════
//  Offsets
// ═══════════════════════════════════════════════════════════════

/// MessageId для in-memory лога: 8 байт big-endian offset.
pub fn offset_to_id(offset: u64) -> MessageId {
    MessageId::from_bytes(offset.to_be_bytes().to_vec())
}

pub fn id_to_offset(id: &MessageId) -> Result<u64, TopicError> {
    let bytes: [u8; 8] = id
        .as_bytes()
        .try_into()
        .map_err(|_| TopicError::InvalidMessageId(id.as_bytes().len()))?;
    Ok(u64::from_be_bytes(bytes))
}

// ═══════════════════════════════════════════════════════════════
//  Topic
// ═══════════════════════════════════════════════════════════════

struct Log {
    entries: VecDeque<Message>,
    /// Offset первой сохранённой записи.
    first_offset: u64,
}

impl Log {
    fn next_offset(&self) -> u64 {
        self.first_offset + self.entries.len() as u64
    }
}

/// Результат поиска записи по offset'у.
pub(crate) enum Lookup {
    Found(Message),
    /// Запись ещё не опубликована.
    Pending,
    /// Запись вытеснена retention'ом; первая доступная: указанная.
    Trimmed(u64),
}

/// Именованный упорядоченный лог сообщений: ring-buffer с retention
/// по количеству записей + watch-канал с next offset для ожидающих reader'ов.
pub struct Topic {
    pub name: String,
    log: RwLock<Log>,
    max_records: usize,
    head_tx: watch::Sender<u64>,
}

impl Topic {
    pub fn new(name: String, max_records: usize) -> Self {
        let (head_tx, _) = watch::channel(0);
        Self {
            name,
            log: RwLock::new(Log {
                entries: VecDeque::with_capacity(max_records.min(65536)),
                first_offset: 0,
            }),
            max_records: max_records.max(1),
            head_tx,
        }
    }

    /// Опубликовать сообщение: append → wake all readers.
    pub async fn publish(
        &self,
        payload: Vec<u8>,
        properties: HashMap<String, String>,
        key: Option<String>,
    ) -> MessageId {
        let mut log = self.log.write().await;
        let offset = log.next_offset();
        let id = offset_to_id(offset);
        log.entries.push_back(Message {
            id: id.clone(),
            payload,
            properties,
            publish_time_ms: now_ms(),
            key,
        });
        if log.entries.len() > self.max_records {
            log.entries.pop_front();
            log.first_offset += 1;
        }
        let next = log.next_offset();
        drop(log);

        self.head_tx.send_replace(next);
        tracing::debug!(topic = %self.name, offset, "published message");
        id
    }

    pub(crate) async fn lookup(&self, offset: u64) -> Lookup {
        let log = self.log.read().await;
        if offset < log.first_offset {
            return Lookup::Trimmed(log.first_offset);
        }
        let idx = (offset - log.first_offset) as usize;
        match log.entries.get(idx) {
            Some(msg) => Lookup::Found(msg.clone()),
            None => Lookup::Pending,
        }
    }

    /// Offset, с которого начнёт reader для данной стартовой позиции.
    pub(crate) async fn resolve_start(&self, start: &StartPosition) -> Result<u64, TopicError> {
        let log = self.log.read().await;
        match start {
            StartPosition::Earliest => Ok(log.first_offset),
            StartPosition::Latest => Ok(log.next_offset()),
            StartPosition::Specific(id) => Ok(id_to_offset(id)?.saturating_add(1)),
        }
    }

    pub(crate) fn watch_head(&self) -> watch::Receiver<u64> {
        self.head_tx.subscribe()
    }

    pub async fn len(&self) -> usize {
        self.log.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

// ═══════════════════════════════════════════════════════════════
//  TopicRegistry
// ═══════════════════════════════════════════════════════════════

/// Реестр всех topic'ов. Реализует ReaderFactory и TopicCatalog.
pub struct TopicRegistry {
    topics: HashMap<String, Arc<Topic>>,
    reader_seq: AtomicU64,
}

impl Default for TopicRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self {
            topics: HashMap::new(),
            reader_seq: AtomicU64::new(1),
        }
    }

    pub fn register(&mut self, topic: Topic) {
        let name = topic.name.clone();
        self.topics.insert(name, Arc::new(topic));
    }

    pub fn get(&self, name: &str) -> Option<Arc<Topic>> {
        self.topics.get(name).cloned()
    }

    fn next_subscription(&self) -> String {
        let seq = self.reader_seq.fetch_add(1, Ordering::Relaxed);
        format!("reader-{seq:010x}")
    }
}

impl ReaderFactory for TopicRegistry {
    fn create_reader(
        &self,
        topic: &str,
        start: StartPosition,
        options: ReaderOptions,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn MessageReader>, SourceError>> + Send + '_>> {
        let topic_arc = self.topics.get(topic).cloned();
        let topic_name = topic.to_string();
        Box::pin(async move {
            let t = topic_arc
                .ok_or_else(|| TopicError::NotFound(topic_name).into_source_error())?;
            let cursor = t.resolve_start(&start).await
                .map_err(TopicError::into_source_error)?;
            let subscription = self.next_subscription();
            tracing::info!(
                topic = %t.name,
                %subscription,
                reader_name = ?options.reader_name,
                queue_size = options.receiver_queue_size,
                start = ?start,
                "created reader"
            );
            let reader = MemoryReader::new(t, subscription, options.reader_name, cursor);
            Ok(Arc::new(reader) as Arc<dyn MessageReader>)
        })
    }
}

impl TopicCatalog for TopicRegistry {
    fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.topics.keys().cloned().collect();
        names.sort();
        names
    }

    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        properties: HashMap<String, String>,
        key: Option<String>,
    ) -> Pin<Box<dyn Future<Output = Result<MessageId, SourceError>> + Send + '_>> {
        let topic_arc = self.topics.get(topic).cloned();
        let topic_name = topic.to_string();
        Box::pin(async move {
            match topic_arc {
                Some(t) => Ok(t.publish(payload, properties, key).await),
                None => Err(TopicError::NotFound(topic_name).into_source_error()),
            }
        })
    }
}
