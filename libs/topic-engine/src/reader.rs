use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;

use reader_api::{Message, MessageReader, SourceError};

use crate::{Lookup, Topic};

struct Cursor {
    next: u64,
    head: watch::Receiver<u64>,
}

// ═══════════════════════════════════════════════════════════════
//  MemoryReader pull-based MessageReader над Topic
// ═══════════════════════════════════════════════════════════════

/// Reader in-memory лога. Cursor защищён async-мьютексом: конкурентные
/// `read_next()` выстраиваются в очередь и получают разные сообщения.
pub struct MemoryReader {
    topic: Arc<Topic>,
    subscription: String,
    reader_name: Option<String>,
    cursor: Mutex<Cursor>,
    closed: CancellationToken,
}

impl MemoryReader {
    pub(crate) fn new(
        topic: Arc<Topic>,
        subscription: String,
        reader_name: Option<String>,
        start_offset: u64,
    ) -> Self {
        let head = topic.watch_head();
        Self {
            topic,
            subscription,
            reader_name,
            cursor: Mutex::new(Cursor { next: start_offset, head }),
            closed: CancellationToken::new(),
        }
    }

    pub fn reader_name(&self) -> Option<&str> {
        self.reader_name.as_deref()
    }

    fn closed_error(&self) -> SourceError {
        SourceError::closed(format!("reader {} closed", self.subscription))
    }
}

impl MessageReader for MemoryReader {
    fn read_next(&self) -> Pin<Box<dyn Future<Output = Result<Message, SourceError>> + Send + '_>> {
        Box::pin(async move {
            let mut cursor = tokio::select! {
                cursor = self.cursor.lock() => cursor,
                _ = self.closed.cancelled() => return Err(self.closed_error()),
            };

            loop {
                if self.closed.is_cancelled() {
                    return Err(self.closed_error());
                }

                match self.topic.lookup(cursor.next).await {
                    Lookup::Found(msg) => {
                        cursor.next += 1;
                        return Ok(msg);
                    }
                    Lookup::Trimmed(first) => {
                        tracing::warn!(
                            topic = %self.topic.name,
                            subscription = %self.subscription,
                            from = cursor.next,
                            to = first,
                            "reader fell behind retention, skipping"
                        );
                        cursor.next = first;
                        continue;
                    }
                    Lookup::Pending => {}
                }

                tokio::select! {
                    changed = cursor.head.changed() => {
                        if changed.is_err() {
                            return Err(SourceError::closed(format!("topic {} dropped", self.topic.name)));
                        }
                    }
                    _ = self.closed.cancelled() => return Err(self.closed_error()),
                }
            }
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), SourceError>> + Send + '_>> {
        Box::pin(async move {
            if !self.closed.is_cancelled() {
                self.closed.cancel();
                tracing::debug!(
                    topic = %self.topic.name,
                    subscription = %self.subscription,
                    "reader closed"
                );
            }
            Ok(())
        })
    }

    fn subscription(&self) -> &str {
        &self.subscription
    }

    fn topic(&self) -> &str {
        &self.topic.name
    }
}
