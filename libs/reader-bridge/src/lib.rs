//! Мост между pull-based reader'ом topic'а и push-based WebSocket.
//!
//! Сессия (`SessionBridge`) тянет сообщения из `MessageReader`, кодирует
//! их в JSON и отправляет через `WireTransport`, ограничивая число
//! неподтверждённых доставок окном (`FlowController`).

pub mod encoder;
pub mod error;
pub mod flow;
pub mod params;
pub mod registry;
pub mod reporter;
pub mod session;
pub mod stats;
pub mod transport;

mod delivery;

#[cfg(test)]
mod tests;

pub use encoder::MessageEncoder;
pub use error::{BridgeError, EncodeError, TransportError};
pub use flow::{FlowController, FlowState};
pub use params::{MAX_WINDOW_SIZE, ReaderParams, WindowSize, resolve_start_position};
pub use registry::{ReaderRegistry, SessionRegistry};
pub use reporter::{TopicStats, collect_stats, spawn_stats_reporter};
pub use session::{PendingBridge, SessionBridge, SessionInfo};
pub use stats::{DeliveryStats, StatsCounters};
pub use transport::{CloseReason, WireTransport};
