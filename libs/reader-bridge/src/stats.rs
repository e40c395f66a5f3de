use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Снимок счётчиков доставки за окно между двумя сбросами.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    pub count: u64,
    pub bytes: u64,
}

/// Lock-free счётчики доставленных сообщений.
///
/// `count`/`bytes` сбрасываются через swap, поэтому инкремент,
/// конкурентный со сбросом, попадает ровно в один из снимков.
/// `delivered_total` монотонный и не сбрасывается.
#[derive(Debug, Default)]
pub struct StatsCounters {
    count: AtomicU64,
    bytes: AtomicU64,
    delivered_total: AtomicU64,
}

impl StatsCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_delivery(&self, bytes: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.delivered_total.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn take_msgs_delivered(&self) -> u64 {
        self.count.swap(0, Ordering::Relaxed)
    }

    pub fn take_bytes_delivered(&self) -> u64 {
        self.bytes.swap(0, Ordering::Relaxed)
    }

    /// Счётчики сбрасываются по очереди: доставка, конкурентная со
    /// снимком, может попасть count'ом в этот снимок, а bytes в следующий.
    pub fn take_snapshot(&self) -> DeliveryStats {
        DeliveryStats {
            count: self.take_msgs_delivered(),
            bytes: self.take_bytes_delivered(),
        }
    }

    pub fn msg_delivered_counter(&self) -> u64 {
        self.delivered_total.load(Ordering::Relaxed)
    }
}
