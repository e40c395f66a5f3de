use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::ReaderRegistry;

/// Агрегированная по topic'у статистика за один интервал.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TopicStats {
    pub readers: usize,
    pub msgs: u64,
    pub bytes: u64,
}

/// Снять и сбросить счётчики всех сессий, сгруппировав по topic'у.
pub fn collect_stats(registry: &ReaderRegistry) -> BTreeMap<String, TopicStats> {
    let mut by_topic: BTreeMap<String, TopicStats> = BTreeMap::new();
    for session in registry.sessions() {
        let snap = session.take_stats();
        let entry = by_topic.entry(session.topic().to_string()).or_default();
        entry.readers += 1;
        entry.msgs += snap.count;
        entry.bytes += snap.bytes;
    }
    by_topic
}

/// Периодически логировать rate доставки по topic'ам.
pub fn spawn_stats_reporter(
    registry: Arc<ReaderRegistry>,
    period: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // первый tick срабатывает сразу
        ticker.tick().await;
        let secs = period.as_secs_f64().max(f64::EPSILON);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for (topic, stats) in collect_stats(&registry) {
                        tracing::info!(
                            %topic,
                            readers = stats.readers,
                            msgs = stats.msgs,
                            bytes = stats.bytes,
                            msg_rate = stats.msgs as f64 / secs,
                            byte_rate = stats.bytes as f64 / secs,
                            "reader stats"
                        );
                    }
                }
                _ = token.cancelled() => break,
            }
        }
        tracing::debug!("stats reporter stopped");
    })
}
