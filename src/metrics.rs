//! Metrics aggregator (§4.7): sink-kind counters plus per-drain drop and
//! error counts, with a fixed `emit()` ordering.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tokio::sync::mpsc;

/// Default capacity of the channel carrying [`DrainMetric`] updates into the
/// aggregator. Not named in the external configuration table (§6) — the
/// spec only surfaces `error_channel_size` for the manager's error-feedback
/// path — so this is a fixed internal bound, documented in DESIGN.md.
pub const DRAIN_METRIC_CHANNEL_CAPACITY: usize = 1024;

/// Emitted by a sink whenever its drop total advances (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainMetric {
    pub app_id: String,
    pub drain_url: String,
    pub dropped_msg_count: u64,
}

/// A single named metric as returned by `emit()` (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metric {
    pub name: String,
    pub value: u64,
    pub app_id: Option<String>,
    pub drain_url: Option<String>,
}

impl Metric {
    fn counter(name: &str, value: u64) -> Self {
        Self { name: name.to_string(), value, app_id: None, drain_url: None }
    }

    fn tagged(name: &str, value: u64, app_id: &str, drain_url: &str) -> Self {
        Self {
            name: name.to_string(),
            value,
            app_id: Some(app_id.to_string()),
            drain_url: Some(drain_url.to_string()),
        }
    }
}

/// Handle cloned into every sink worker so it can report dropped envelopes
/// without holding any lock (§5: "no lock is held across an inbox send").
#[derive(Debug, Clone)]
pub struct MetricsHandle {
    tx: mpsc::Sender<DrainMetric>,
}

impl MetricsHandle {
    /// Non-blocking; dropped if the channel is full, per §4.1/§4.2.
    pub fn report_dropped(&self, app_id: &str, drain_url: &str, dropped_msg_count: u64) {
        let _ = self.tx.try_send(DrainMetric {
            app_id: app_id.to_string(),
            drain_url: drain_url.to_string(),
            dropped_msg_count,
        });
    }
}

/// The aggregator itself. The only writer of its maps is the background
/// task draining the `DrainMetric` channel (see [`MetricsAggregator::run`]);
/// readers (e.g. an HTTP scrape handler) take a read lock via `emit()`.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    dump_sinks: AtomicU64,
    syslog_sinks: AtomicU64,
    firehose_sinks: AtomicU64,
    app_drain_metrics: RwLock<HashMap<(String, String), u64>>,
    syslog_drain_error_counts: RwLock<HashMap<(String, String), u64>>,
}

impl MetricsAggregator {
    /// Builds the aggregator along with the handle sinks use to report
    /// drops and the receiver the manager spawns [`MetricsAggregator::run`]
    /// against.
    pub fn new() -> (std::sync::Arc<Self>, mpsc::Receiver<DrainMetric>, MetricsHandle) {
        let (tx, rx) = mpsc::channel(DRAIN_METRIC_CHANNEL_CAPACITY);
        let aggregator = std::sync::Arc::new(Self::default());
        let handle = MetricsHandle { tx };
        (aggregator, rx, handle)
    }

    /// Drains `rx` forever, applying each [`DrainMetric`] as the latest
    /// cumulative total for its `(app_id, drain_url)` key. Intended to be
    /// spawned once by the manager alongside its own lifecycle.
    pub async fn run(self: std::sync::Arc<Self>, mut rx: mpsc::Receiver<DrainMetric>) {
        while let Some(update) = rx.recv().await {
            let mut map = self
                .app_drain_metrics
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            map.insert((update.app_id, update.drain_url), update.dropped_msg_count);
        }
    }

    pub fn increment_dump_sinks(&self) {
        self.dump_sinks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_dump_sinks(&self) {
        self.dump_sinks.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn increment_syslog_sinks(&self) {
        self.syslog_sinks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_syslog_sinks(&self) {
        self.syslog_sinks.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn increment_firehose_sinks(&self) {
        self.firehose_sinks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_firehose_sinks(&self) {
        self.firehose_sinks.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn dump_sinks(&self) -> u64 {
        self.dump_sinks.load(Ordering::Relaxed)
    }

    pub fn syslog_sinks(&self) -> u64 {
        self.syslog_sinks.load(Ordering::Relaxed)
    }

    pub fn firehose_sinks(&self) -> u64 {
        self.firehose_sinks.load(Ordering::Relaxed)
    }

    /// Called by the manager when a drain sink is successfully registered,
    /// so the metric key exists (at 0) even before any drops occur (S4).
    pub fn init_drain_metric(&self, app_id: &str, drain_url: &str) {
        let mut map = self.app_drain_metrics.write().unwrap_or_else(|p| p.into_inner());
        map.entry((app_id.to_string(), drain_url.to_string())).or_insert(0);
    }

    /// Called by the manager on drain-sink deletion (S4).
    pub fn remove_drain_metric(&self, app_id: &str, drain_url: &str) {
        let mut map = self.app_drain_metrics.write().unwrap_or_else(|p| p.into_inner());
        map.remove(&(app_id.to_string(), drain_url.to_string()));
    }

    /// `numberOfSyslogDrainErrors{app_id, drain_url}` (§4.6).
    pub fn record_syslog_drain_error(&self, app_id: &str, drain_url: &str) {
        let mut map = self.syslog_drain_error_counts.write().unwrap_or_else(|p| p.into_inner());
        *map.entry((app_id.to_string(), drain_url.to_string())).or_insert(0) += 1;
    }

    /// Ordered as specified in §4.7: the three sink-kind counters first (in
    /// this fixed order), then per-drain drop entries, then per-drain error
    /// entries, ending with the synthetic `totalDroppedMessages`.
    pub fn emit(&self) -> Vec<Metric> {
        let mut out = Vec::new();
        out.push(Metric::counter("DumpSinks", self.dump_sinks()));
        out.push(Metric::counter("SyslogSinks", self.syslog_sinks()));
        out.push(Metric::counter("FirehoseSinks", self.firehose_sinks()));

        let drops = self.app_drain_metrics.read().unwrap_or_else(|p| p.into_inner());
        let mut total_dropped: u64 = 0;
        for ((app_id, drain_url), count) in drops.iter() {
            out.push(Metric::tagged("numberOfMessagesLost", *count, app_id, drain_url));
            total_dropped = total_dropped.saturating_add(*count);
        }
        drop(drops);

        let errors = self.syslog_drain_error_counts.read().unwrap_or_else(|p| p.into_inner());
        for ((app_id, drain_url), count) in errors.iter() {
            out.push(Metric::tagged("numberOfSyslogDrainErrors", *count, app_id, drain_url));
        }
        drop(errors);

        out.push(Metric::counter("totalDroppedMessages", total_dropped));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_orders_counters_then_drops_then_errors_then_total() {
        let (aggregator, rx, handle) = MetricsAggregator::new();
        let runner = tokio::spawn(aggregator.clone().run(rx));

        handle.report_dropped("myApp1", "chan1", 50);
        handle.report_dropped("myApp2", "chan2", 25);

        // Give the background aggregator task a chance to apply both updates.
        for _ in 0..100 {
            if aggregator.emit().last().unwrap().value == 75 {
                break;
            }
            tokio::task::yield_now().await;
        }

        let metrics = aggregator.emit();
        assert_eq!(metrics[0].name, "DumpSinks");
        assert_eq!(metrics[1].name, "SyslogSinks");
        assert_eq!(metrics[2].name, "FirehoseSinks");
        let last = metrics.last().unwrap();
        assert_eq!(last.name, "totalDroppedMessages");
        assert_eq!(last.value, 75);
        runner.abort();
    }

    #[test]
    fn init_then_remove_drain_metric_is_observable() {
        let aggregator = MetricsAggregator::default();
        aggregator.init_drain_metric("aptastic", "syslog://127.0.1.1:886");
        assert!(aggregator
            .app_drain_metrics
            .read()
            .unwrap()
            .contains_key(&("aptastic".to_string(), "syslog://127.0.1.1:886".to_string())));
        aggregator.remove_drain_metric("aptastic", "syslog://127.0.1.1:886");
        assert!(!aggregator
            .app_drain_metrics
            .read()
            .unwrap()
            .contains_key(&("aptastic".to_string(), "syslog://127.0.1.1:886".to_string())));
    }

    #[test]
    fn sink_kind_counters_round_trip() {
        let aggregator = MetricsAggregator::default();
        aggregator.increment_dump_sinks();
        aggregator.increment_dump_sinks();
        aggregator.decrement_dump_sinks();
        assert_eq!(aggregator.dump_sinks(), 1);
    }
}
