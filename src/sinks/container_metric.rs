//! Container-metric sink (§4.2): keeps only the latest envelope per
//! `instance_index`, self-terminating after a period of inactivity.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;

use crate::clock::Clock;
use crate::envelope::{Envelope, EventType};
use crate::sleeper::Sleeper;
use std::time::Duration;

pub struct ContainerMetricSink {
    ttl_nanos: u64,
    clock: Arc<dyn Clock>,
    latest: RwLock<HashMap<i32, Arc<Envelope>>>,
}

impl ContainerMetricSink {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self { ttl_nanos: ttl.as_nanos() as u64, clock, latest: RwLock::new(HashMap::new()) })
    }

    fn update(&self, envelope: Arc<Envelope>) {
        let Some(metric) = envelope.as_container_metric() else { return };
        let mut map = self.latest.write().unwrap_or_else(|p| p.into_inner());
        match map.get(&metric.instance_index) {
            Some(existing) if existing.timestamp_ns >= envelope.timestamp_ns => {
                // Newer-wins: keep the existing, newer-or-equal entry even
                // under out-of-order delivery (§4.2).
            }
            _ => {
                map.insert(metric.instance_index, envelope);
            }
        }
    }

    /// Evicts and excludes any envelope older than `now - ttl`; returns the
    /// surviving set (order unspecified, per §4.2).
    pub fn get_latest(&self) -> Vec<Arc<Envelope>> {
        let threshold = self.clock.now_nanos().saturating_sub(self.ttl_nanos);
        let mut map = self.latest.write().unwrap_or_else(|p| p.into_inner());
        map.retain(|_, envelope| envelope.timestamp_ns >= threshold);
        map.values().cloned().collect()
    }
}

/// Worker loop with an inactivity timer reset on every received envelope;
/// the sink self-terminates on timer expiry (§4.2). Envelopes that are not
/// container metrics are discarded without resetting anything beyond the
/// normal receive.
pub async fn run(
    sink: Arc<ContainerMetricSink>,
    mut inbox: mpsc::Receiver<Arc<Envelope>>,
    inactivity: Duration,
    sleeper: Arc<dyn Sleeper>,
) {
    loop {
        tokio::select! {
            received = inbox.recv() => {
                match received {
                    Some(envelope) => {
                        if envelope.event_type == EventType::ContainerMetric {
                            sink.update(envelope);
                        }
                    }
                    None => break,
                }
            }
            _ = sleeper.sleep(inactivity) => {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::sleeper::InstantSleeper;

    fn cm(ts: u64, instance: i32) -> Arc<Envelope> {
        Arc::new(Envelope::new_container_metric(ts, "o", "a", instance, 1.0, 1, 1))
    }

    #[test]
    fn newer_timestamp_replaces_older_for_same_instance() {
        let sink = ContainerMetricSink::new(Duration::from_secs(60), Arc::new(FakeClock::new(1000)));
        sink.update(cm(10, 1));
        sink.update(cm(20, 1));
        let latest = sink.get_latest();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].timestamp_ns, 20);
    }

    #[test]
    fn older_out_of_order_arrival_is_ignored() {
        let sink = ContainerMetricSink::new(Duration::from_secs(60), Arc::new(FakeClock::new(1000)));
        sink.update(cm(20, 1));
        sink.update(cm(10, 1));
        let latest = sink.get_latest();
        assert_eq!(latest[0].timestamp_ns, 20);
    }

    #[test]
    fn get_latest_never_returns_expired_envelopes() {
        let clock = Arc::new(FakeClock::new(0));
        let sink = ContainerMetricSink::new(Duration::from_nanos(100), clock.clone());
        sink.update(cm(0, 1));
        clock.set(50);
        assert_eq!(sink.get_latest().len(), 1);
        clock.set(200);
        assert_eq!(sink.get_latest().len(), 0);
    }

    #[test]
    fn distinct_instances_are_tracked_independently() {
        let sink = ContainerMetricSink::new(Duration::from_secs(60), Arc::new(FakeClock::new(1000)));
        sink.update(cm(10, 1));
        sink.update(cm(10, 2));
        assert_eq!(sink.get_latest().len(), 2);
    }

    #[tokio::test]
    async fn worker_self_terminates_on_inactivity() {
        let sink = ContainerMetricSink::new(Duration::from_secs(60), Arc::new(FakeClock::new(0)));
        let (_tx, rx) = mpsc::channel(4);
        let worker = tokio::spawn(run(sink, rx, Duration::from_millis(1), Arc::new(InstantSleeper)));
        tokio::time::timeout(std::time::Duration::from_secs(1), worker).await.unwrap().unwrap();
    }

    #[test]
    fn non_container_metric_envelopes_are_discarded() {
        use crate::envelope::MessageType;
        let sink = ContainerMetricSink::new(Duration::from_secs(60), Arc::new(FakeClock::new(1000)));
        sink.update(Arc::new(Envelope::new_log(1, "o", "a", MessageType::Out, b"x".to_vec(), "APP", "0")));
        assert_eq!(sink.get_latest().len(), 0);
    }
}
