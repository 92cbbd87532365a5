//! Sink registry (§4.5): the concurrent routing structure between the
//! manager and every sink's inbox.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::envelope::{Envelope, EventType};
use crate::metrics::MetricsHandle;
use crate::sink::SinkRecord;

/// A firehose subscription: every envelope is fanned out to every
/// subscription, but within a subscription containing multiple
/// load-balanced members, exactly one is chosen per envelope by round-robin
/// (§4.5).
#[derive(Default)]
struct FirehoseSubscription {
    members: Vec<Arc<SinkRecord>>,
    cursor: AtomicUsize,
}

/// `by_app: map<app_id, map<identifier, SinkRecord>>` plus the firehose set
/// (§4.5). A single `RwLock` per map rather than sharding: read locks are
/// already held concurrently across distinct app-ids, which satisfies the
/// "concurrent `route` calls on different app-ids" requirement without
/// reaching for a concurrent-map crate (none is used anywhere in the
/// retrieved reference pack for this shape of problem).
#[derive(Default)]
pub struct SinkRegistry {
    by_app: RwLock<HashMap<String, HashMap<String, Arc<SinkRecord>>>>,
    firehose: RwLock<HashMap<String, FirehoseSubscription>>,
}

impl SinkRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns `false` if `(stream_id, identifier)` already exists (§4.5,
    /// §3 invariant 1).
    pub fn register(&self, record: Arc<SinkRecord>) -> bool {
        let mut map = self.by_app.write().unwrap_or_else(|p| p.into_inner());
        let app_entry = map.entry(record.id.stream_id.clone()).or_default();
        if app_entry.contains_key(&record.id.identifier) {
            return false;
        }
        app_entry.insert(record.id.identifier.clone(), record);
        true
    }

    /// Adds `record` as a member of the firehose subscription
    /// `subscription_id`. Returns `false` if a member with the same
    /// identifier already belongs to that subscription.
    pub fn register_firehose(&self, subscription_id: impl Into<String>, record: Arc<SinkRecord>) -> bool {
        let subscription_id = subscription_id.into();
        let mut map = self.firehose.write().unwrap_or_else(|p| p.into_inner());
        let sub = map.entry(subscription_id).or_default();
        if sub.members.iter().any(|m| m.id.identifier == record.id.identifier) {
            return false;
        }
        sub.members.push(record);
        true
    }

    /// Removes and closes the sink at `(stream_id, identifier)`. Returns
    /// `false` if not present (§3 invariant 5: unregister is idempotent).
    pub async fn unregister(&self, stream_id: &str, identifier: &str) -> bool {
        let removed = {
            let mut map = self.by_app.write().unwrap_or_else(|p| p.into_inner());
            map.get_mut(stream_id).and_then(|app_map| app_map.remove(identifier))
        };
        match removed {
            Some(record) => {
                record.close().await;
                true
            }
            None => false,
        }
    }

    pub async fn unregister_firehose(&self, subscription_id: &str, identifier: &str) -> bool {
        let removed = {
            let mut map = self.firehose.write().unwrap_or_else(|p| p.into_inner());
            map.get_mut(subscription_id).and_then(|sub| {
                let pos = sub.members.iter().position(|m| m.id.identifier == identifier)?;
                Some(sub.members.remove(pos))
            })
        };
        match removed {
            Some(record) => {
                record.close().await;
                true
            }
            None => false,
        }
    }

    /// Non-blocking fan-out to every sink registered for `app_id` plus one
    /// member per firehose subscription. ERROR envelopes are only offered
    /// to sinks with `should_receive_errors == true` (§4.3, §4.6); every
    /// other envelope type is offered to every matching sink regardless of
    /// that flag. Never blocks (§5): a full inbox just increments that
    /// sink's drop counter.
    pub fn route(&self, app_id: &str, envelope: &Arc<Envelope>, metrics: &MetricsHandle) {
        let errors_only = envelope.event_type == EventType::Error;

        {
            let map = self.by_app.read().unwrap_or_else(|p| p.into_inner());
            if let Some(app_map) = map.get(app_id) {
                for record in app_map.values() {
                    if errors_only && !record.should_receive_errors {
                        continue;
                    }
                    if !record.try_send(envelope.clone()) {
                        record.record_dropped(1, metrics);
                    }
                }
            }
        }

        {
            let map = self.firehose.read().unwrap_or_else(|p| p.into_inner());
            for sub in map.values() {
                if sub.members.is_empty() {
                    continue;
                }
                let candidates: Vec<&Arc<SinkRecord>> = if errors_only {
                    sub.members.iter().filter(|m| m.should_receive_errors).collect()
                } else {
                    sub.members.iter().collect()
                };
                if candidates.is_empty() {
                    continue;
                }
                let idx = sub.cursor.fetch_add(1, Ordering::Relaxed) % candidates.len();
                let record = candidates[idx];
                if !record.try_send(envelope.clone()) {
                    record.record_dropped(1, metrics);
                }
            }
        }
    }

    pub fn sinks_for(&self, app_id: &str) -> Vec<Arc<SinkRecord>> {
        self.by_app
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(app_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, stream_id: &str, identifier: &str) -> Option<Arc<SinkRecord>> {
        self.by_app
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(stream_id)
            .and_then(|m| m.get(identifier))
            .cloned()
    }

    pub fn get_firehose(&self, subscription_id: &str, identifier: &str) -> Option<Arc<SinkRecord>> {
        self.firehose
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(subscription_id)
            .and_then(|sub| sub.members.iter().find(|m| m.id.identifier == identifier).cloned())
    }

    pub fn firehose_sinks(&self, subscription_id: &str) -> Vec<Arc<SinkRecord>> {
        self.firehose
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(subscription_id)
            .map(|sub| sub.members.clone())
            .unwrap_or_default()
    }

    /// Unregisters every sink and awaits every worker's exit (§4.6
    /// `stop()`).
    pub async fn close_all(&self) {
        let by_app_records: Vec<Arc<SinkRecord>> = {
            let mut map = self.by_app.write().unwrap_or_else(|p| p.into_inner());
            map.drain().flat_map(|(_, m)| m.into_values()).collect()
        };
        let firehose_records: Vec<Arc<SinkRecord>> = {
            let mut map = self.firehose.write().unwrap_or_else(|p| p.into_inner());
            map.drain().flat_map(|(_, sub)| sub.members).collect()
        };
        for record in by_app_records.iter().chain(firehose_records.iter()) {
            record.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::MessageType;
    use crate::sink::{SinkBody, SinkId, SinkKind};
    use tokio::sync::mpsc;

    fn log_envelope() -> Arc<Envelope> {
        Arc::new(Envelope::new_log(1, "o", "myApp", MessageType::Out, b"x".to_vec(), "APP", "0"))
    }

    fn make_record(stream_id: &str, identifier: &str, should_receive_errors: bool) -> (Arc<SinkRecord>, mpsc::Receiver<Arc<Envelope>>) {
        let (tx, rx) = mpsc::channel(8);
        let record = SinkRecord::new(
            SinkId::new(stream_id, identifier),
            SinkKind::Channel,
            should_receive_errors,
            tx,
            SinkBody::Drain,
        );
        (record, rx)
    }

    fn metrics_handle() -> MetricsHandle {
        let (_agg, _rx, handle) = crate::metrics::MetricsAggregator::new();
        handle
    }

    #[test]
    fn duplicate_registration_returns_false() {
        let registry = SinkRegistry::new();
        let (record1, _rx1) = make_record("myApp", "chan1", false);
        let (record2, _rx2) = make_record("myApp", "chan1", false);
        assert!(registry.register(record1));
        assert!(!registry.register(record2));
    }

    #[tokio::test]
    async fn fan_out_delivers_to_both_sinks_for_app_but_not_other_app() {
        let registry = SinkRegistry::new();
        let (record1, mut rx1) = make_record("myApp", "chan1", false);
        let (record2, mut rx2) = make_record("myApp", "chan2", false);
        let (record3, mut rx3) = make_record("myApp2", "chan3", false);
        registry.register(record1);
        registry.register(record2);
        registry.register(record3);

        let metrics = metrics_handle();
        registry.route("myApp", &log_envelope(), &metrics);

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let registry = SinkRegistry::new();
        let (record, _rx) = make_record("myApp", "chan1", false);
        registry.register(record);
        assert!(registry.unregister("myApp", "chan1").await);
        assert!(!registry.unregister("myApp", "chan1").await);
    }

    #[tokio::test]
    async fn firehose_round_robins_within_a_subscription() {
        let registry = SinkRegistry::new();
        let (record1, mut rx1) = make_record("sub", "a", false);
        let (record2, mut rx2) = make_record("sub", "b", false);
        registry.register_firehose("sub", record1);
        registry.register_firehose("sub", record2);

        let metrics = metrics_handle();
        registry.route("myApp", &log_envelope(), &metrics);
        registry.route("myApp", &log_envelope(), &metrics);

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn error_envelopes_only_reach_error_eligible_sinks() {
        let registry = SinkRegistry::new();
        let (normal, mut normal_rx) = make_record("myApp", "dump", false);
        let (error_sink, mut error_rx) = make_record("myApp", "errsink", true);
        registry.register(normal);
        registry.register(error_sink);

        let error_envelope = Arc::new(Envelope::new_error(1, "o", "myApp", "boom", "DRN"));
        let metrics = metrics_handle();
        registry.route("myApp", &error_envelope, &metrics);

        assert!(normal_rx.try_recv().is_err());
        assert!(error_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn close_all_closes_every_sink() {
        let registry = SinkRegistry::new();
        let (record, mut rx) = make_record("myApp", "chan1", false);
        let worker = tokio::spawn(async move { while rx.recv().await.is_some() {} });
        record.set_worker(worker);
        registry.register(record);

        tokio::time::timeout(std::time::Duration::from_secs(1), registry.close_all()).await.unwrap();
        assert!(registry.sinks_for("myApp").is_empty());
    }
}
