//! Dump sink (§4.1): bounded FIFO ring buffer of recent `LogMessage`
//! envelopes for a single app.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;

use crate::envelope::{Envelope, EventType};

pub struct DumpSink {
    capacity: usize,
    buffer: RwLock<VecDeque<Arc<Envelope>>>,
}

impl DumpSink {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self { capacity: capacity.max(1), buffer: RwLock::new(VecDeque::new()) })
    }

    fn push(&self, envelope: Arc<Envelope>) {
        let mut buf = self.buffer.write().unwrap_or_else(|p| p.into_inner());
        if buf.len() >= self.capacity {
            buf.pop_front();
        }
        buf.push_back(envelope);
    }

    /// Ordered oldest -> newest snapshot (§4.1).
    pub fn dump(&self) -> Vec<Arc<Envelope>> {
        self.buffer.read().unwrap_or_else(|p| p.into_inner()).iter().cloned().collect()
    }
}

/// The dump sink's worker loop. Only `LogMessage` envelopes are stored;
/// anything else is dropped silently (not counted — that drop is a
/// payload-kind mismatch, not an inbox-full drop, so it never goes through
/// `record_dropped`).
pub async fn run(sink: Arc<DumpSink>, mut inbox: mpsc::Receiver<Arc<Envelope>>) {
    while let Some(envelope) = inbox.recv().await {
        if envelope.event_type == EventType::LogMessage {
            sink.push(envelope);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::MessageType;

    fn log(n: u8) -> Arc<Envelope> {
        Arc::new(Envelope::new_log(n as u64, "o", "a", MessageType::Out, vec![n], "APP", "0"))
    }

    fn metric() -> Arc<Envelope> {
        Arc::new(Envelope::new_container_metric(1, "o", "a", 0, 0.0, 0, 0))
    }

    #[tokio::test]
    async fn keeps_only_the_last_n_log_messages() {
        let sink = DumpSink::new(2);
        let (tx, rx) = mpsc::channel(16);
        let worker = tokio::spawn(run(sink.clone(), rx));

        for n in 1..=3u8 {
            tx.send(log(n)).await.unwrap();
        }
        drop(tx);
        worker.await.unwrap();

        let dumped = sink.dump();
        assert_eq!(dumped.len(), 2);
        assert_eq!(dumped[0].as_log().unwrap().message, vec![2]);
        assert_eq!(dumped[1].as_log().unwrap().message, vec![3]);
    }

    #[tokio::test]
    async fn non_log_message_envelopes_are_dropped_silently() {
        let sink = DumpSink::new(10);
        let (tx, rx) = mpsc::channel(16);
        let worker = tokio::spawn(run(sink.clone(), rx));

        tx.send(metric()).await.unwrap();
        tx.send(log(1)).await.unwrap();
        drop(tx);
        worker.await.unwrap();

        let dumped = sink.dump();
        assert_eq!(dumped.len(), 1);
        assert_eq!(dumped[0].as_log().unwrap().message, vec![1]);
    }

    #[tokio::test]
    async fn worker_exits_when_inbox_closes() {
        let sink = DumpSink::new(10);
        let (tx, rx) = mpsc::channel(16);
        let worker = tokio::spawn(run(sink, rx));
        drop(tx);
        tokio::time::timeout(std::time::Duration::from_secs(1), worker).await.unwrap().unwrap();
    }
}
