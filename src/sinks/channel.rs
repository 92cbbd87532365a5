//! Channel sink: the firehose / test / external-subscriber sink kind.
//!
//! Firehose subscribers and the "slow consumer" test double used in the
//! original implementation's sink-manager tests share the same shape: a
//! consumer that simply collects whatever lands in its inbox. The "ready
//! gate" here is grounded directly on that test double (confirmed in
//! `sink_manager_test.go`): a subscriber can register before it is ready to
//! read, and the inbox (not some separate buffer) is what absorbs envelopes
//! sent in the meantime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::{mpsc, Notify};

use crate::envelope::Envelope;

pub struct ChannelSink {
    received: RwLock<Vec<Arc<Envelope>>>,
    gate_open: AtomicBool,
    gate: Notify,
}

impl ChannelSink {
    /// A sink whose worker starts draining its inbox immediately.
    pub fn new() -> Arc<Self> {
        Arc::new(Self { received: RwLock::new(Vec::new()), gate_open: AtomicBool::new(true), gate: Notify::new() })
    }

    /// A sink whose worker buffers in its (unread) inbox until
    /// [`ChannelSink::open_gate`] is called — the S2 "slow consumer" shape.
    pub fn new_with_gate_closed() -> Arc<Self> {
        Arc::new(Self { received: RwLock::new(Vec::new()), gate_open: AtomicBool::new(false), gate: Notify::new() })
    }

    pub fn open_gate(&self) {
        self.gate_open.store(true, Ordering::SeqCst);
        self.gate.notify_one();
    }

    /// Envelopes received so far, in arrival order.
    pub fn received(&self) -> Vec<Arc<Envelope>> {
        self.received.read().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

pub async fn run(sink: Arc<ChannelSink>, mut inbox: mpsc::Receiver<Arc<Envelope>>) {
    if !sink.gate_open.load(Ordering::SeqCst) {
        sink.gate.notified().await;
    }
    while let Some(envelope) = inbox.recv().await {
        sink.received.write().unwrap_or_else(|p| p.into_inner()).push(envelope);
    }
}
