//! Remote drain sink (§4.3): forwards envelopes to a caller-supplied
//! writer, backing off on failure and reporting errors back to the manager.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::backoff::Backoff;
use crate::clock::Clock;
use crate::envelope::Envelope;
use crate::metrics::MetricsHandle;
use crate::writer::DrainWriter;

/// An ERROR envelope request raised by a drain sink back to the manager
/// (§4.3: "emits a log-message envelope of type ERROR back into the
/// manager"), so it can be re-routed to the app's error-eligible sinks
/// through the normal `send_to` path (§4.6).
#[derive(Debug, Clone)]
pub struct SyslogError {
    pub app_id: String,
    pub drain_url: String,
    pub message: String,
}

/// Runs a drain sink's inbox-draining loop until the inbox closes.
///
/// State machine (§4.3): `Connected -> Writing -> Connected` on success; on
/// failure, a backoff deadline (tracked against `clock`, not an awaited
/// sleep) is set, doubling up to a cap and resetting to base after any
/// success. While the deadline has not passed, envelopes are drained and
/// discarded (counted via the shared drop counter) rather than written,
/// which keeps the registry's non-blocking send from ever stalling on a
/// backing-off drain.
pub async fn run(
    mut inbox: mpsc::Receiver<Arc<Envelope>>,
    mut writer: Box<dyn DrainWriter>,
    backoff: Backoff,
    clock: Arc<dyn Clock>,
    dropped: Arc<AtomicU64>,
    metrics: MetricsHandle,
    errors: mpsc::Sender<SyslogError>,
    app_id: String,
    drain_url: String,
) {
    let mut attempt: u32 = 0;
    let mut backoff_deadline_ns: Option<u64> = None;

    while let Some(envelope) = inbox.recv().await {
        if let Some(deadline) = backoff_deadline_ns {
            if clock.now_nanos() < deadline {
                let total = dropped.fetch_add(1, Ordering::Relaxed) + 1;
                metrics.report_dropped(&app_id, &drain_url, total);
                continue;
            }
            backoff_deadline_ns = None;
        }

        match writer.write(&envelope).await {
            Ok(()) => {
                attempt = 0;
            }
            Err(err) => {
                attempt += 1;
                let delay = backoff.delay(attempt as usize);
                backoff_deadline_ns = Some(clock.now_nanos().saturating_add(delay.as_nanos() as u64));
                tracing::warn!(
                    app_id = %app_id,
                    drain_url = %drain_url,
                    attempt,
                    error = %err,
                    "drain write failed, entering backoff"
                );
                let _ = errors.try_send(SyslogError {
                    app_id: app_id.clone(),
                    drain_url: drain_url.clone(),
                    message: err.as_error_envelope_message(),
                });
            }
        }
    }

    writer.close().await;
}
