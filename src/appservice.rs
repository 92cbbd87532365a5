//! App-service discovery contract (§3, §6): the external feed of
//! `(app_id, url)` tuples that causes drain sinks to be created or removed.
//! The discovery source itself is out of scope (§1); this only defines the
//! shape the manager consumes.

/// The unit of external drain configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppService {
    pub app_id: String,
    pub url: String,
}

impl AppService {
    pub fn new(app_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self { app_id: app_id.into(), url: url.into() }
    }
}

/// Sender halves of the two unbounded queues the manager subscribes to
/// (§6). Unbounded because discovery events are assumed low-rate and the
/// manager must never apply backpressure to the external source.
pub type AppServiceSender = tokio::sync::mpsc::UnboundedSender<AppService>;
pub type AppServiceReceiver = tokio::sync::mpsc::UnboundedReceiver<AppService>;

/// Convenience constructor mirroring `tokio::sync::mpsc::unbounded_channel`.
pub fn app_service_channel() -> (AppServiceSender, AppServiceReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}
