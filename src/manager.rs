//! Sink manager (§4.6): top-level lifecycle, policy, and the only type an
//! embedder constructs directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::appservice::{AppService, AppServiceReceiver};
use crate::backoff::Backoff;
use crate::blacklist::Blacklist;
use crate::clock::Clock;
use crate::config::SinkManagerConfig;
use crate::envelope::{Envelope, EventType};
use crate::metrics::{Metric, MetricsAggregator, MetricsHandle};
use crate::sink::{SinkBody, SinkId, SinkKind, SinkRecord, CONTAINER_METRIC_DRAIN_URL, DUMP_SINK_IDENTIFIER};
use crate::sinks;
use crate::sinks::channel::ChannelSink;
use crate::sinks::container_metric::ContainerMetricSink;
use crate::sinks::drain::SyslogError;
use crate::sinks::dump::DumpSink;
use crate::sleeper::Sleeper;
use crate::writer::WriterFactory;

/// Origin stamped on ERROR envelopes the drain-writer error feedback loop
/// tags its message with (§4.3: "tagged with the drain URL"). Log source
/// type used is fixed, mirroring the original's `DRN` tag for drain-origin
/// log lines.
const DRAIN_ERROR_SOURCE_TYPE: &str = "DRN";

pub struct SinkManager {
    config: SinkManagerConfig,
    registry: Arc<crate::registry::SinkRegistry>,
    blacklist: Blacklist,
    metrics: Arc<MetricsAggregator>,
    metrics_handle: MetricsHandle,
    writer_factory: Arc<dyn WriterFactory>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    errors_tx: mpsc::Sender<SyslogError>,
    shutdown_tx: watch::Sender<bool>,
    run_handle: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl SinkManager {
    pub fn new(
        config: SinkManagerConfig,
        blacklist: Blacklist,
        writer_factory: Arc<dyn WriterFactory>,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Arc<Self> {
        let (metrics, metrics_rx, metrics_handle) = MetricsAggregator::new();
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        let (errors_tx, mut errors_rx) = mpsc::channel(config.error_channel_size.max(1));

        let manager = Arc::new(Self {
            config,
            registry: crate::registry::SinkRegistry::new(),
            blacklist,
            metrics,
            metrics_handle,
            writer_factory,
            clock,
            sleeper,
            errors_tx,
            shutdown_tx,
            run_handle: Mutex::new(None),
            stopped: AtomicBool::new(false),
        });

        tokio::spawn(manager.metrics.clone().run(metrics_rx));

        let error_manager = manager.clone();
        tokio::spawn(async move {
            while let Some(syslog_error) = errors_rx.recv().await {
                error_manager
                    .send_syslog_error_to_loggregator(&syslog_error.message, &syslog_error.app_id, &syslog_error.drain_url)
                    .await;
            }
        });

        manager
    }

    /// Subscribes to the two app-service discovery queues and runs until
    /// `stop()` (§4.6). Spawns its own task; call once per manager.
    pub fn start(self: &Arc<Self>, mut new_app_services: AppServiceReceiver, mut deleted_app_services: AppServiceReceiver) {
        let manager = self.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    maybe = new_app_services.recv() => {
                        match maybe {
                            Some(app_service) => manager.handle_app_service_add(app_service).await,
                            None => break,
                        }
                    }
                    maybe = deleted_app_services.recv() => {
                        match maybe {
                            Some(app_service) => manager.handle_app_service_delete(app_service).await,
                            None => break,
                        }
                    }
                }
            }
        });
        *self.run_handle.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
    }

    async fn handle_app_service_add(&self, app_service: AppService) {
        if let Err(err) = self.blacklist.validate(&app_service.url).await {
            tracing::warn!(app_id = %app_service.app_id, url = %app_service.url, error = %err, "rejecting drain URL");
            self.emit_error_to_app(&app_service.app_id, &err.as_error_envelope_message()).await;
            return;
        }

        let writer = match self.writer_factory.create(&app_service.app_id, &app_service.url, self.config.sink_skip_cert_verify) {
            Ok(writer) => writer,
            Err(err) => {
                tracing::error!(app_id = %app_service.app_id, url = %app_service.url, error = %err, "failed to construct drain writer");
                self.emit_error_to_app(&app_service.app_id, &err.as_error_envelope_message()).await;
                return;
            }
        };

        let (tx, rx) = mpsc::channel(self.config.inbox_capacity);
        let record = SinkRecord::new(
            SinkId::new(app_service.app_id.clone(), app_service.url.clone()),
            SinkKind::Drain,
            false,
            tx,
            SinkBody::Drain,
        );

        if !self.registry.register(record.clone()) {
            tracing::info!(app_id = %app_service.app_id, url = %app_service.url, "drain sink already registered");
            return;
        }

        let handle = tokio::spawn(sinks::drain::run(
            rx,
            writer,
            Backoff::exponential(Duration::from_secs(1)).with_max(Duration::from_secs(60)),
            self.clock.clone(),
            record.dropped_counter(),
            self.metrics_handle.clone(),
            self.errors_tx.clone(),
            app_service.app_id.clone(),
            app_service.url.clone(),
        ));
        record.set_worker(handle);
        self.metrics.increment_syslog_sinks();
        self.metrics.init_drain_metric(&app_service.app_id, &app_service.url);
    }

    async fn handle_app_service_delete(&self, app_service: AppService) {
        self.unregister_sink(&app_service.app_id, &app_service.url).await;
        self.metrics.remove_drain_metric(&app_service.app_id, &app_service.url);
    }

    async fn emit_error_to_app(&self, app_id: &str, message: &str) {
        let envelope = Envelope::new_error(
            self.clock.now_nanos(),
            self.config.dropsonde_origin.clone(),
            app_id,
            message,
            DRAIN_ERROR_SOURCE_TYPE,
        );
        self.send_to(app_id, envelope).await;
    }

    /// §4.6: constructs an ERROR envelope and routes it to every
    /// error-eligible sink for `app_id`; increments
    /// `numberOfSyslogDrainErrors{app_id, drain_url}`.
    pub async fn send_syslog_error_to_loggregator(&self, message: &str, app_id: &str, drain_url: &str) {
        self.metrics.record_syslog_drain_error(app_id, drain_url);
        self.emit_error_to_app(app_id, message).await;
    }

    /// Lazily ensures the per-type internal sink exists, then routes via the
    /// registry and firehose fan-out (§4.6).
    pub async fn send_to(&self, app_id: &str, envelope: Envelope) {
        match envelope.event_type {
            EventType::LogMessage => self.ensure_dump_sink(app_id).await,
            EventType::ContainerMetric => self.ensure_container_metric_sink(app_id).await,
            EventType::Error => {}
        }
        let envelope = Arc::new(envelope);
        self.registry.route(app_id, &envelope, &self.metrics_handle);
    }

    async fn ensure_dump_sink(&self, app_id: &str) {
        if self.registry.get(app_id, DUMP_SINK_IDENTIFIER).is_some() {
            return;
        }
        let dump_sink = DumpSink::new(self.config.dump_capacity);
        let (tx, rx) = mpsc::channel(self.config.inbox_capacity);
        let record = SinkRecord::new(
            SinkId::new(app_id, DUMP_SINK_IDENTIFIER),
            SinkKind::Dump,
            false,
            tx,
            SinkBody::Dump(dump_sink.clone()),
        );
        if self.registry.register(record.clone()) {
            let handle = tokio::spawn(sinks::dump::run(dump_sink, rx));
            record.set_worker(handle);
            self.metrics.increment_dump_sinks();
        }
    }

    async fn ensure_container_metric_sink(&self, app_id: &str) {
        if self.registry.get(app_id, CONTAINER_METRIC_DRAIN_URL).is_some() {
            return;
        }
        let sink = ContainerMetricSink::new(self.config.container_ttl, self.clock.clone());
        let (tx, rx) = mpsc::channel(self.config.inbox_capacity);
        let record = SinkRecord::new(
            SinkId::new(app_id, CONTAINER_METRIC_DRAIN_URL),
            SinkKind::ContainerMetric,
            false,
            tx,
            SinkBody::ContainerMetric(sink.clone()),
        );
        // Not counted among DumpSinks/SyslogSinks/FirehoseSinks: §4.7 names
        // exactly those three sink-kind counters.
        if self.registry.register(record.clone()) {
            let handle = tokio::spawn(sinks::container_metric::run(
                sink,
                rx,
                self.config.container_inactivity,
                self.sleeper.clone(),
            ));
            record.set_worker(handle);
        }
    }

    pub fn recent_logs_for(&self, app_id: &str) -> Vec<Arc<Envelope>> {
        self.registry
            .get(app_id, DUMP_SINK_IDENTIFIER)
            .and_then(|r| r.body_dump())
            .map(|sink| sink.dump())
            .unwrap_or_default()
    }

    pub fn latest_container_metrics(&self, app_id: &str) -> Vec<Arc<Envelope>> {
        self.registry
            .get(app_id, CONTAINER_METRIC_DRAIN_URL)
            .and_then(|r| r.body_container_metric())
            .map(|sink| sink.get_latest())
            .unwrap_or_default()
    }

    /// Registers an arbitrary per-app sink (test double or external
    /// subscriber); used directly by callers that are not the app-service
    /// add/delete path (e.g. firehose-style direct API registration, §6).
    pub fn register_channel_sink(
        &self,
        stream_id: &str,
        identifier: &str,
        should_receive_errors: bool,
        gated: bool,
    ) -> (bool, Arc<ChannelSink>) {
        let sink = if gated { ChannelSink::new_with_gate_closed() } else { ChannelSink::new() };
        let (tx, rx) = mpsc::channel(self.config.inbox_capacity);
        let record = SinkRecord::new(
            SinkId::new(stream_id, identifier),
            SinkKind::Channel,
            should_receive_errors,
            tx,
            SinkBody::Channel(sink.clone()),
        );
        let registered = self.registry.register(record.clone());
        if registered {
            let handle = tokio::spawn(sinks::channel::run(sink.clone(), rx));
            record.set_worker(handle);
        }
        (registered, sink)
    }

    pub fn register_firehose_sink(
        &self,
        subscription_id: &str,
        identifier: &str,
        should_receive_errors: bool,
        gated: bool,
    ) -> (bool, Arc<ChannelSink>) {
        let sink = if gated { ChannelSink::new_with_gate_closed() } else { ChannelSink::new() };
        let (tx, rx) = mpsc::channel(self.config.inbox_capacity);
        let record = SinkRecord::new(
            SinkId::new(subscription_id, identifier),
            SinkKind::Channel,
            should_receive_errors,
            tx,
            SinkBody::Channel(sink.clone()),
        );
        let registered = self.registry.register_firehose(subscription_id, record.clone());
        if registered {
            let handle = tokio::spawn(sinks::channel::run(sink.clone(), rx));
            record.set_worker(handle);
            self.metrics.increment_firehose_sinks();
        }
        (registered, sink)
    }

    /// Decrements the matching sink-kind counter iff the registry actually
    /// removed the sink (§4.6: "idempotence of counters").
    pub async fn unregister_sink(&self, stream_id: &str, identifier: &str) -> bool {
        let kind = self.registry.get(stream_id, identifier).map(|r| r.kind);
        let removed = self.registry.unregister(stream_id, identifier).await;
        if removed {
            match kind {
                Some(SinkKind::Dump) => self.metrics.decrement_dump_sinks(),
                Some(SinkKind::Drain) => self.metrics.decrement_syslog_sinks(),
                _ => {}
            }
        }
        removed
    }

    pub async fn unregister_firehose_sink(&self, subscription_id: &str, identifier: &str) -> bool {
        let removed = self.registry.unregister_firehose(subscription_id, identifier).await;
        if removed {
            self.metrics.decrement_firehose_sinks();
        }
        removed
    }

    pub fn emit(&self) -> Vec<Metric> {
        self.metrics.emit()
    }

    /// Idempotent (§4.6, §5): closes the stop signal exactly once,
    /// terminates the two service-event consumers, then awaits every
    /// sink's worker exit via `registry.close_all()`.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(true);
        let handle = self.run_handle.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.registry.close_all().await;
    }
}
