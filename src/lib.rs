#![forbid(unsafe_code)]

//! # doppler-fanout
//!
//! The sink-management core of a log/metric aggregator node: dynamic
//! fan-out of envelopes to dump-ring, container-metric, remote-drain, and
//! firehose sinks under concurrency.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use doppler_fanout::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let manager = SinkManager::new(
//!     SinkManagerConfig::default(),
//!     Blacklist::default(),
//!     Arc::new(NullWriterFactory),
//!     Arc::new(SystemClock),
//!     Arc::new(TokioSleeper),
//! );
//!
//! let envelope = Envelope::new_log(1, "origin", "my-app", MessageType::Out, b"hello".to_vec(), "APP", "0");
//! manager.send_to("my-app", envelope).await;
//! assert_eq!(manager.recent_logs_for("my-app").len(), 1);
//!
//! manager.stop().await;
//! # }
//! ```

mod appservice;
mod backoff;
mod blacklist;
mod clock;
mod config;
mod envelope;
mod error;
mod manager;
mod metrics;
mod registry;
mod sink;
mod sinks;
mod sleeper;
mod writer;

pub use appservice::{app_service_channel, AppService, AppServiceReceiver, AppServiceSender};
pub use backoff::Backoff;
pub use blacklist::{Blacklist, IpRange, Scheme};
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{ConfigError, SinkManagerConfig, SinkManagerConfigBuilder};
pub use envelope::{ContainerMetricPayload, Envelope, EventType, LogPayload, MessageType, Payload};
pub use error::SinkError;
pub use manager::SinkManager;
pub use metrics::{DrainMetric, Metric, MetricsAggregator, MetricsHandle};
pub use registry::SinkRegistry;
pub use sink::{SinkBody, SinkId, SinkKind, SinkRecord};
pub use sinks::channel::ChannelSink;
pub use sinks::container_metric::ContainerMetricSink;
pub use sinks::drain::SyslogError;
pub use sinks::dump::DumpSink;
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use writer::{DrainWriter, NullWriter, NullWriterFactory, WriterFactory};

pub mod prelude;
