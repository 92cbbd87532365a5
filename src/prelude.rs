//! Convenient re-exports for common doppler-fanout types.
pub use crate::{
    app_service_channel, AppService, AppServiceReceiver, AppServiceSender, Backoff, Blacklist,
    ChannelSink, Clock, ConfigError, ContainerMetricPayload, ContainerMetricSink, DrainMetric,
    DrainWriter, DumpSink, Envelope, EventType, FakeClock, InstantSleeper, IpRange, LogPayload,
    MessageType, Metric, MetricsAggregator, MetricsHandle, NullWriter, NullWriterFactory, Payload,
    Scheme, SinkBody, SinkError, SinkId, SinkKind, SinkManager, SinkManagerConfig,
    SinkManagerConfigBuilder, SinkRecord, SinkRegistry, Sleeper, SyslogError, SystemClock,
    TokioSleeper, TrackingSleeper, WriterFactory,
};
