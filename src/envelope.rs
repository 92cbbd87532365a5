//! The envelope: the single event record that flows from producers through
//! the registry into every matching sink's inbox.

use std::sync::Arc;

/// Which kind of event an [`Envelope`] carries.
///
/// Kept as an explicit discriminant (rather than inferring the kind from
/// `payload`'s variant) because `Error` envelopes carry the same shape as a
/// `LogMessage` envelope (see [`LogPayload`]) but must route differently:
/// only `LogMessage` envelopes are eligible for dump-sink storage (§4.1),
/// while `Error` envelopes are only ever delivered to error-eligible sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    LogMessage,
    ContainerMetric,
    Error,
}

/// `OUT` (stdout-like) vs `ERR` (stderr-like) log messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Out,
    Err,
}

/// Payload of a `LogMessage` or `Error` envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPayload {
    pub message: Vec<u8>,
    pub source_type: String,
    pub source_instance: String,
    pub message_type: MessageType,
}

/// Payload of a `ContainerMetric` envelope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerMetricPayload {
    pub instance_index: i32,
    pub cpu: f64,
    pub memory: u64,
    pub disk: u64,
}

/// The type-dependent body of an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Log(LogPayload),
    ContainerMetric(ContainerMetricPayload),
}

/// An immutable event record, shared read-only across every consumer once
/// published (§3). Cheap to fan out: callers pass around `Arc<Envelope>`
/// rather than cloning the payload per sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub event_type: EventType,
    /// Nanoseconds since the Unix epoch.
    pub timestamp_ns: u64,
    pub origin: String,
    pub app_id: Option<String>,
    pub payload: Payload,
}

impl Envelope {
    pub fn new_log(
        timestamp_ns: u64,
        origin: impl Into<String>,
        app_id: impl Into<String>,
        message_type: MessageType,
        message: impl Into<Vec<u8>>,
        source_type: impl Into<String>,
        source_instance: impl Into<String>,
    ) -> Self {
        Self {
            event_type: EventType::LogMessage,
            timestamp_ns,
            origin: origin.into(),
            app_id: Some(app_id.into()),
            payload: Payload::Log(LogPayload {
                message: message.into(),
                source_type: source_type.into(),
                source_instance: source_instance.into(),
                message_type,
            }),
        }
    }

    /// Build an `ERROR` envelope the way the manager's error-feedback path
    /// does (§4.3, §4.6): an error is represented as a log-shaped payload
    /// tagged with the `Error` event type, not a `LogMessage` one, so it is
    /// never mistaken for ordinary application output by the dump sink.
    pub fn new_error(
        timestamp_ns: u64,
        origin: impl Into<String>,
        app_id: impl Into<String>,
        message: impl Into<String>,
        source_type: impl Into<String>,
    ) -> Self {
        Self {
            event_type: EventType::Error,
            timestamp_ns,
            origin: origin.into(),
            app_id: Some(app_id.into()),
            payload: Payload::Log(LogPayload {
                message: message.into().into_bytes(),
                source_type: source_type.into(),
                source_instance: String::new(),
                message_type: MessageType::Err,
            }),
        }
    }

    pub fn new_container_metric(
        timestamp_ns: u64,
        origin: impl Into<String>,
        app_id: impl Into<String>,
        instance_index: i32,
        cpu: f64,
        memory: u64,
        disk: u64,
    ) -> Self {
        Self {
            event_type: EventType::ContainerMetric,
            timestamp_ns,
            origin: origin.into(),
            app_id: Some(app_id.into()),
            payload: Payload::ContainerMetric(ContainerMetricPayload {
                instance_index,
                cpu,
                memory,
                disk,
            }),
        }
    }

    pub fn as_log(&self) -> Option<&LogPayload> {
        match &self.payload {
            Payload::Log(p) => Some(p),
            Payload::ContainerMetric(_) => None,
        }
    }

    pub fn as_container_metric(&self) -> Option<&ContainerMetricPayload> {
        match &self.payload {
            Payload::ContainerMetric(p) => Some(p),
            Payload::Log(_) => None,
        }
    }

    pub fn into_shared(self) -> Arc<Envelope> {
        Arc::new(self)
    }
}
