//! The writer capability a remote drain sink forwards envelopes to.
//!
//! Concrete network writers (syslog, syslog-tls, HTTPS) are out of scope for
//! this crate (§1) and live in the `doppler-fanout-https` /
//! `doppler-fanout-syslog` companion crates; this module only defines the
//! contract and a factory keyed by URL scheme, plus the no-op writers used
//! by tests.

use async_trait::async_trait;
use std::fmt;

use crate::envelope::Envelope;
use crate::error::SinkError;

/// A remote endpoint a drain sink forwards envelopes to.
#[async_trait]
pub trait DrainWriter: Send {
    async fn write(&mut self, envelope: &Envelope) -> Result<(), SinkError>;
    async fn close(&mut self);
}

/// Constructs a [`DrainWriter`] for a validated, scheme-supported URL.
///
/// Implementations are expected to be cheap and non-blocking; the actual
/// network connection is established lazily on first write, matching the
/// `Connected -> Writing` state machine in §4.3. `skip_cert_verify` forwards
/// `SinkManagerConfig::sink_skip_cert_verify` (§6) so a TLS-capable writer
/// (e.g. `syslog-tls://`, `https://`) can bypass certificate verification
/// when the operator has explicitly opted into that; writers with no TLS
/// concern ignore it.
pub trait WriterFactory: Send + Sync + fmt::Debug {
    fn create(&self, app_id: &str, url: &str, skip_cert_verify: bool) -> Result<Box<dyn DrainWriter>, SinkError>;
}

/// Writer that always succeeds; used in tests and as a harmless default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullWriter;

#[async_trait]
impl DrainWriter for NullWriter {
    async fn write(&mut self, _envelope: &Envelope) -> Result<(), SinkError> {
        Ok(())
    }

    async fn close(&mut self) {}
}

/// Factory producing [`NullWriter`]s regardless of URL, for tests that only
/// care about registration/routing behavior, not real transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullWriterFactory;

impl WriterFactory for NullWriterFactory {
    fn create(&self, _app_id: &str, _url: &str, _skip_cert_verify: bool) -> Result<Box<dyn DrainWriter>, SinkError> {
        Ok(Box::new(NullWriter))
    }
}
