#![forbid(unsafe_code)]

//! HTTPS `DrainWriter` for doppler-fanout: POSTs each envelope's log payload
//! as a single request body to a drain URL using the `https` scheme.

use async_trait::async_trait;
use doppler_fanout::{DrainWriter, Envelope, SinkError};
use reqwest::Client;

/// Lazily connects on first write, matching the `Connected -> Writing` state
/// machine doppler-fanout's drain sink expects from a writer (the `reqwest`
/// client itself is cheap to construct, but we defer building the request
/// URL until a write is attempted so a never-written drain never makes a
/// DNS/TLS handshake).
pub struct HttpsWriter {
    client: Client,
    url: String,
}

impl HttpsWriter {
    pub fn new(url: impl Into<String>, skip_cert_verify: bool) -> Result<Self, SinkError> {
        let url = url.into();
        let client = Client::builder()
            .danger_accept_invalid_certs(skip_cert_verify)
            .build()
            .map_err(|err| SinkError::WriterConnectFailed { url: url.clone(), reason: err.to_string() })?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl DrainWriter for HttpsWriter {
    async fn write(&mut self, envelope: &Envelope) -> Result<(), SinkError> {
        let body = match envelope.as_log() {
            Some(log) => log.message.clone(),
            None => return Ok(()),
        };
        let response = self
            .client
            .post(&self.url)
            .body(body)
            .send()
            .await
            .map_err(|err| SinkError::WriterWriteFailed { url: self.url.clone(), reason: err.to_string() })?;

        if !response.status().is_success() {
            return Err(SinkError::WriterWriteFailed {
                url: self.url.clone(),
                reason: format!("drain responded with status {}", response.status()),
            });
        }
        Ok(())
    }

    async fn close(&mut self) {}
}

/// Builds an [`HttpsWriter`] for `https://` drain URLs.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpsWriterFactory;

impl std::fmt::Debug for HttpsWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpsWriter").field("url", &self.url).finish()
    }
}

impl doppler_fanout::WriterFactory for HttpsWriterFactory {
    fn create(&self, _app_id: &str, url: &str, skip_cert_verify: bool) -> Result<Box<dyn DrainWriter>, SinkError> {
        if !url.starts_with("https://") {
            return Err(SinkError::UnsupportedScheme { scheme: url.to_string() });
        }
        Ok(Box::new(HttpsWriter::new(url, skip_cert_verify)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doppler_fanout::WriterFactory;

    #[test]
    fn factory_rejects_non_https_urls() {
        let factory = HttpsWriterFactory;
        assert!(factory.create("app", "syslog://127.0.0.1:514", false).is_err());
    }

    #[test]
    fn factory_accepts_https_urls() {
        let factory = HttpsWriterFactory;
        assert!(factory.create("app", "https://example.com:443", false).is_ok());
    }

    #[test]
    fn factory_honors_skip_cert_verify() {
        let factory = HttpsWriterFactory;
        assert!(factory.create("app", "https://example.com:443", true).is_ok());
    }
}
