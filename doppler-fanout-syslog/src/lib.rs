#![forbid(unsafe_code)]

//! Syslog `DrainWriter`s for doppler-fanout: plain TCP (`syslog://`) and
//! TLS-wrapped TCP (`syslog-tls://`), each framing one envelope per line.

use std::sync::Arc;

use async_trait::async_trait;
use doppler_fanout::{DrainWriter, Envelope, SinkError};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use tokio_rustls::rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use tokio_rustls::rustls::{DigitallySignedStruct, Error as TlsError, SignatureScheme};
use tokio_rustls::{client::TlsStream, TlsConnector};

/// Accepts any server certificate. Only reachable when
/// `SinkManagerConfig::sink_skip_cert_verify` is set (§6); real signature
/// checks are still delegated to the process crypto provider so this only
/// disables chain-of-trust validation, not signature verification.
#[derive(Debug)]
struct NoCertificateVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

fn frame(envelope: &Envelope) -> Option<Vec<u8>> {
    let log = envelope.as_log()?;
    let mut line = log.message.clone();
    line.push(b'\n');
    Some(line)
}

enum Connection {
    Pending { host: String, port: u16 },
    Plain(TcpStream),
}

/// Lazily dials on the first write and stays connected for subsequent ones,
/// matching the `Connected -> Writing` state machine the drain sink expects.
pub struct SyslogWriter {
    url: String,
    conn: Connection,
}

impl SyslogWriter {
    pub fn new(url: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self { url: url.into(), conn: Connection::Pending { host: host.into(), port } }
    }
}

#[async_trait]
impl DrainWriter for SyslogWriter {
    async fn write(&mut self, envelope: &Envelope) -> Result<(), SinkError> {
        let Some(line) = frame(envelope) else { return Ok(()) };

        if let Connection::Pending { host, port } = &self.conn {
            let stream = TcpStream::connect((host.as_str(), *port))
                .await
                .map_err(|err| SinkError::WriterConnectFailed { url: self.url.clone(), reason: err.to_string() })?;
            self.conn = Connection::Plain(stream);
        }

        let Connection::Plain(stream) = &mut self.conn else { unreachable!() };
        stream
            .write_all(&line)
            .await
            .map_err(|err| SinkError::WriterWriteFailed { url: self.url.clone(), reason: err.to_string() })
    }

    async fn close(&mut self) {
        if let Connection::Plain(stream) = &mut self.conn {
            let _ = stream.shutdown().await;
        }
    }
}

enum TlsConnection {
    Pending { host: String, port: u16 },
    Connected(Box<TlsStream<TcpStream>>),
}

/// TLS variant for `syslog-tls://` drain URLs, using the platform's native
/// root store via `rustls-native-certs` (matching the TLS stack the rest of
/// the reference pack reaches for, rather than pulling in `native-tls`).
pub struct SyslogTlsWriter {
    url: String,
    connector: TlsConnector,
    conn: TlsConnection,
}

impl SyslogTlsWriter {
    pub fn new(url: impl Into<String>, host: impl Into<String>, port: u16, skip_cert_verify: bool) -> Result<Self, SinkError> {
        let url = url.into();
        let builder = tokio_rustls::rustls::ClientConfig::builder();
        let tls_config = if skip_cert_verify {
            let provider = CryptoProvider::get_default()
                .cloned()
                .unwrap_or_else(|| Arc::new(tokio_rustls::rustls::crypto::ring::default_provider()));
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoCertificateVerification(provider)))
                .with_no_client_auth()
        } else {
            let native_roots = rustls_native_certs::load_native_certs();
            let mut root_store = tokio_rustls::rustls::RootCertStore::empty();
            for cert in native_roots.certs {
                let _ = root_store.add(cert);
            }
            builder.with_root_certificates(root_store).with_no_client_auth()
        };
        Ok(Self {
            url,
            connector: TlsConnector::from(Arc::new(tls_config)),
            conn: TlsConnection::Pending { host: host.into(), port },
        })
    }
}

#[async_trait]
impl DrainWriter for SyslogTlsWriter {
    async fn write(&mut self, envelope: &Envelope) -> Result<(), SinkError> {
        let Some(line) = frame(envelope) else { return Ok(()) };

        if let TlsConnection::Pending { host, port } = &self.conn {
            let tcp = TcpStream::connect((host.as_str(), *port))
                .await
                .map_err(|err| SinkError::WriterConnectFailed { url: self.url.clone(), reason: err.to_string() })?;
            let server_name = ServerName::try_from(host.clone())
                .map_err(|err| SinkError::WriterConnectFailed { url: self.url.clone(), reason: err.to_string() })?;
            let tls = self
                .connector
                .connect(server_name, tcp)
                .await
                .map_err(|err| SinkError::WriterConnectFailed { url: self.url.clone(), reason: err.to_string() })?;
            self.conn = TlsConnection::Connected(Box::new(tls));
        }

        let TlsConnection::Connected(stream) = &mut self.conn else { unreachable!() };
        stream
            .write_all(&line)
            .await
            .map_err(|err| SinkError::WriterWriteFailed { url: self.url.clone(), reason: err.to_string() })
    }

    async fn close(&mut self) {
        if let TlsConnection::Connected(stream) = &mut self.conn {
            let _ = stream.shutdown().await;
        }
    }
}

fn split_host_port(url: &str, scheme: &str) -> Option<(String, u16)> {
    let rest = url.strip_prefix(scheme)?;
    let (host, port) = rest.rsplit_once(':')?;
    Some((host.to_string(), port.parse().ok()?))
}

/// Builds [`SyslogWriter`]/[`SyslogTlsWriter`] from `syslog://` and
/// `syslog-tls://` drain URLs respectively.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyslogWriterFactory;

impl doppler_fanout::WriterFactory for SyslogWriterFactory {
    fn create(&self, _app_id: &str, url: &str, skip_cert_verify: bool) -> Result<Box<dyn DrainWriter>, SinkError> {
        if let Some((host, port)) = split_host_port(url, "syslog-tls://") {
            let writer = SyslogTlsWriter::new(url, host, port, skip_cert_verify)?;
            return Ok(Box::new(writer));
        }
        if let Some((host, port)) = split_host_port(url, "syslog://") {
            return Ok(Box::new(SyslogWriter::new(url, host, port)));
        }
        Err(SinkError::UnsupportedScheme { scheme: url.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_host_port_parses_plain_syslog_urls() {
        assert_eq!(split_host_port("syslog://10.0.0.1:514", "syslog://"), Some(("10.0.0.1".to_string(), 514)));
    }

    #[test]
    fn split_host_port_rejects_mismatched_scheme() {
        assert_eq!(split_host_port("https://10.0.0.1:443", "syslog://"), None);
    }

    #[test]
    fn factory_rejects_unsupported_scheme() {
        let factory = SyslogWriterFactory;
        assert!(factory.create("app", "https://10.0.0.1:443", false).is_err());
    }
}
