//! Error types for sink construction and remote drain writes.

use thiserror::Error;

/// Errors arising while validating a drain URL or operating its writer.
///
/// Mirrors the teacher's closed, well-named failure enum rather than a
/// generic `Inner(E)` wrapper: every variant here is a specific condition
/// named in the error-handling design, not an opaque passthrough.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("drain URL resolves to a blacklisted IP: {url}")]
    BlacklistedDrainUrl { url: String },

    #[error("drain URL is malformed: {url}")]
    MalformedDrainUrl { url: String },

    #[error("drain URL uses an unsupported scheme: {scheme}")]
    UnsupportedScheme { scheme: String },

    #[error("failed to connect drain writer for {url}: {reason}")]
    WriterConnectFailed { url: String, reason: String },

    #[error("failed to write to drain {url}: {reason}")]
    WriterWriteFailed { url: String, reason: String },
}

impl SinkError {
    pub fn is_blacklisted(&self) -> bool {
        matches!(self, Self::BlacklistedDrainUrl { .. })
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedDrainUrl { .. })
    }

    pub fn is_unsupported_scheme(&self) -> bool {
        matches!(self, Self::UnsupportedScheme { .. })
    }

    pub fn is_writer_connect_failed(&self) -> bool {
        matches!(self, Self::WriterConnectFailed { .. })
    }

    pub fn is_writer_write_failed(&self) -> bool {
        matches!(self, Self::WriterWriteFailed { .. })
    }

    /// The message stamped onto the ERROR envelope routed back to the app
    /// (§7: "URL errors are surfaced as ERROR LogMessage envelopes").
    pub fn as_error_envelope_message(&self) -> String {
        match self {
            Self::BlacklistedDrainUrl { url } | Self::MalformedDrainUrl { url } => {
                format!("Invalid syslog drain URL: {url}")
            }
            Self::UnsupportedScheme { scheme } => {
                format!("Invalid syslog drain URL: unsupported scheme {scheme}")
            }
            Self::WriterConnectFailed { url, reason } => {
                format!("Error connecting to drain {url}: {reason}")
            }
            Self::WriterWriteFailed { url, reason } => {
                format!("Error writing to drain {url}: {reason}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blacklisted_message_matches_s3_scenario_text() {
        let err = SinkError::BlacklistedDrainUrl { url: "syslog://10.10.10.11:884".into() };
        assert!(err.as_error_envelope_message().contains("Invalid syslog drain URL"));
        assert!(err.is_blacklisted());
    }

    #[test]
    fn predicates_are_mutually_exclusive() {
        let err = SinkError::WriterWriteFailed { url: "https://x".into(), reason: "timeout".into() };
        assert!(err.is_writer_write_failed());
        assert!(!err.is_blacklisted());
        assert!(!err.is_malformed());
    }
}
