//! Manager configuration (§6): a plain builder-style struct, validated at
//! construction, matching the teacher's `RetryPolicy::builder()` idiom
//! rather than pulling in an external config crate for in-process tuning.

use std::time::Duration;

/// Configuration error returned by [`SinkManagerConfigBuilder::build`].
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("inbox_capacity must be >= 1")]
    InboxCapacityZero,
    #[error("dump_capacity must be >= 1")]
    DumpCapacityZero,
}

/// Manager-wide configuration (§6's options table).
#[derive(Debug, Clone)]
pub struct SinkManagerConfig {
    pub dump_capacity: usize,
    pub container_ttl: Duration,
    pub container_inactivity: Duration,
    pub inbox_capacity: usize,
    pub error_channel_size: usize,
    pub sink_skip_cert_verify: bool,
    pub dropsonde_origin: String,
}

impl Default for SinkManagerConfig {
    fn default() -> Self {
        Self {
            dump_capacity: 100,
            container_ttl: Duration::from_secs(60),
            container_inactivity: Duration::from_secs(60),
            inbox_capacity: 100,
            error_channel_size: 100,
            sink_skip_cert_verify: false,
            dropsonde_origin: "doppler".to_string(),
        }
    }
}

impl SinkManagerConfig {
    pub fn builder() -> SinkManagerConfigBuilder {
        SinkManagerConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SinkManagerConfigBuilder {
    config: SinkManagerConfig,
}

impl SinkManagerConfigBuilder {
    pub fn dump_capacity(mut self, n: usize) -> Self {
        self.config.dump_capacity = n;
        self
    }

    pub fn container_ttl(mut self, d: Duration) -> Self {
        self.config.container_ttl = d;
        self
    }

    pub fn container_inactivity(mut self, d: Duration) -> Self {
        self.config.container_inactivity = d;
        self
    }

    pub fn inbox_capacity(mut self, n: usize) -> Self {
        self.config.inbox_capacity = n;
        self
    }

    pub fn error_channel_size(mut self, n: usize) -> Self {
        self.config.error_channel_size = n;
        self
    }

    pub fn sink_skip_cert_verify(mut self, skip: bool) -> Self {
        self.config.sink_skip_cert_verify = skip;
        self
    }

    pub fn dropsonde_origin(mut self, origin: impl Into<String>) -> Self {
        self.config.dropsonde_origin = origin.into();
        self
    }

    pub fn build(self) -> Result<SinkManagerConfig, ConfigError> {
        let config = self.config;
        if config.inbox_capacity == 0 {
            return Err(ConfigError::InboxCapacityZero);
        }
        if config.dump_capacity == 0 {
            return Err(ConfigError::DumpCapacityZero);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SinkManagerConfig::builder().build().is_ok());
    }

    #[test]
    fn zero_inbox_capacity_is_rejected() {
        let err = SinkManagerConfig::builder().inbox_capacity(0).build().unwrap_err();
        assert_eq!(err, ConfigError::InboxCapacityZero);
    }

    #[test]
    fn builder_overrides_apply() {
        let config = SinkManagerConfig::builder()
            .dump_capacity(50)
            .dropsonde_origin("my-origin")
            .build()
            .unwrap();
        assert_eq!(config.dump_capacity, 50);
        assert_eq!(config.dropsonde_origin, "my-origin");
    }
}
