//! # HTTP Client Factory
//!
//! Centralized HTTP client creation so the benchmark and chat paths share the
//! same connection settings.
//!
//! No whole-request timeout is ever set: a streaming completion may legitimately
//! run for minutes, and a request timeout would cut it off mid-stream. Idle
//! streams are bounded by the optional read timeout instead.

use crate::config::Config;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// HTTP client configuration errors
#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("Failed to build HTTP client: {0}")]
    BuildError(#[from] reqwest::Error),
    #[error("Invalid HTTP client configuration: {0}")]
    InvalidConfig(String),
}

/// HTTP client pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_idle_per_host: usize,
    pub idle_timeout: Duration,
    pub keepalive: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 32,
            idle_timeout: Duration::from_secs(90),
            keepalive: Some(Duration::from_secs(60)),
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub connect_timeout: Duration,
    /// Maximum silence between two reads of a response body.
    pub read_timeout: Option<Duration>,
    pub pool: PoolConfig,
    /// Compressed bodies are decoded in blocks, which skews arrival timestamps,
    /// so this is off unless asked for.
    pub compression: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: None,
            pool: PoolConfig::default(),
            compression: false,
        }
    }
}

impl From<&Config> for HttpClientConfig {
    fn from(config: &Config) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout),
            read_timeout: config.read_timeout.map(Duration::from_secs),
            pool: PoolConfig::default(),
            compression: false,
        }
    }
}

/// HTTP client builder with configurable options
pub struct HttpClientBuilder {
    config: HttpClientConfig,
}

impl HttpClientBuilder {
    /// Create a new HTTP client builder with default configuration
    pub fn new() -> Self {
        Self {
            config: HttpClientConfig::default(),
        }
    }

    /// Create HTTP client builder from application configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            config: HttpClientConfig::from(config),
        }
    }

    /// Set connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the maximum idle time between two body reads
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = Some(timeout);
        self
    }

    /// Set pool configuration
    pub fn pool_config(mut self, pool: PoolConfig) -> Self {
        self.config.pool = pool;
        self
    }

    /// Enable or disable compression
    pub fn compression(mut self, enabled: bool) -> Self {
        self.config.compression = enabled;
        self
    }

    /// Build the HTTP client
    pub fn build(self) -> Result<Client, HttpClientError> {
        if self.config.connect_timeout.is_zero() {
            return Err(HttpClientError::InvalidConfig(
                "connect timeout must be greater than zero".to_string(),
            ));
        }

        let mut builder = Client::builder()
            .connect_timeout(self.config.connect_timeout)
            .pool_max_idle_per_host(self.config.pool.max_idle_per_host)
            .pool_idle_timeout(self.config.pool.idle_timeout)
            .tcp_nodelay(true)
            .gzip(self.config.compression)
            .brotli(self.config.compression);

        if let Some(keepalive) = self.config.pool.keepalive {
            builder = builder.tcp_keepalive(keepalive);
        }

        if let Some(read_timeout) = self.config.read_timeout {
            builder = builder.read_timeout(read_timeout);
        }

        builder.build().map_err(HttpClientError::from)
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_client_builder() {
        let client = HttpClientBuilder::new().build().unwrap();
        // Basic smoke test - if it builds, the configuration is valid
        assert!(client.get("http://localhost:8080/v1/models").build().is_ok());
    }

    #[test]
    fn test_builder_from_config() {
        let mut config = Config::for_test();
        config.connect_timeout = 3;
        config.read_timeout = Some(45);

        let http = HttpClientConfig::from(&config);
        assert_eq!(http.connect_timeout, Duration::from_secs(3));
        assert_eq!(http.read_timeout, Some(Duration::from_secs(45)));
        assert!(!http.compression);
        assert!(HttpClientBuilder::from_config(&config).build().is_ok());
    }

    #[test]
    fn test_zero_connect_timeout_is_rejected() {
        let result = HttpClientBuilder::new()
            .connect_timeout(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(HttpClientError::InvalidConfig(_))));
    }
}
