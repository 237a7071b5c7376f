//! # Configuration builders
//!
//! Fluent builders for [`DownloaderConfig`] and [`HlsConfig`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use hlsgrab_engine::{DownloaderConfig, HlsConfig};
//!
//! let base = DownloaderConfig::builder()
//!     .with_connect_timeout(Duration::from_secs(15))
//!     .with_user_agent("MyApp/1.0")
//!     .with_header("Referer", "https://example.com/")
//!     .build();
//!
//! let config = HlsConfig::builder()
//!     .with_base_config(base)
//!     .max_concurrent(4)
//!     .segment_retry_count(5)
//!     .build();
//!
//! assert_eq!(config.scheduler_config.max_concurrent, 4);
//! ```

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::{DownloaderConfig, HlsConfig};

/// Builder for creating DownloaderConfig instances with a fluent API
#[derive(Debug, Clone)]
pub struct DownloaderConfigBuilder {
    config: DownloaderConfig,
}

impl DownloaderConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: DownloaderConfig::default(),
        }
    }

    /// Set the overall timeout for a request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout (time to establish initial connection)
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn with_pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Set whether to follow redirects
    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Add a custom HTTP header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.as_ref().parse::<reqwest::header::HeaderName>(),
            HeaderValue::from_str(value.as_ref()),
        ) {
            self.config.headers.insert(name, value);
        }
        self
    }

    /// Add headers on top of the defaults
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in headers.iter() {
            self.config.headers.insert(name.clone(), value.clone());
        }
        self
    }

    /// Set whether to accept invalid certificates
    ///
    /// # Warning
    /// Only for testing or controlled environments.
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.config.danger_accept_invalid_certs = accept;
        self
    }

    pub fn build(self) -> DownloaderConfig {
        self.config
    }
}

impl Default for DownloaderConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for the engine configuration
#[derive(Debug, Clone, Default)]
pub struct HlsConfigBuilder {
    config: HlsConfig,
}

impl HlsConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `base` for the HTTP client. Its headers are merged over the defaults.
    pub fn with_base_config(mut self, base: DownloaderConfig) -> Self {
        self.config.base = DownloaderConfig::with_config(base);
        self
    }

    /// Number of concurrent segment workers. Values below 1 are raised to 1.
    pub fn max_concurrent(mut self, workers: usize) -> Self {
        self.config.scheduler_config.max_concurrent = workers.max(1);
        self
    }

    pub fn segment_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetcher_config.segment_download_timeout = timeout;
        self
    }

    pub fn segment_retry_count(mut self, retries: u32) -> Self {
        self.config.fetcher_config.max_segment_retries = retries;
        self
    }

    pub fn segment_retry_delay(mut self, base: Duration) -> Self {
        self.config.fetcher_config.segment_retry_delay_base = base;
        self
    }

    pub fn key_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetcher_config.key_download_timeout = timeout;
        self
    }

    pub fn key_retry_count(mut self, retries: u32) -> Self {
        self.config.fetcher_config.max_key_retries = retries;
        self
    }

    pub fn playlist_timeout(mut self, timeout: Duration) -> Self {
        self.config.playlist_config.fetch_timeout = timeout;
        self
    }

    pub fn playlist_retry_count(mut self, retries: u32) -> Self {
        self.config.playlist_config.max_retries = retries;
        self
    }

    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.event_config.channel_capacity = capacity.max(1);
        self
    }

    /// Access the raw configuration for more advanced customization
    pub fn with_config<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut HlsConfig),
    {
        f(&mut self.config);
        self
    }

    pub fn build(self) -> HlsConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_ignores_invalid_header() {
        let config = DownloaderConfig::builder()
            .with_header("Bad Header", "value")
            .with_header("X-Token", "abc")
            .build();
        assert_eq!(config.headers["x-token"], "abc");
        assert!(!config.headers.contains_key("bad header"));
    }

    #[test]
    fn test_base_config_keeps_default_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::REFERER,
            HeaderValue::from_static("https://example.com/"),
        );
        let base = DownloaderConfig {
            headers,
            ..Default::default()
        };

        let config = HlsConfig::builder().with_base_config(base).build();
        assert_eq!(
            config.base.headers[reqwest::header::REFERER],
            "https://example.com/"
        );
        assert!(config.base.headers.contains_key(reqwest::header::ACCEPT));
    }

    #[test]
    fn test_hls_builder_clamps_concurrency() {
        let config = HlsConfig::builder().max_concurrent(0).build();
        assert_eq!(config.scheduler_config.max_concurrent, 1);
    }

    #[test]
    fn test_hls_builder_sets_fetcher_knobs() {
        let config = HlsConfig::builder()
            .segment_timeout(Duration::from_secs(7))
            .segment_retry_count(0)
            .key_retry_count(1)
            .build();
        assert_eq!(
            config.fetcher_config.segment_download_timeout,
            Duration::from_secs(7)
        );
        assert_eq!(config.fetcher_config.max_segment_retries, 0);
        assert_eq!(config.fetcher_config.max_key_retries, 1);
    }
}
