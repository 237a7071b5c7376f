use std::time::Duration;

use crate::DownloaderConfig;
use crate::client::ResourceKind;

// --- Top-Level Configuration ---
#[derive(Debug, Clone, Default)]
pub struct HlsConfig {
    /// Base downloader configuration
    pub base: DownloaderConfig,
    pub playlist_config: HlsPlaylistConfig,
    pub fetcher_config: HlsFetcherConfig,
    pub scheduler_config: HlsSchedulerConfig,
    pub event_config: HlsEventConfig,
}

impl HlsConfig {
    pub fn builder() -> crate::builder::HlsConfigBuilder {
        crate::builder::HlsConfigBuilder::new()
    }

    /// Timeout and retry budget for one kind of request.
    pub fn retry_policy(&self, kind: ResourceKind) -> RetryPolicy {
        match kind {
            ResourceKind::Playlist => RetryPolicy {
                timeout: self.playlist_config.fetch_timeout,
                max_retries: self.playlist_config.max_retries,
                retry_delay_base: self.playlist_config.retry_delay_base,
            },
            ResourceKind::Key => RetryPolicy {
                timeout: self.fetcher_config.key_download_timeout,
                max_retries: self.fetcher_config.max_key_retries,
                retry_delay_base: self.fetcher_config.key_retry_delay_base,
            },
            ResourceKind::Segment => RetryPolicy {
                timeout: self.fetcher_config.segment_download_timeout,
                max_retries: self.fetcher_config.max_segment_retries,
                retry_delay_base: self.fetcher_config.segment_retry_delay_base,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay_base: Duration, // Base for exponential backoff
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.retry_delay_base
            .saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

// --- Playlist Configuration ---
#[derive(Debug, Clone)]
pub struct HlsPlaylistConfig {
    pub fetch_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay_base: Duration,
}

impl Default for HlsPlaylistConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(15),
            max_retries: 2,
            retry_delay_base: Duration::from_millis(500),
        }
    }
}

// --- Fetcher Configuration ---
#[derive(Debug, Clone)]
pub struct HlsFetcherConfig {
    pub segment_download_timeout: Duration,
    pub max_segment_retries: u32,
    pub segment_retry_delay_base: Duration,
    pub key_download_timeout: Duration,
    pub max_key_retries: u32,
    pub key_retry_delay_base: Duration,
}

impl Default for HlsFetcherConfig {
    fn default() -> Self {
        Self {
            segment_download_timeout: Duration::from_secs(20),
            max_segment_retries: 3,
            segment_retry_delay_base: Duration::from_millis(500),
            key_download_timeout: Duration::from_secs(5),
            max_key_retries: 3,
            key_retry_delay_base: Duration::from_millis(200),
        }
    }
}

// --- Scheduler Configuration ---
#[derive(Debug, Clone)]
pub struct HlsSchedulerConfig {
    /// Number of workers, each owning one contiguous range of segments
    pub max_concurrent: usize,
}

impl Default for HlsSchedulerConfig {
    fn default() -> Self {
        Self { max_concurrent: 3 }
    }
}

// --- Event Configuration ---
#[derive(Debug, Clone)]
pub struct HlsEventConfig {
    /// Capacity of the broadcast channel carrying task events
    pub channel_capacity: usize,
}

impl Default for HlsEventConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}
