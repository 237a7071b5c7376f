// HLS acquisition pipeline: playlist parsing, key resolution, segment fetching,
// decryption and merging.

pub mod config;
pub mod decryption;
pub mod fetcher;
pub mod key_cache;
pub mod merger;
pub mod playlist;
pub mod scheduler;

// Re-exports for easier access
pub use config::HlsConfig;
pub use fetcher::SegmentFetcher;
pub use key_cache::KeyCache;
pub use merger::{TS_CONTENT_TYPE, merge_segments};
pub use playlist::{ByteRange, ParsedPlaylist, PlaylistLoader, SegmentDescriptor, SegmentKey, parse_playlist};
pub use scheduler::{ScheduleOutcome, SegmentScheduler};
