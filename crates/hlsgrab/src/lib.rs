//! # hlsgrab engine
//!
//! Acquires a VOD-style HLS playlist and reconstructs it as a single ordered,
//! decrypted MPEG-TS byte stream.
//!
//! ## Features
//!
//! - Tolerant line-oriented playlist parsing (`EXTINF`, `EXT-X-BYTERANGE`, `EXT-X-KEY`, `EXT-X-ENDLIST`)
//! - Bounded-concurrency segment fetching into an ordered slot array
//! - AES-128-CBC decryption with per-URI key memoization
//! - Task state machine with progress, pause and cancellation events
//! - Pluggable output sinks and optional `.ts` to `.mp4` remuxing

pub mod builder;
pub mod client;
pub mod config;
pub mod controller;
pub mod convert;
pub mod error;
pub mod events;
pub mod hls;
pub mod output;
pub mod task;

#[cfg(test)]
mod testing;

pub use builder::{DownloaderConfigBuilder, HlsConfigBuilder};
pub use client::{FetchRequest, HttpClient, HttpFetch, ResourceKind, create_client};
pub use config::DownloaderConfig;
pub use controller::{ControlRequest, ControlResponse, DownloadController, DownloadControllerBuilder};
pub use convert::{ContainerConverter, FfmpegRemuxer};
pub use error::{
    ControllerError, ConvertError, DecryptError, FetchError, MergeError, ParseError, PersistError,
    TaskError,
};
pub use events::TaskEvent;
pub use hls::HlsConfig;
pub use output::{FileSink, OutputSink, PersistId, sanitize_filename};
pub use task::{DownloadTaskSummary, StartOptions, TaskId, TaskOutput, TaskStatus};
