use std::sync::Arc;

use url::Url;

use crate::task::{TaskId, TaskStatus};

/// A segment, key or playlist request that did not produce a body.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Server returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("Network error fetching {url}: {message}")]
    Network { url: String, message: String },
    #[error("Request timed out: {url}")]
    Timeout { url: String },
    #[error("Byte range {range} lies outside the {len}-byte body of {url}")]
    RangeUnsatisfiable { url: String, range: String, len: usize },
}

impl FetchError {
    pub(crate) fn from_reqwest(url: &Url, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::Network { .. } | FetchError::Timeout { .. } => true,
            FetchError::RangeUnsatisfiable { .. } => false,
        }
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Playlist could not be fetched: {0}")]
    Fetch(#[from] FetchError),
}

/// Recovered locally by the decryptor; never escalates to a task failure.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum DecryptError {
    #[error("Invalid AES-128 key or IV (key is {key_len} bytes)")]
    InvalidKeyOrIv { key_len: usize },
    #[error("Ciphertext is not block aligned or has invalid padding")]
    Padding,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("Segment {0} has no data")]
    MissingSegment(usize),
}

#[derive(Debug, thiserror::Error, Clone)]
pub enum PersistError {
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: Arc<std::io::Error>,
    },
    #[error("Invalid output filename: {0}")]
    InvalidFilename(String),
    #[error("Output rejected: {0}")]
    Rejected(String),
}

/// Container conversion failures. Reported as informational events only.
#[derive(Debug, thiserror::Error, Clone)]
pub enum ConvertError {
    #[error("Converter is not available: {0}")]
    Unavailable(String),
    #[error("I/O error during conversion: {source}")]
    Io {
        #[from]
        source: Arc<std::io::Error>,
    },
    #[error("Converter exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("Conversion timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<std::io::Error> for ConvertError {
    fn from(err: std::io::Error) -> Self {
        ConvertError::Io {
            source: Arc::new(err),
        }
    }
}

/// Fatal task failure, carried in the `Error` status message.
#[derive(Debug, thiserror::Error, Clone)]
pub enum TaskError {
    #[error("Failed to load playlist: {0}")]
    Playlist(#[from] ParseError),
    #[error("Playlist contains no segments")]
    EmptyPlaylist,
    #[error("Segment {index} failed: {source}")]
    Segment { index: usize, source: FetchError },
    #[error("Merge failed: {0}")]
    Merge(#[from] MergeError),
    #[error("Failed to save output: {0}")]
    Persist(#[from] PersistError),
}

#[derive(Debug, thiserror::Error, Clone)]
pub enum ControllerError {
    #[error("Invalid playlist URL: {0}")]
    InvalidUrl(String),
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),
    #[error("Task {task_id} is {status} and cannot change state")]
    InvalidState { task_id: TaskId, status: TaskStatus },
    #[error("HTTP client error: {source}")]
    Client {
        #[from]
        source: Arc<reqwest::Error>,
    },
    #[error("No async runtime available to run the task")]
    NoRuntime,
}

impl From<reqwest::Error> for ControllerError {
    fn from(err: reqwest::Error) -> Self {
        ControllerError::Client {
            source: Arc::new(err),
        }
    }
}
