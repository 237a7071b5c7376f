// Download task model: identity, lifecycle state machine and shared per-task state.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::hls::playlist::SegmentDescriptor;
use crate::output::PersistId;

/// Opaque, unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Preparing,
    Downloading,
    Merging,
    /// Only reported by conversion events; a task's stored status never takes it.
    Converting,
    Completed,
    Error,
    Paused,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Error | TaskStatus::Cancelled
        )
    }

    /// Whether the state machine accepts a move from `self` to `next`.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Completed | Error | Cancelled, _) => false,
            (Paused, Cancelled) => true,
            (Paused, _) => false,
            (_, Paused | Cancelled) => true,
            (Preparing, Downloading | Error) => true,
            (Downloading, Merging | Error) => true,
            (Merging, Completed | Error) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Preparing => "preparing",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Merging => "merging",
            TaskStatus::Converting => "converting",
            TaskStatus::Completed => "completed",
            TaskStatus::Error => "error",
            TaskStatus::Paused => "paused",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options accepted with a new download.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOptions {
    /// Re-encapsulate the merged `.ts` into an `.mp4` after completion.
    #[serde(default)]
    pub convert_to_container: bool,
}

/// Cooperative stop flags polled by segment workers.
#[derive(Debug, Default)]
pub struct TaskControl {
    paused: AtomicBool,
    cancelled: AtomicBool,
}

impl TaskControl {
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// True once no further fetches may be scheduled.
    pub fn should_stop(&self) -> bool {
        self.is_paused() || self.is_cancelled()
    }
}

/// Where a completed task's output ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskOutput {
    pub filename: String,
    pub persist_id: PersistId,
}

#[derive(Debug)]
struct TaskState {
    status: TaskStatus,
    message: Option<String>,
    total_segments: usize,
    total_duration: f64,
    output: Option<TaskOutput>,
}

/// Registry entry: the immutable request plus the state shared with the running task.
#[derive(Debug)]
pub struct TaskEntry {
    pub id: TaskId,
    pub title: String,
    pub source_url: Url,
    pub options: StartOptions,
    pub control: TaskControl,
    downloaded: AtomicUsize,
    state: Mutex<TaskState>,
}

impl TaskEntry {
    pub fn new(id: TaskId, title: String, source_url: Url, options: StartOptions) -> Self {
        Self {
            id,
            title,
            source_url,
            options,
            control: TaskControl::default(),
            downloaded: AtomicUsize::new(0),
            state: Mutex::new(TaskState {
                status: TaskStatus::Preparing,
                message: None,
                total_segments: 0,
                total_duration: 0.0,
                output: None,
            }),
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.state.lock().status
    }

    /// Apply a transition if the state machine allows it.
    ///
    /// On rejection the current status is returned and nothing changes.
    pub fn transition(&self, next: TaskStatus, message: Option<String>) -> Result<(), TaskStatus> {
        let mut state = self.state.lock();
        if !state.status.can_transition_to(next) {
            return Err(state.status);
        }
        state.status = next;
        state.message = message;
        Ok(())
    }

    pub fn set_plan(&self, total_segments: usize, total_duration: f64) {
        let mut state = self.state.lock();
        state.total_segments = total_segments;
        state.total_duration = total_duration;
    }

    pub fn set_output(&self, output: TaskOutput) {
        self.state.lock().output = Some(output);
    }

    /// Record one more filled slot; returns the new count.
    pub fn record_downloaded(&self) -> usize {
        self.downloaded.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn downloaded(&self) -> usize {
        self.downloaded.load(Ordering::SeqCst)
    }

    pub fn summary(&self) -> DownloadTaskSummary {
        let state = self.state.lock();
        let downloaded_count = self.downloaded();
        DownloadTaskSummary {
            id: self.id,
            title: self.title.clone(),
            source_url: self.source_url.to_string(),
            status: state.status,
            message: state.message.clone(),
            downloaded_count,
            total_segments: state.total_segments,
            progress: progress_percent(downloaded_count, state.total_segments),
            total_duration: state.total_duration,
            output: state.output.clone(),
        }
    }
}

/// Serializable snapshot of a task, as returned by `get_task`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadTaskSummary {
    pub id: TaskId,
    pub title: String,
    pub source_url: String,
    pub status: TaskStatus,
    pub message: Option<String>,
    pub downloaded_count: usize,
    pub total_segments: usize,
    pub progress: u8,
    pub total_duration: f64,
    pub output: Option<TaskOutput>,
}

/// `floor(downloaded * 100 / total)`, or 0 before the segment count is known.
pub fn progress_percent(downloaded: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (downloaded.min(total) * 100 / total) as u8
}

/// Working set of a running task: the segment list and one slot per segment.
#[derive(Debug)]
pub struct DownloadTask {
    pub segments: Vec<SegmentDescriptor>,
    pub slots: Vec<Option<Bytes>>,
}

impl DownloadTask {
    pub fn new(segments: Vec<SegmentDescriptor>) -> Self {
        let slots = vec![None; segments.len()];
        Self { segments, slots }
    }

    pub fn is_filled(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }
}
