//! # Download Task Controller
//!
//! Owns the task registry and drives each task through its lifecycle:
//! playlist load, bounded-concurrency segment fetch, merge, output handoff and
//! the optional container conversion.
//!
//! ```no_run
//! use std::sync::Arc;
//! use hlsgrab_engine::{DownloadController, FileSink, StartOptions, TaskEvent};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let controller = DownloadController::builder(Arc::new(FileSink::new("downloads"))).build()?;
//! let mut events = controller.subscribe();
//! let task_id = controller.start_download(
//!     "https://cdn.example/v/index.m3u8",
//!     "My video",
//!     StartOptions::default(),
//! )?;
//! while let Ok(event) = events.recv().await {
//!     if let TaskEvent::Status { status, .. } = event {
//!         if status.is_terminal() {
//!             break;
//!         }
//!     }
//! }
//! println!("{:?}", controller.get_task(task_id));
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::HlsConfig;
use crate::client::{HttpClient, HttpFetch};
use crate::convert::ContainerConverter;
use crate::error::{ControllerError, TaskError};
use crate::events::{EventEmitter, TaskEvent};
use crate::hls::{
    KeyCache, PlaylistLoader, ScheduleOutcome, SegmentFetcher, SegmentScheduler, TS_CONTENT_TYPE,
    merge_segments,
};
use crate::output::{OutputSink, sanitize_filename};
use crate::task::{
    DownloadTask, DownloadTaskSummary, StartOptions, TaskEntry, TaskId, TaskOutput, TaskStatus,
    progress_percent,
};

/// Typed control surface, one variant per operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlRequest {
    StartDownload {
        url: String,
        title: String,
        #[serde(default)]
        options: StartOptions,
    },
    Pause {
        task_id: TaskId,
    },
    Cancel {
        task_id: TaskId,
    },
    GetTask {
        task_id: TaskId,
    },
    ListTasks,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlResponse {
    Started { task_id: TaskId },
    Accepted { task_id: TaskId },
    Task { task: Option<DownloadTaskSummary> },
    Tasks { tasks: Vec<DownloadTaskSummary> },
    Error { message: String },
}

struct ControllerInner {
    config: Arc<HlsConfig>,
    http: Arc<dyn HttpFetch>,
    sink: Arc<dyn OutputSink>,
    converter: Option<Arc<dyn ContainerConverter>>,
    events: EventEmitter,
    tasks: RwLock<HashMap<TaskId, Arc<TaskEntry>>>,
}

/// Handle to the task registry. Cloning shares the same registry.
#[derive(Clone)]
pub struct DownloadController {
    inner: Arc<ControllerInner>,
}

pub struct DownloadControllerBuilder {
    sink: Arc<dyn OutputSink>,
    config: HlsConfig,
    http: Option<Arc<dyn HttpFetch>>,
    converter: Option<Arc<dyn ContainerConverter>>,
}

impl DownloadControllerBuilder {
    pub fn config(mut self, config: HlsConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the reqwest-backed client, e.g. with a test double.
    pub fn http(mut self, http: Arc<dyn HttpFetch>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn converter(mut self, converter: Arc<dyn ContainerConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn build(self) -> Result<DownloadController, ControllerError> {
        let config = Arc::new(self.config);
        let http = match self.http {
            Some(http) => http,
            None => Arc::new(HttpClient::from_config(Arc::clone(&config))?),
        };
        let events = EventEmitter::new(config.event_config.channel_capacity);

        Ok(DownloadController {
            inner: Arc::new(ControllerInner {
                config,
                http,
                sink: self.sink,
                converter: self.converter,
                events,
                tasks: RwLock::new(HashMap::new()),
            }),
        })
    }
}

impl DownloadController {
    pub fn builder(sink: Arc<dyn OutputSink>) -> DownloadControllerBuilder {
        DownloadControllerBuilder {
            sink,
            config: HlsConfig::default(),
            http: None,
            converter: None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.events.subscribe()
    }

    /// Register a task and start it on the current tokio runtime.
    ///
    /// The URL is validated before anything is registered.
    pub fn start_download(
        &self,
        playlist_url: &str,
        title: &str,
        options: StartOptions,
    ) -> Result<TaskId, ControllerError> {
        let source_url = parse_playlist_url(playlist_url)?;
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| ControllerError::NoRuntime)?;

        let task_id = TaskId::new();
        let entry = Arc::new(TaskEntry::new(
            task_id,
            title.to_string(),
            source_url,
            options,
        ));
        self.inner
            .tasks
            .write()
            .insert(task_id, Arc::clone(&entry));

        info!(task_id = %task_id, url = %entry.source_url, title, "Task registered");
        self.inner.events.emit(TaskEvent::Status {
            task_id,
            status: TaskStatus::Preparing,
            message: Some("Loading playlist".to_string()),
        });

        let run = runtime.spawn(Arc::clone(&self.inner).run_task(Arc::clone(&entry)));
        runtime.spawn(Arc::clone(&self.inner).supervise(entry, run));
        Ok(task_id)
    }

    /// Stop scheduling new segment fetches; the task stays registered, frozen.
    pub fn pause(&self, task_id: TaskId) -> Result<(), ControllerError> {
        let entry = self.inner.entry(task_id)?;
        entry.control.pause();
        self.inner
            .apply(&entry, TaskStatus::Paused, Some("Paused".to_string()))
            .map_err(|status| ControllerError::InvalidState { task_id, status })
    }

    /// Stop the task, discard in-flight results and drop it from the registry.
    pub fn cancel(&self, task_id: TaskId) -> Result<(), ControllerError> {
        let entry = self.inner.entry(task_id)?;
        entry.control.cancel();
        self.inner
            .apply(&entry, TaskStatus::Cancelled, Some("Cancelled".to_string()))
            .map_err(|status| ControllerError::InvalidState { task_id, status })?;
        self.inner.tasks.write().remove(&task_id);
        Ok(())
    }

    pub fn get_task(&self, task_id: TaskId) -> Option<DownloadTaskSummary> {
        self.inner
            .tasks
            .read()
            .get(&task_id)
            .map(|entry| entry.summary())
    }

    /// Summaries of every registered task, in no particular order.
    pub fn list_tasks(&self) -> Vec<DownloadTaskSummary> {
        self.inner
            .tasks
            .read()
            .values()
            .map(|entry| entry.summary())
            .collect()
    }

    pub fn handle(&self, request: ControlRequest) -> ControlResponse {
        let result = match request {
            ControlRequest::StartDownload {
                url,
                title,
                options,
            } => self
                .start_download(&url, &title, options)
                .map(|task_id| ControlResponse::Started { task_id }),
            ControlRequest::Pause { task_id } => self
                .pause(task_id)
                .map(|()| ControlResponse::Accepted { task_id }),
            ControlRequest::Cancel { task_id } => self
                .cancel(task_id)
                .map(|()| ControlResponse::Accepted { task_id }),
            ControlRequest::GetTask { task_id } => Ok(ControlResponse::Task {
                task: self.get_task(task_id),
            }),
            ControlRequest::ListTasks => Ok(ControlResponse::Tasks {
                tasks: self.list_tasks(),
            }),
        };

        result.unwrap_or_else(|e| ControlResponse::Error {
            message: e.to_string(),
        })
    }
}

fn parse_playlist_url(raw: &str) -> Result<Url, ControllerError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ControllerError::InvalidUrl(format!("{raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ControllerError::InvalidUrl(format!(
            "{raw}: unsupported scheme {scheme}"
        ))),
    }
}

impl ControllerInner {
    fn entry(&self, task_id: TaskId) -> Result<Arc<TaskEntry>, ControllerError> {
        self.tasks
            .read()
            .get(&task_id)
            .cloned()
            .ok_or(ControllerError::TaskNotFound(task_id))
    }

    /// Apply a transition and announce it. Returns the current status when rejected.
    fn apply(
        &self,
        entry: &TaskEntry,
        next: TaskStatus,
        message: Option<String>,
    ) -> Result<(), TaskStatus> {
        entry.transition(next, message.clone())?;
        info!(task_id = %entry.id, status = %next, message = ?message, "Task status changed");
        self.events.emit(TaskEvent::Status {
            task_id: entry.id,
            status: next,
            message,
        });
        Ok(())
    }

    /// Like [`apply`](Self::apply) for the task's own progress; a rejection means
    /// a pause or cancel won the race and the run should stop quietly.
    fn advance(&self, entry: &TaskEntry, next: TaskStatus, message: String) -> bool {
        match self.apply(entry, next, Some(message)) {
            Ok(()) => true,
            Err(current) => {
                debug!(task_id = %entry.id, %current, %next, "Transition skipped");
                false
            }
        }
    }

    /// Records a panicked run as `Error` so the task never stays mid-flight.
    async fn supervise(self: Arc<Self>, entry: Arc<TaskEntry>, run: JoinHandle<()>) {
        let Err(e) = run.await else {
            return;
        };
        if !e.is_panic() {
            debug!(task_id = %entry.id, "Task run aborted by runtime shutdown");
            return;
        }
        error!(task_id = %entry.id, status = %entry.status(), "Task run panicked");
        let message = "Task aborted by an internal error".to_string();
        if let Err(current) = self.apply(&entry, TaskStatus::Error, Some(message)) {
            debug!(task_id = %entry.id, %current, "Panic not recorded");
        }
    }

    async fn run_task(self: Arc<Self>, entry: Arc<TaskEntry>) {
        match self.drive(&entry).await {
            Ok(Some(merged)) => {
                if entry.options.convert_to_container {
                    self.convert(&entry, merged).await;
                }
            }
            Ok(None) => {
                debug!(task_id = %entry.id, status = %entry.status(), "Task run stopped early");
            }
            Err(e) => {
                if entry.control.should_stop() {
                    debug!(task_id = %entry.id, error = %e, "Ignoring failure of stopped task");
                    return;
                }
                error!(task_id = %entry.id, error = %e, "Task failed");
                if let Err(current) = self.apply(&entry, TaskStatus::Error, Some(e.to_string())) {
                    debug!(task_id = %entry.id, %current, "Error not recorded");
                }
            }
        }
    }

    /// Runs a task to completion. `Ok(None)` means it was paused or cancelled.
    #[instrument(skip_all, fields(task_id = %entry.id))]
    async fn drive(&self, entry: &TaskEntry) -> Result<Option<Bytes>, TaskError> {
        let playlist = PlaylistLoader::new(Arc::clone(&self.http))
            .load(&entry.source_url)
            .await?;
        if entry.control.should_stop() {
            return Ok(None);
        }
        if playlist.is_empty() {
            return Err(TaskError::EmptyPlaylist);
        }

        let total = playlist.len();
        entry.set_plan(total, playlist.total_duration);
        if !self.advance(
            entry,
            TaskStatus::Downloading,
            format!("Downloading {total} segments"),
        ) {
            return Ok(None);
        }

        let key_cache = Arc::new(KeyCache::new(Arc::clone(&self.http)));
        let fetcher = SegmentFetcher::new(Arc::clone(&self.http), key_cache);
        let scheduler = SegmentScheduler::new(
            &fetcher,
            &entry.control,
            self.config.scheduler_config.max_concurrent,
        );

        let on_filled = |index: usize| {
            let downloaded = entry.record_downloaded();
            debug!(index, downloaded, total, "Segment stored");
            self.events.emit(TaskEvent::Progress {
                task_id: entry.id,
                progress: progress_percent(downloaded, total),
                downloaded,
                total,
                status: TaskStatus::Downloading,
            });
        };

        let mut task = DownloadTask::new(playlist.segments);
        let outcome = scheduler
            .run(&task.segments, &mut task.slots, &on_filled)
            .await?;
        if outcome == ScheduleOutcome::Interrupted || !task.is_filled() {
            return Ok(None);
        }

        if !self.advance(entry, TaskStatus::Merging, "Merging segments".to_string()) {
            return Ok(None);
        }
        let merged = merge_segments(task.slots)?;

        if entry.control.should_stop() {
            return Ok(None);
        }
        let filename = format!("{}.ts", sanitize_filename(&entry.title));
        let persist_id = self
            .sink
            .persist(merged.clone(), &filename, TS_CONTENT_TYPE)
            .await?;
        entry.set_output(TaskOutput {
            filename,
            persist_id: persist_id.clone(),
        });

        if !self.advance(entry, TaskStatus::Completed, format!("Saved to {persist_id}")) {
            return Ok(None);
        }
        Ok(Some(merged))
    }

    /// Best-effort re-encapsulation. Reports through conversion events only.
    async fn convert(&self, entry: &TaskEntry, merged: Bytes) {
        let emit = |status: TaskStatus, message: String| {
            self.events.emit(TaskEvent::Conversion {
                task_id: entry.id,
                status,
                message: Some(message),
            });
        };

        let Some(converter) = &self.converter else {
            warn!(
                task_id = %entry.id,
                "Conversion requested without a converter, keeping .ts output"
            );
            emit(
                TaskStatus::Completed,
                "Conversion skipped: no container converter configured".to_string(),
            );
            return;
        };

        let target = converter.target_extension();
        emit(TaskStatus::Converting, format!("Converting to {target}"));

        let converted = match converter.convert(merged).await {
            Ok(converted) => converted,
            Err(e) => {
                warn!(task_id = %entry.id, error = %e, "Conversion failed, keeping .ts output");
                emit(TaskStatus::Error, e.to_string());
                return;
            }
        };

        let filename = format!("{}.{target}", sanitize_filename(&entry.title));
        match self
            .sink
            .persist(converted, &filename, converter.content_type())
            .await
        {
            Ok(persist_id) => {
                info!(task_id = %entry.id, %persist_id, "Converted output saved");
                emit(TaskStatus::Completed, format!("Saved to {persist_id}"));
            }
            Err(e) => {
                warn!(task_id = %entry.id, error = %e, "Converted output could not be saved");
                emit(TaskStatus::Error, e.to_string());
            }
        }
    }
}
