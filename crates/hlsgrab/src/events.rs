// Task events published to subscribers of a DownloadController.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::task::{TaskId, TaskStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    /// A segment slot was filled.
    Progress {
        task_id: TaskId,
        /// `floor(downloaded * 100 / total)`
        progress: u8,
        downloaded: usize,
        total: usize,
        status: TaskStatus,
    },
    /// The task's stored status changed.
    Status {
        task_id: TaskId,
        status: TaskStatus,
        message: Option<String>,
    },
    /// Best-effort container conversion after completion. Never alters the task status.
    Conversion {
        task_id: TaskId,
        status: TaskStatus,
        message: Option<String>,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskEvent::Progress { task_id, .. }
            | TaskEvent::Status { task_id, .. }
            | TaskEvent::Conversion { task_id, .. } => *task_id,
        }
    }
}

/// Fan-out of task events. Sending without subscribers is not an error.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<TaskEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: TaskEvent) {
        if self.sender.send(event).is_err() {
            trace!("No event subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let task_id = TaskId::new();
        let event = TaskEvent::Progress {
            task_id,
            progress: 33,
            downloaded: 1,
            total: 3,
            status: TaskStatus::Downloading,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["status"], "downloading");
        assert_eq!(json["task_id"], task_id.to_string());
        assert_eq!(event.task_id(), task_id);
    }

    #[tokio::test]
    async fn test_emit_reaches_subscribers() {
        let emitter = EventEmitter::new(8);
        emitter.emit(TaskEvent::Status {
            task_id: TaskId::new(),
            status: TaskStatus::Preparing,
            message: None,
        });

        let mut rx = emitter.subscribe();
        let event = TaskEvent::Conversion {
            task_id: TaskId::new(),
            status: TaskStatus::Converting,
            message: Some("Converting to mp4".into()),
        };
        emitter.emit(event.clone());
        assert_eq!(rx.recv().await.unwrap(), event);
    }
}
