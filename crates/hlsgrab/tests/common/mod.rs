#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hlsgrab_engine::{
    DownloadController, FetchError, FetchRequest, HttpFetch, OutputSink, PersistError, PersistId,
    TaskEvent, TaskId, TaskStatus,
};
use parking_lot::Mutex;
use tokio::sync::broadcast;

pub const BASE: &str = "https://cdn.example/vod/";

pub fn url(path: &str) -> String {
    format!("{BASE}{path}")
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

#[derive(Clone)]
enum Reply {
    Body(Bytes),
    Status(u16),
}

/// Canned HTTP server: per-URL bodies or statuses, optional delays and a request log.
#[derive(Default)]
pub struct FakeServer {
    routes: Mutex<HashMap<String, (Reply, Duration)>>,
    log: Mutex<Vec<String>>,
}

impl FakeServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn body(&self, url: &str, body: impl AsRef<[u8]>) {
        self.routes.lock().insert(
            url.to_string(),
            (Reply::Body(Bytes::copy_from_slice(body.as_ref())), Duration::ZERO),
        );
    }

    pub fn status(&self, url: &str, status: u16) {
        self.routes
            .lock()
            .insert(url.to_string(), (Reply::Status(status), Duration::ZERO));
    }

    pub fn delay(&self, url: &str, delay: Duration) {
        if let Some(route) = self.routes.lock().get_mut(url) {
            route.1 = delay;
        }
    }

    pub fn calls(&self, url: &str) -> usize {
        self.log.lock().iter().filter(|u| u.as_str() == url).count()
    }
}

#[async_trait]
impl HttpFetch for FakeServer {
    async fn fetch(&self, request: &FetchRequest) -> Result<Bytes, FetchError> {
        let url = request.url.to_string();
        self.log.lock().push(url.clone());
        let route = self.routes.lock().get(&url).cloned();
        let Some((reply, delay)) = route else {
            return Err(FetchError::Status { url, status: 404 });
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match reply {
            Reply::Body(body) => Ok(body),
            Reply::Status(status) => Err(FetchError::Status { url, status }),
        }
    }
}

/// Keeps every persisted artifact in memory.
#[derive(Default)]
pub struct MemorySink {
    pub saved: Mutex<Vec<(String, String, Bytes)>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn files(&self) -> Vec<(String, String, Bytes)> {
        self.saved.lock().clone()
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn persist(
        &self,
        data: Bytes,
        filename: &str,
        content_type: &str,
    ) -> Result<PersistId, PersistError> {
        self.saved
            .lock()
            .push((filename.to_string(), content_type.to_string(), data));
        Ok(PersistId(format!("memory://{filename}")))
    }
}

pub fn controller(server: Arc<FakeServer>, sink: Arc<MemorySink>) -> DownloadController {
    DownloadController::builder(sink).http(server).build().unwrap()
}

/// Collect this task's events until a terminal status event arrives.
pub async fn events_until_terminal(
    rx: &mut broadcast::Receiver<TaskEvent>,
    task_id: TaskId,
) -> Vec<TaskEvent> {
    collect_events(rx, task_id, |event| {
        matches!(event, TaskEvent::Status { status, .. } if status.is_terminal())
    })
    .await
}

/// Collect this task's events until `stop` matches one (inclusive).
pub async fn collect_events(
    rx: &mut broadcast::Receiver<TaskEvent>,
    task_id: TaskId,
    stop: impl Fn(&TaskEvent) -> bool,
) -> Vec<TaskEvent> {
    let mut events = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if event.task_id() != task_id {
                continue;
            }
            let done = stop(&event);
            events.push(event);
            if done {
                break;
            }
        }
    })
    .await
    .expect("timed out waiting for task events");
    events
}

pub fn statuses(events: &[TaskEvent]) -> Vec<TaskStatus> {
    events
        .iter()
        .filter_map(|event| match event {
            TaskEvent::Status { status, .. } => Some(*status),
            _ => None,
        })
        .collect()
}
