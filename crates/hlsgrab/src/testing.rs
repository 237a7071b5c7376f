// In-memory HTTP double for unit tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::client::{FetchRequest, HttpFetch};
use crate::error::FetchError;

#[derive(Debug, Clone)]
enum MockResponse {
    Body(Bytes),
    Status(u16),
}

#[derive(Debug, Clone)]
struct MockRoute {
    response: MockResponse,
    delay: Duration,
}

/// Serves canned responses keyed by absolute URL; unknown URLs answer 404.
#[derive(Debug, Default)]
pub struct MockHttp {
    routes: HashMap<String, MockRoute>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl MockHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, url: &str, body: impl AsRef<[u8]>) -> Self {
        self.routes.insert(
            url.to_string(),
            MockRoute {
                response: MockResponse::Body(Bytes::copy_from_slice(body.as_ref())),
                delay: Duration::ZERO,
            },
        );
        self
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.routes.insert(
            url.to_string(),
            MockRoute {
                response: MockResponse::Status(status),
                delay: Duration::ZERO,
            },
        );
        self
    }

    /// Delay the response for an already registered URL.
    pub fn with_delay(mut self, url: &str, delay: Duration) -> Self {
        if let Some(route) = self.routes.get_mut(url) {
            route.delay = delay;
        }
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url.as_str() == url)
            .count()
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl HttpFetch for MockHttp {
    async fn fetch(&self, request: &FetchRequest) -> Result<Bytes, FetchError> {
        self.requests.lock().push(request.clone());
        let Some(route) = self.routes.get(request.url.as_str()).cloned() else {
            return Err(FetchError::Status {
                url: request.url.to_string(),
                status: 404,
            });
        };
        if !route.delay.is_zero() {
            tokio::time::sleep(route.delay).await;
        }
        match route.response {
            MockResponse::Body(body) => Ok(body),
            MockResponse::Status(status) => Err(FetchError::Status {
                url: request.url.to_string(),
                status,
            }),
        }
    }
}
