// HTTP fetch capability: the single seam through which playlists, keys and segments are retrieved.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::error::FetchError;
use crate::hls::config::RetryPolicy;
use crate::hls::playlist::ByteRange;
use crate::{DownloaderConfig, HlsConfig};

/// What a request is for; selects its timeout and retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Playlist,
    Key,
    Segment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: Url,
    pub kind: ResourceKind,
    pub range: Option<ByteRange>,
}

impl FetchRequest {
    pub fn playlist(url: Url) -> Self {
        Self {
            url,
            kind: ResourceKind::Playlist,
            range: None,
        }
    }

    pub fn key(url: Url) -> Self {
        Self {
            url,
            kind: ResourceKind::Key,
            range: None,
        }
    }

    pub fn segment(url: Url, range: Option<ByteRange>) -> Self {
        Self {
            url,
            kind: ResourceKind::Segment,
            range,
        }
    }
}

#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// Fetch the full body of `request`, or the requested byte range.
    async fn fetch(&self, request: &FetchRequest) -> Result<Bytes, FetchError>;
}

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &DownloaderConfig) -> Result<Client, reqwest::Error> {
    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(5)
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .danger_accept_invalid_certs(config.danger_accept_invalid_certs)
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    if !config.pool_idle_timeout.is_zero() {
        client_builder = client_builder.pool_idle_timeout(config.pool_idle_timeout);
    }

    client_builder.build()
}

/// reqwest-backed [`HttpFetch`] with per-kind timeouts and exponential backoff.
///
/// Transport errors and 5xx responses are retried; 4xx responses fail immediately.
pub struct HttpClient {
    http_client: Client,
    config: Arc<HlsConfig>,
}

impl HttpClient {
    pub fn new(http_client: Client, config: Arc<HlsConfig>) -> Self {
        Self {
            http_client,
            config,
        }
    }

    /// Build the underlying client from `config.base`.
    pub fn from_config(config: Arc<HlsConfig>) -> Result<Self, reqwest::Error> {
        let http_client = create_client(&config.base)?;
        Ok(Self::new(http_client, config))
    }

    fn build_request(&self, request: &FetchRequest, policy: &RetryPolicy) -> RequestBuilder {
        let mut request_builder = self
            .http_client
            .get(request.url.clone())
            .timeout(policy.timeout);
        if let Some(range) = request.range {
            request_builder = request_builder.header(reqwest::header::RANGE, range.header_value());
        }
        request_builder
    }

    async fn fetch_once(
        &self,
        request: &FetchRequest,
        policy: &RetryPolicy,
    ) -> Result<Bytes, FetchError> {
        let response = self
            .build_request(request, policy)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&request.url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: request.url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(&request.url, &e))?;
        ranged_body(request, status, body)
    }
}

/// A server may ignore `Range` and answer `200 OK` with the whole resource;
/// the requested range is then cut out locally.
fn ranged_body(
    request: &FetchRequest,
    status: StatusCode,
    body: Bytes,
) -> Result<Bytes, FetchError> {
    let Some(range) = request.range else {
        return Ok(body);
    };
    if status == StatusCode::PARTIAL_CONTENT {
        return Ok(body);
    }

    debug!(
        url = %request.url,
        %status,
        len = body.len(),
        "Server ignored the Range header, slicing the full body"
    );
    range
        .slice_of(&body)
        .ok_or_else(|| FetchError::RangeUnsatisfiable {
            url: request.url.to_string(),
            range: range.header_value(),
            len: body.len(),
        })
}

/// Run `attempt` until it succeeds, fails with a non-retryable error, or has
/// been retried `policy.max_retries` times. Backoff doubles after each failure.
async fn fetch_with_retries<F, Fut>(
    request: &FetchRequest,
    policy: &RetryPolicy,
    mut attempt: F,
) -> Result<Bytes, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Bytes, FetchError>>,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        match attempt().await {
            Ok(bytes) => {
                debug!(
                    url = %request.url,
                    kind = ?request.kind,
                    len = bytes.len(),
                    attempts,
                    "Fetched resource"
                );
                return Ok(bytes);
            }
            Err(e) if !e.is_retryable() || attempts > policy.max_retries => return Err(e),
            Err(e) => {
                let delay = policy.delay_for(attempts);
                warn!(
                    url = %request.url,
                    attempt = attempts,
                    max_retries = policy.max_retries,
                    error = %e,
                    "Request failed, retrying in {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[async_trait]
impl HttpFetch for HttpClient {
    async fn fetch(&self, request: &FetchRequest) -> Result<Bytes, FetchError> {
        let policy = self.config.retry_policy(request.kind);
        fetch_with_retries(request, &policy, || self.fetch_once(request, &policy)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    fn segment_url() -> Url {
        Url::parse("https://cdn.example/v/seg0.ts").unwrap()
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(5),
            max_retries,
            retry_delay_base: Duration::from_millis(100),
        }
    }

    fn status(status: u16) -> FetchError {
        FetchError::Status {
            url: segment_url().to_string(),
            status,
        }
    }

    #[test]
    fn test_fetch_request_constructors() {
        let url = Url::parse("https://cdn.example/v/seg0.ts").unwrap();
        let range = ByteRange {
            length: 10,
            offset: 5,
        };
        let request = FetchRequest::segment(url.clone(), Some(range));
        assert_eq!(request.kind, ResourceKind::Segment);
        assert_eq!(request.range, Some(range));
        assert_eq!(FetchRequest::key(url.clone()).kind, ResourceKind::Key);
        assert_eq!(FetchRequest::playlist(url).range, None);
    }

    #[test]
    fn test_create_client_with_defaults() {
        let config = DownloaderConfig::default();
        assert!(create_client(&config).is_ok());
    }

    #[test]
    fn test_fetch_error_retryability() {
        let server = FetchError::Status {
            url: "u".into(),
            status: 503,
        };
        let missing = FetchError::Status {
            url: "u".into(),
            status: 404,
        };
        assert!(server.is_retryable());
        assert!(!missing.is_retryable());
        assert!(FetchError::Timeout { url: "u".into() }.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_succeeds_on_retry() {
        let request = FetchRequest::segment(segment_url(), None);
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let body = fetch_with_retries(&request, &policy(3), || {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if call < 3 {
                    Err(status(503))
                } else {
                    Ok(Bytes::from_static(b"media"))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(body, Bytes::from_static(b"media"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 100ms then 200ms of backoff
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_not_retried() {
        let request = FetchRequest::segment(segment_url(), None);
        let calls = AtomicU32::new(0);

        let err = fetch_with_retries(&request, &policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(status(404)) }
        })
        .await
        .unwrap_err();

        assert_eq!(err, status(404));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_after_max_plus_one_attempts() {
        let request = FetchRequest::key(segment_url());
        let calls = AtomicU32::new(0);

        let err = fetch_with_retries(&request, &policy(2), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(FetchError::Timeout {
                    url: "u".into(),
                })
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, FetchError::Timeout { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_makes_single_attempt() {
        let request = FetchRequest::playlist(segment_url());
        let calls = AtomicU32::new(0);

        let result = fetch_with_retries(&request, &policy(0), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(status(500)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_range_header_is_sent() {
        let client = HttpClient::from_config(Arc::new(HlsConfig::default())).unwrap();
        let range = ByteRange {
            length: 500,
            offset: 100,
        };
        let request = FetchRequest::segment(segment_url(), Some(range));

        let built = client
            .build_request(&request, &policy(0))
            .build()
            .unwrap();
        assert_eq!(built.headers()[reqwest::header::RANGE], "bytes=100-599");
        assert_eq!(built.timeout(), Some(&Duration::from_secs(5)));

        let plain = client
            .build_request(&FetchRequest::segment(segment_url(), None), &policy(0))
            .build()
            .unwrap();
        assert!(!plain.headers().contains_key(reqwest::header::RANGE));
    }

    #[test]
    fn test_full_body_is_sliced_when_range_ignored() {
        let range = ByteRange {
            length: 4,
            offset: 2,
        };
        let request = FetchRequest::segment(segment_url(), Some(range));
        let body = Bytes::from_static(b"0123456789");

        let sliced = ranged_body(&request, StatusCode::OK, body.clone()).unwrap();
        assert_eq!(sliced, Bytes::from_static(b"2345"));

        let partial = Bytes::from_static(b"2345");
        assert_eq!(
            ranged_body(&request, StatusCode::PARTIAL_CONTENT, partial.clone()).unwrap(),
            partial
        );

        let unranged = FetchRequest::segment(segment_url(), None);
        assert_eq!(ranged_body(&unranged, StatusCode::OK, body.clone()).unwrap(), body);
    }

    #[test]
    fn test_range_past_end_of_full_body() {
        let range = ByteRange {
            length: 4,
            offset: 20,
        };
        let request = FetchRequest::segment(segment_url(), Some(range));

        let err = ranged_body(&request, StatusCode::OK, Bytes::from_static(b"short")).unwrap_err();
        assert!(matches!(err, FetchError::RangeUnsatisfiable { len: 5, .. }));
        assert!(!err.is_retryable());
    }
}
