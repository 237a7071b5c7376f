// HLS Key Cache: fetches AES-128 keys once per task and shares them across workers.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use url::Url;

use crate::client::{FetchRequest, HttpFetch};
use crate::error::FetchError;

const AES_128_KEY_LEN: usize = 16;

/// Per-task key memo. Concurrent requests for one URI share a single fetch.
pub struct KeyCache {
    http: Arc<dyn HttpFetch>,
    keys: Mutex<HashMap<Url, Arc<OnceCell<Bytes>>>>,
}

impl KeyCache {
    pub fn new(http: Arc<dyn HttpFetch>) -> Self {
        Self {
            http,
            keys: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the key bytes for `uri`, fetching them on first use.
    ///
    /// A failed fetch is not cached; the next caller retries.
    pub async fn get_key(&self, uri: &Url) -> Result<Bytes, FetchError> {
        let cell = {
            let mut keys = self.keys.lock();
            Arc::clone(keys.entry(uri.clone()).or_default())
        };

        let key = cell
            .get_or_try_init(|| async {
                debug!(uri = %uri, "Fetching decryption key");
                let key = self.http.fetch(&FetchRequest::key(uri.clone())).await?;
                if key.len() != AES_128_KEY_LEN {
                    warn!(
                        uri = %uri,
                        len = key.len(),
                        "Decryption key is not 16 bytes; affected segments will pass through undecrypted"
                    );
                }
                Ok::<_, FetchError>(key)
            })
            .await?;

        Ok(key.clone())
    }

    /// Number of keys fetched successfully so far.
    pub fn len(&self) -> usize {
        self.keys
            .lock()
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockHttp;
    use std::time::Duration;

    const KEY_URL: &str = "https://cdn.example/v/key.bin";

    #[tokio::test]
    async fn test_repeated_calls_fetch_once() {
        let http = Arc::new(MockHttp::new().with_body(KEY_URL, [7u8; 16]));
        let cache = KeyCache::new(http.clone());
        let uri = Url::parse(KEY_URL).unwrap();

        for _ in 0..5 {
            assert_eq!(cache.get_key(&uri).await.unwrap(), Bytes::from_static(&[7u8; 16]));
        }
        assert_eq!(http.calls(KEY_URL), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let http = Arc::new(
            MockHttp::new()
                .with_body(KEY_URL, [1u8; 16])
                .with_delay(KEY_URL, Duration::from_millis(50)),
        );
        let cache = KeyCache::new(http.clone());
        let uri = Url::parse(KEY_URL).unwrap();

        let results =
            futures::future::join_all((0..8).map(|_| cache.get_key(&uri))).await;

        assert!(results.iter().all(|r| r.as_ref().unwrap().len() == 16));
        assert_eq!(http.calls(KEY_URL), 1);
    }

    #[tokio::test]
    async fn test_distinct_uris_fetched_separately() {
        let other = "https://cdn.example/v/key2.bin";
        let http = Arc::new(
            MockHttp::new()
                .with_body(KEY_URL, [1u8; 16])
                .with_body(other, [2u8; 16]),
        );
        let cache = KeyCache::new(http.clone());

        let first = cache.get_key(&Url::parse(KEY_URL).unwrap()).await.unwrap();
        let second = cache.get_key(&Url::parse(other).unwrap()).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(http.calls(KEY_URL), 1);
        assert_eq!(http.calls(other), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let http = Arc::new(MockHttp::new().with_status(KEY_URL, 403));
        let cache = KeyCache::new(http.clone());
        let uri = Url::parse(KEY_URL).unwrap();

        assert!(cache.get_key(&uri).await.is_err());
        assert!(cache.get_key(&uri).await.is_err());
        assert_eq!(http.calls(KEY_URL), 2);
        assert!(cache.is_empty());
    }
}
