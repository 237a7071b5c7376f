// HLS Segment Fetcher: Fetches one segment, resolving its key and decrypting it when needed.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::client::{FetchRequest, HttpFetch};
use crate::error::FetchError;
use crate::hls::decryption;
use crate::hls::key_cache::KeyCache;
use crate::hls::playlist::SegmentDescriptor;

pub struct SegmentFetcher {
    http: Arc<dyn HttpFetch>,
    key_cache: Arc<KeyCache>,
}

impl SegmentFetcher {
    pub fn new(http: Arc<dyn HttpFetch>, key_cache: Arc<KeyCache>) -> Self {
        Self { http, key_cache }
    }

    /// Returns the segment's media bytes, decrypted when the playlist keys it.
    ///
    /// The key is resolved before the segment body, so a missing key fails the
    /// segment without spending a download on it.
    pub async fn fetch_segment(&self, segment: &SegmentDescriptor) -> Result<Bytes, FetchError> {
        let key = match &segment.key {
            Some(key) => Some(self.key_cache.get_key(&key.uri).await?),
            None => None,
        };

        let request = FetchRequest::segment(segment.url.clone(), segment.byte_range);
        let raw = self.http.fetch(&request).await?;
        trace!(index = segment.index, len = raw.len(), "Segment body received");

        let Some(key) = key else {
            return Ok(raw);
        };

        let explicit_iv = segment.key.as_ref().and_then(|k| k.iv);
        let data = match explicit_iv {
            Some(iv) => decryption::decrypt_segment_with_iv(raw, &key, &iv),
            None => decryption::decrypt_segment(raw, &key, segment.index as u32),
        };
        debug!(
            index = segment.index,
            len = data.len(),
            explicit_iv = explicit_iv.is_some(),
            "Segment decrypted"
        );
        Ok(data)
    }
}
