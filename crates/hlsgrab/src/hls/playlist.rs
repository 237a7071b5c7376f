// HLS Playlist Parser: turns media playlist text into ordered segment descriptors.
//
// Parsing is line oriented and tolerant: unknown tags and malformed tag values
// are skipped, and everything after `#EXT-X-ENDLIST` is ignored.

use std::borrow::Cow;
use std::sync::{Arc, LazyLock};

use bytes::Bytes;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, trace, warn};
use url::Url;

use crate::client::{FetchRequest, HttpFetch};
use crate::error::ParseError;

static EXTINF_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#EXTINF:\s*([\d.]+)").unwrap());
static BYTERANGE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#EXT-X-BYTERANGE:\s*(\d+)(?:@(\d+))?").unwrap());
static KEY_URI_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"URI="([^"]+)""#).unwrap());
static KEY_METHOD_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"METHOD=([A-Za-z0-9-]+)").unwrap());
static KEY_IV_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"IV=0[xX]([0-9A-Fa-f]+)").unwrap());

/// Sub-range of a resource, as given by `#EXT-X-BYTERANGE:<length>[@<offset>]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ByteRange {
    pub length: u64,
    pub offset: u64,
}

impl ByteRange {
    /// Value of the HTTP `Range` header selecting this range.
    pub fn header_value(&self) -> String {
        if self.length == 0 {
            format!("bytes={}-", self.offset)
        } else {
            format!("bytes={}-{}", self.offset, self.last_byte())
        }
    }

    /// Inclusive index of the last byte; `length` must be non-zero.
    fn last_byte(&self) -> u64 {
        self.offset.saturating_add(self.length - 1)
    }

    /// Cut this range out of a complete resource body.
    ///
    /// Returns `None` when the range starts past the end of `body`. A range
    /// running past the end is clamped.
    pub fn slice_of(&self, body: &Bytes) -> Option<Bytes> {
        let len = body.len() as u64;
        if self.offset >= len {
            return None;
        }
        let end = if self.length == 0 {
            len
        } else {
            self.last_byte().saturating_add(1).min(len)
        };
        Some(body.slice(self.offset as usize..end as usize))
    }
}

/// AES-128 key reference attached to an encrypted segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentKey {
    pub uri: Url,
    /// Explicit `IV=0x...` attribute. When absent the IV derives from the segment index.
    pub iv: Option<[u8; 16]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentDescriptor {
    pub index: usize,
    pub url: Url,
    pub duration: Option<f64>,
    pub byte_range: Option<ByteRange>,
    pub key: Option<SegmentKey>,
}

impl SegmentDescriptor {
    pub fn is_encrypted(&self) -> bool {
        self.key.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedPlaylist {
    pub segments: Vec<SegmentDescriptor>,
    pub total_duration: f64,
}

impl ParsedPlaylist {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_encrypted(&self) -> bool {
        self.segments.iter().any(SegmentDescriptor::is_encrypted)
    }
}

/// Per-entry values collected from tags until the next URL line commits them.
#[derive(Debug, Clone, Default)]
struct PendingSegment {
    duration: Option<f64>,
    byte_range: Option<ByteRange>,
}

impl PendingSegment {
    fn with_duration(self, duration: f64) -> Self {
        Self {
            duration: Some(duration),
            ..self
        }
    }

    fn with_byte_range(self, byte_range: ByteRange) -> Self {
        Self {
            byte_range: Some(byte_range),
            ..self
        }
    }

    fn commit(self, index: usize, url: Url, key: Option<SegmentKey>) -> SegmentDescriptor {
        SegmentDescriptor {
            index,
            url,
            duration: self.duration,
            byte_range: self.byte_range,
            key,
        }
    }
}

fn parse_duration(line: &str) -> Option<f64> {
    let caps = EXTINF_REGEX.captures(line)?;
    caps[1].parse::<f64>().ok()
}

fn parse_byte_range(line: &str) -> Option<ByteRange> {
    let caps = BYTERANGE_REGEX.captures(line)?;
    let length = caps[1].parse::<u64>().ok()?;
    let offset = match caps.get(2) {
        Some(offset) => offset.as_str().parse::<u64>().ok()?,
        None => 0,
    };
    if offset.checked_add(length).is_none() {
        warn!(line, "Ignoring byte range past the end of the addressable range");
        return None;
    }
    Some(ByteRange { length, offset })
}

fn parse_iv(line: &str) -> Option<[u8; 16]> {
    let caps = KEY_IV_REGEX.captures(line)?;
    let mut iv = [0u8; 16];
    match hex::decode_to_slice(&caps[1], &mut iv) {
        Ok(()) => Some(iv),
        Err(e) => {
            debug!(iv = &caps[1], error = %e, "Ignoring malformed IV attribute");
            None
        }
    }
}

/// Returns the key in effect after an `#EXT-X-KEY` line.
fn parse_key(line: &str, base_url: &Url, current: Option<SegmentKey>) -> Option<SegmentKey> {
    let method = KEY_METHOD_REGEX
        .captures(line)
        .map(|caps| caps[1].to_ascii_uppercase());
    if method.as_deref() == Some("NONE") {
        return None;
    }

    let Some(caps) = KEY_URI_REGEX.captures(line) else {
        return current;
    };
    match base_url.join(&caps[1]) {
        Ok(uri) => Some(SegmentKey {
            uri,
            iv: parse_iv(line),
        }),
        Err(e) => {
            warn!(uri = &caps[1], error = %e, "Ignoring key with unresolvable URI");
            current
        }
    }
}

/// Parse media playlist text. Relative URIs are resolved against `base_url`.
///
/// Never fails: malformed tags are ignored and unresolvable segment lines are
/// skipped without leaving a gap in the indices.
///
/// Key scope: an `#EXT-X-KEY` stays in effect for every following segment
/// until another `#EXT-X-KEY` replaces it, and `METHOD=NONE` clears it. This
/// matches RFC 8216. Durations and byte ranges apply to the next segment only.
pub fn parse_playlist(text: &str, base_url: &Url) -> ParsedPlaylist {
    let mut segments: Vec<SegmentDescriptor> = Vec::new();
    let mut pending = PendingSegment::default();
    let mut active_key: Option<SegmentKey> = None;

    for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        if line.starts_with("#EXT-X-ENDLIST") {
            trace!("End of playlist marker reached");
            break;
        } else if line.starts_with("#EXTINF:") {
            if let Some(duration) = parse_duration(line) {
                pending = pending.with_duration(duration);
            }
        } else if line.starts_with("#EXT-X-BYTERANGE:") {
            if let Some(byte_range) = parse_byte_range(line) {
                pending = pending.with_byte_range(byte_range);
            }
        } else if line.starts_with("#EXT-X-KEY:") {
            active_key = parse_key(line, base_url, active_key);
        } else if line.starts_with("#EXT-X-STREAM-INF") {
            warn!("Master playlists are not supported; variant URIs will be treated as segments");
        } else if line.starts_with('#') {
            continue;
        } else {
            let entry = std::mem::take(&mut pending);
            match base_url.join(line) {
                Ok(url) => {
                    let index = segments.len();
                    segments.push(entry.commit(index, url, active_key.clone()));
                }
                Err(e) => warn!(line, error = %e, "Skipping unresolvable segment URI"),
            }
        }
    }

    let total_duration: f64 = segments.iter().filter_map(|s| s.duration).sum();
    debug!(
        segments = segments.len(),
        total_duration, "Parsed media playlist"
    );

    ParsedPlaylist {
        segments,
        total_duration,
    }
}

/// Fetches a playlist document and parses it.
pub struct PlaylistLoader {
    http: Arc<dyn HttpFetch>,
}

impl PlaylistLoader {
    pub fn new(http: Arc<dyn HttpFetch>) -> Self {
        Self { http }
    }

    pub async fn load(&self, playlist_url: &Url) -> Result<ParsedPlaylist, ParseError> {
        let body = self
            .http
            .fetch(&FetchRequest::playlist(playlist_url.clone()))
            .await?;
        let text = decode_text(playlist_url, &body);
        Ok(parse_playlist(&text, playlist_url))
    }
}

/// Invalid UTF-8 sequences become U+FFFD; the tags and URIs that matter are ASCII.
fn decode_text<'a>(url: &Url, body: &'a [u8]) -> Cow<'a, str> {
    let text = String::from_utf8_lossy(body);
    if let Cow::Owned(_) = text {
        warn!(url = %url, "Playlist is not valid UTF-8, decoding lossily");
    }
    text
}
