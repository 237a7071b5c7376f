// HLS Merger: concatenates filled segment slots into one transport stream buffer.

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::error::MergeError;

/// Content type of the merged output.
pub const TS_CONTENT_TYPE: &str = "video/mp2t";

/// Concatenate `slots` in index order with a single allocation.
pub fn merge_segments(slots: Vec<Option<Bytes>>) -> Result<Bytes, MergeError> {
    let mut total_len = 0usize;
    for (index, slot) in slots.iter().enumerate() {
        match slot {
            Some(data) => total_len += data.len(),
            None => return Err(MergeError::MissingSegment(index)),
        }
    }

    let count = slots.len();
    let mut merged = BytesMut::with_capacity(total_len);
    for data in slots.into_iter().flatten() {
        merged.extend_from_slice(&data);
    }
    debug!(segments = count, bytes = total_len, "Merged segments");

    Ok(merged.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merges_in_slot_order() {
        let slots = vec![
            Some(Bytes::from_static(&[0xAA, 0xAA])),
            Some(Bytes::from_static(&[0xBB, 0xBB])),
            Some(Bytes::from_static(&[0xCC, 0xCC])),
        ];

        let merged = merge_segments(slots).unwrap();
        assert_eq!(&merged[..], &[0xAA, 0xAA, 0xBB, 0xBB, 0xCC, 0xCC]);
    }

    #[test]
    fn test_missing_slot_is_reported() {
        let slots = vec![Some(Bytes::from_static(b"a")), None, Some(Bytes::new())];
        assert_eq!(merge_segments(slots), Err(MergeError::MissingSegment(1)));
    }

    #[test]
    fn test_empty_segments_are_kept_in_place() {
        let slots = vec![Some(Bytes::new()), Some(Bytes::from_static(b"xy"))];
        assert_eq!(&merge_segments(slots).unwrap()[..], b"xy");
    }
}
