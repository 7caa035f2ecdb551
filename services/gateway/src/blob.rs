//! Segment blob storage (spec §4.5, §6): length-prefixed binary segments
//! held in an `object_store`-backed bucket, keyed by
//! `stream/<base64url(projectId/streamId)>/segment-<readSeq>.seg`.

use std::sync::Arc;

use base64_key::segment_key;
use bytes::Bytes;
use object_store::{path::Path, ObjectStore};

mod base64_key {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
    use object_store::path::Path;

    pub fn segment_key(project_id: &str, stream_id: &str, read_seq: i64) -> Path {
        let raw = format!("{project_id}/{stream_id}");
        let encoded = URL_SAFE_NO_PAD.encode(raw.as_bytes());
        Path::from(format!("stream/{encoded}/segment-{read_seq}.seg"))
    }
}

/// Per-message length cap; a length prefix above this marks the blob
/// truncated/corrupt rather than attempting an unbounded allocation.
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct BlobStore {
    store: Arc<dyn ObjectStore>,
}

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error(transparent)]
    Store(#[from] object_store::Error),
}

impl BlobStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn key(project_id: &str, stream_id: &str, read_seq: i64) -> Path {
        segment_key(project_id, stream_id, read_seq)
    }

    pub async fn put_segment(&self, key: &Path, bytes: Bytes) -> Result<(), BlobError> {
        self.store.put(key, bytes.into()).await?;
        Ok(())
    }

    pub async fn get_segment(&self, key: &Path) -> Result<Bytes, BlobError> {
        let result = self.store.get(key).await?;
        Ok(result.bytes().await?)
    }

    pub async fn delete_segment(&self, key: &Path) -> Result<(), BlobError> {
        match self.store.delete(key).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Encodes messages as the repeating `uint32be length || bytes` format with
/// no header or footer (spec §4.5, §6).
pub fn encode_segment(messages: &[Vec<u8>]) -> Bytes {
    let total: usize = messages.iter().map(|m| 4 + m.len()).sum();
    let mut buf = Vec::with_capacity(total);
    for msg in messages {
        buf.extend_from_slice(&(msg.len() as u32).to_be_bytes());
        buf.extend_from_slice(msg);
    }
    Bytes::from(buf)
}

/// Result of parsing a segment blob: the messages recovered, and whether the
/// blob ended mid-record (a truncated length prefix or a length exceeding
/// either the remaining bytes or [`MAX_MESSAGE_BYTES`]).
pub struct DecodedSegment {
    pub messages: Vec<Vec<u8>>,
    pub truncated: bool,
}

pub fn decode_segment(bytes: &[u8]) -> DecodedSegment {
    let mut messages = Vec::new();
    let mut cursor = 0usize;
    loop {
        if cursor == bytes.len() {
            break;
        }
        if cursor + 4 > bytes.len() {
            return DecodedSegment {
                messages,
                truncated: true,
            };
        }
        let len = u32::from_be_bytes(bytes[cursor..cursor + 4].try_into().unwrap()) as usize;
        if len > MAX_MESSAGE_BYTES || cursor + 4 + len > bytes.len() {
            return DecodedSegment {
                messages,
                truncated: true,
            };
        }
        messages.push(bytes[cursor + 4..cursor + 4 + len].to_vec());
        cursor += 4 + len;
    }
    DecodedSegment {
        messages,
        truncated: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_empty_and_nonempty_messages() {
        let messages = vec![b"hello".to_vec(), b"".to_vec(), b"world".to_vec()];
        let encoded = encode_segment(&messages);
        let decoded = decode_segment(&encoded);
        assert!(!decoded.truncated);
        assert_eq!(decoded.messages, messages);
    }

    #[test]
    fn empty_segment_decodes_to_no_messages() {
        let decoded = decode_segment(&[]);
        assert!(!decoded.truncated);
        assert!(decoded.messages.is_empty());
    }

    #[test]
    fn truncated_length_prefix_marks_truncated() {
        let decoded = decode_segment(&[0, 0, 0]);
        assert!(decoded.truncated);
        assert!(decoded.messages.is_empty());
    }

    #[test]
    fn truncated_body_keeps_prior_messages_and_marks_truncated() {
        let mut buf = encode_segment(&[b"full".to_vec()]);
        buf.extend_from_slice(&100u32.to_be_bytes());
        buf.extend_from_slice(b"short");
        let decoded = decode_segment(&buf);
        assert!(decoded.truncated);
        assert_eq!(decoded.messages, vec![b"full".to_vec()]);
    }

    #[test]
    fn oversized_length_prefix_marks_truncated_without_allocating() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_MESSAGE_BYTES as u32 + 1).to_be_bytes());
        let decoded = decode_segment(&buf);
        assert!(decoded.truncated);
        assert!(decoded.messages.is_empty());
    }

    #[test]
    fn segment_key_is_stable_and_base64_safe() {
        let key = BlobStore::key("proj", "my:stream.1", 7);
        assert_eq!(key.as_ref(), format!("stream/{}/segment-7.seg", {
            use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
            URL_SAFE_NO_PAD.encode(b"proj/my:stream.1")
        }));
    }
}
