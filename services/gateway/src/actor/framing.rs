//! Content-type framing rules (spec §4.4): JSON streams are framed as a
//! `[msg0,msg1,...]` array of message-index offsets; everything else is
//! raw concatenated bytes with byte offsets.

use bytes::{Bytes, BytesMut};

use crate::repo::hot_ops::HotOpRow;

/// Frames hot ops starting at `from_offset`. For binary/text content the
/// first row may start before `from_offset` (it was fetched because it
/// *contains* that offset); its leading bytes are trimmed before framing.
/// JSON ops always align to message boundaries, so no trimming applies.
pub fn frame_hot_ops(rows: &[HotOpRow], is_json: bool, from_offset: i64) -> Bytes {
    if is_json || rows.is_empty() {
        return frame_bodies(rows.iter().map(|r| r.body.as_slice()), is_json);
    }
    let mut buf = BytesMut::new();
    for (idx, row) in rows.iter().enumerate() {
        if idx == 0 {
            let skip = (from_offset - row.start_offset).max(0) as usize;
            buf.extend_from_slice(&row.body[skip.min(row.body.len())..]);
        } else {
            buf.extend_from_slice(&row.body);
        }
    }
    buf.freeze()
}

pub fn frame_bodies<'a>(bodies: impl Iterator<Item = &'a [u8]>, is_json: bool) -> Bytes {
    if !is_json {
        let mut buf = BytesMut::new();
        for b in bodies {
            buf.extend_from_slice(b);
        }
        return buf.freeze();
    }
    let mut buf = BytesMut::new();
    buf.extend_from_slice(b"[");
    let mut first = true;
    for b in bodies {
        if !first {
            buf.extend_from_slice(b",");
        }
        first = false;
        buf.extend_from_slice(b);
    }
    buf.extend_from_slice(b"]");
    buf.freeze()
}

/// Offset delta contributed by one append body under this stream's content
/// type: one message (JSON) or the byte length (binary/text).
pub fn offset_delta(body: &[u8], is_json: bool) -> i64 {
    if is_json {
        1
    } else {
        body.len() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_frames_as_bracketed_comma_joined_array() {
        let bodies = vec![b"{\"a\":1}".as_slice(), b"{\"b\":2}".as_slice()];
        let framed = frame_bodies(bodies.into_iter(), true);
        assert_eq!(&framed[..], b"[{\"a\":1},{\"b\":2}]".as_slice());
    }

    #[test]
    fn empty_json_read_frames_as_empty_array() {
        let framed = frame_bodies(std::iter::empty(), true);
        assert_eq!(&framed[..], b"[]".as_slice());
    }

    #[test]
    fn binary_frames_as_raw_concatenation() {
        let bodies = vec![b"foo".as_slice(), b"bar".as_slice()];
        let framed = frame_bodies(bodies.into_iter(), false);
        assert_eq!(&framed[..], b"foobar".as_slice());
    }

    #[test]
    fn offset_delta_counts_messages_for_json_and_bytes_for_binary() {
        assert_eq!(offset_delta(b"{\"a\":1}", true), 1);
        assert_eq!(offset_delta(b"hello", false), 5);
    }
}
