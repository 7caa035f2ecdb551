//! Segment rotation and blob catch-up reads (spec §4.5).

use anyhow::Context as _;
use bytes::{Bytes, BytesMut};
use sqlx::PgPool;

use crate::blob::{decode_segment, encode_segment, BlobStore};
use crate::http::response::ApiError;
use crate::repo::{hot_ops, segments, streams};

use super::framing::frame_bodies;

/// Rotates the current hot segment to the blob store if it has crossed
/// either threshold, or unconditionally when `force` (the stream just
/// closed). A failed blob write leaves the hot log untouched; the next
/// append retries (spec §4.5). When `retain_hot_ops` is set, the rotated
/// range is left in `hot_ops` rather than deleted (spec §9 "retain-ops
/// mode") — the blob copy still exists, so this only affects how much the
/// hot path has to scan.
#[allow(clippy::too_many_arguments)]
pub async fn maybe_rotate(
    pool: &PgPool,
    blob: &BlobStore,
    project_id: &str,
    stream_id: &str,
    segment_max_messages: i64,
    segment_max_bytes: i64,
    retain_hot_ops: bool,
    force: bool,
) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    let Some(row) = streams::fetch(&mut tx, project_id, stream_id).await? else {
        return Ok(());
    };
    let should_rotate = force
        || row.segment_messages >= segment_max_messages
        || row.segment_bytes >= segment_max_bytes;
    if !should_rotate || row.segment_start >= row.tail_offset {
        return Ok(());
    }

    let ops = hot_ops::fetch_range(&mut tx, project_id, stream_id, row.segment_start, row.tail_offset)
        .await?;
    verify_contiguous(&ops, row.segment_start).context("hot log is not contiguous; refusing to rotate")?;

    let bodies: Vec<Vec<u8>> = ops.iter().map(|o| o.body.clone()).collect();
    let encoded = encode_segment(&bodies);
    let key = BlobStore::key(project_id, stream_id, row.read_seq);
    blob.put_segment(&key, Bytes::from(encoded.to_vec())).await?;

    segments::insert(
        &mut tx,
        project_id,
        stream_id,
        row.read_seq,
        row.segment_start,
        row.tail_offset,
        key.as_ref(),
        &row.content_type,
        row.expires_at,
        encoded.len() as i64,
        ops.len() as i64,
    )
    .await?;
    streams::mark_rotated(&mut tx, project_id, stream_id, row.tail_offset, row.read_seq + 1).await?;
    if !retain_hot_ops {
        hot_ops::delete_range(&mut tx, project_id, stream_id, row.tail_offset).await?;
    }

    tx.commit().await?;
    Ok(())
}

fn verify_contiguous(ops: &[crate::repo::hot_ops::HotOpRow], segment_start: i64) -> anyhow::Result<()> {
    let mut expected = segment_start;
    for op in ops {
        if op.start_offset != expected {
            anyhow::bail!("expected op at offset {expected}, found {}", op.start_offset);
        }
        expected = op.end_offset;
    }
    Ok(())
}

pub struct ColdRead {
    pub body: Bytes,
    pub consumed: i64,
    pub truncated: bool,
}

/// Reads from a rotated segment, skipping forward to `offset` and
/// collecting up to `max_chunk_bytes` (spec §4.5 "Read from blob").
pub async fn read_from_segment(
    pool: &PgPool,
    blob: &BlobStore,
    project_id: &str,
    stream_id: &str,
    offset: i64,
    max_chunk_bytes: usize,
    is_json: bool,
) -> Result<ColdRead, ApiError> {
    let mut tx = pool.begin().await?;
    let Some(seg) = segments::find_containing(&mut tx, project_id, stream_id, offset).await? else {
        return Err(ApiError::Validation("offset not covered by any segment".into()));
    };
    drop(tx);

    let key = object_store::path::Path::from(seg.blob_key.clone());
    let bytes = blob.get_segment(&key).await?;
    let decoded = decode_segment(&bytes);

    if is_json {
        // JSON messages are indivisible: `offset` always lands on a message
        // boundary, so skipping whole messages is exact (spec §4.5 "skip N
        // messages").
        let skip = (offset - seg.start_offset).max(0) as usize;
        let mut collected: Vec<&[u8]> = Vec::new();
        let mut consumed_units: i64 = 0;
        let mut consumed_bytes: usize = 0;
        for (idx, msg) in decoded.messages.iter().enumerate() {
            if idx < skip {
                continue;
            }
            if !collected.is_empty() && consumed_bytes + msg.len() > max_chunk_bytes {
                break;
            }
            collected.push(msg.as_slice());
            consumed_bytes += msg.len();
            consumed_units += 1;
        }
        let body = frame_bodies(collected.into_iter(), true);
        return Ok(ColdRead {
            body,
            consumed: consumed_units,
            truncated: decoded.truncated,
        });
    }

    // Binary/text content is a flat byte stream: `offset` is a byte cursor
    // that can land in the middle of a stored message, so the skip has to
    // slice into that message rather than drop it whole (spec §4.5 "skip K
    // bytes").
    let skip_bytes = (offset - seg.start_offset).max(0) as usize;
    let mut buf = BytesMut::new();
    let mut cursor = 0usize;
    for msg in &decoded.messages {
        let msg_len = msg.len();
        if cursor + msg_len <= skip_bytes {
            cursor += msg_len;
            continue;
        }
        let start_in_msg = skip_bytes.saturating_sub(cursor);
        let available = &msg[start_in_msg..];
        let remaining_budget = max_chunk_bytes.saturating_sub(buf.len());
        if remaining_budget == 0 {
            break;
        }
        let take = available.len().min(remaining_budget);
        buf.extend_from_slice(&available[..take]);
        cursor += msg_len;
        if take < available.len() {
            break;
        }
    }
    let consumed = buf.len() as i64;
    Ok(ColdRead {
        body: buf.freeze(),
        consumed,
        truncated: decoded.truncated,
    })
}
