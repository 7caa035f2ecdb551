use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, Transaction};

#[derive(Debug, Clone, FromRow)]
pub struct HotOpRow {
    pub start_offset: i64,
    pub end_offset: i64,
    pub size_bytes: i64,
    pub body: Vec<u8>,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub producer_id: Option<String>,
    pub producer_epoch: Option<i64>,
    pub producer_seq: Option<i64>,
}

#[allow(clippy::too_many_arguments)]
pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    project_id: &str,
    stream_id: &str,
    start_offset: i64,
    end_offset: i64,
    body: &[u8],
    content_type: &str,
    producer: Option<(&str, i64, i64)>,
) -> Result<(), sqlx::Error> {
    let (producer_id, producer_epoch, producer_seq) = match producer {
        Some((id, epoch, seq)) => (Some(id), Some(epoch), Some(seq)),
        None => (None, None, None),
    };
    sqlx::query(
        r#"INSERT INTO hot_ops
               (project_id, stream_id, start_offset, end_offset, size_bytes, body,
                content_type, producer_id, producer_epoch, producer_seq)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
    )
    .bind(project_id)
    .bind(stream_id)
    .bind(start_offset)
    .bind(end_offset)
    .bind(end_offset - start_offset)
    .bind(body)
    .bind(content_type)
    .bind(producer_id)
    .bind(producer_epoch)
    .bind(producer_seq)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Fetch contiguous hot ops covering `from_offset`, up to `max_bytes` total
/// body size (at least one op is always returned if one exists, even if it
/// alone exceeds `max_bytes`, so a read can never stall forever). Matches on
/// `end_offset > from_offset` rather than `start_offset >= from_offset` so
/// the op a mid-op binary offset falls inside is still returned — the
/// caller (`framing::frame_hot_ops`) trims the leading bytes already
/// consumed.
pub async fn fetch_from(
    tx: &mut Transaction<'_, Postgres>,
    project_id: &str,
    stream_id: &str,
    from_offset: i64,
    max_bytes: i64,
) -> Result<Vec<HotOpRow>, sqlx::Error> {
    let rows = sqlx::query_as::<_, HotOpRow>(
        r#"SELECT start_offset, end_offset, size_bytes, body, content_type, created_at,
                  producer_id, producer_epoch, producer_seq
           FROM hot_ops
           WHERE project_id = $1 AND stream_id = $2 AND end_offset > $3
           ORDER BY start_offset ASC"#,
    )
    .bind(project_id)
    .bind(stream_id)
    .bind(from_offset)
    .fetch_all(&mut **tx)
    .await?;

    let mut out = Vec::new();
    let mut budget = max_bytes;
    for (idx, row) in rows.into_iter().enumerate() {
        if !out.is_empty() && budget <= 0 {
            break;
        }
        let consumed_len = if idx == 0 {
            (row.end_offset - from_offset).min(row.size_bytes)
        } else {
            row.size_bytes
        };
        budget -= consumed_len;
        out.push(row);
    }
    Ok(out)
}

/// All hot ops in `[segment_start, tail_offset)`, used by segment rotation.
pub async fn fetch_range(
    tx: &mut Transaction<'_, Postgres>,
    project_id: &str,
    stream_id: &str,
    segment_start: i64,
    tail_offset: i64,
) -> Result<Vec<HotOpRow>, sqlx::Error> {
    sqlx::query_as::<_, HotOpRow>(
        r#"SELECT start_offset, end_offset, size_bytes, body, content_type, created_at,
                  producer_id, producer_epoch, producer_seq
           FROM hot_ops
           WHERE project_id = $1 AND stream_id = $2
             AND start_offset >= $3 AND end_offset <= $4
           ORDER BY start_offset ASC"#,
    )
    .bind(project_id)
    .bind(stream_id)
    .bind(segment_start)
    .bind(tail_offset)
    .fetch_all(&mut **tx)
    .await
}

pub async fn delete_range(
    tx: &mut Transaction<'_, Postgres>,
    project_id: &str,
    stream_id: &str,
    up_to_offset: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "DELETE FROM hot_ops WHERE project_id = $1 AND stream_id = $2 AND end_offset <= $3",
    )
    .bind(project_id)
    .bind(stream_id)
    .bind(up_to_offset)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
