use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, Transaction};

#[derive(Debug, Clone, FromRow)]
pub struct StreamRow {
    pub project_id: String,
    pub stream_id: String,
    pub content_type: String,
    pub closed: bool,
    pub public: bool,
    pub tail_offset: i64,
    pub segment_start: i64,
    pub read_seq: i64,
    pub segment_messages: i64,
    pub segment_bytes: i64,
    pub last_stream_seq: Option<i64>,
    pub closed_by_producer: Option<String>,
    pub closed_by_epoch: Option<i64>,
    pub closed_by_seq: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub ttl_seconds: Option<i64>,
}

pub async fn fetch(
    tx: &mut Transaction<'_, Postgres>,
    project_id: &str,
    stream_id: &str,
) -> Result<Option<StreamRow>, sqlx::Error> {
    sqlx::query_as::<_, StreamRow>(
        "SELECT * FROM streams WHERE project_id = $1 AND stream_id = $2",
    )
    .bind(project_id)
    .bind(stream_id)
    .fetch_optional(&mut **tx)
    .await
}

#[allow(clippy::too_many_arguments)]
pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    project_id: &str,
    stream_id: &str,
    content_type: &str,
    public: bool,
    ttl_seconds: Option<i64>,
) -> Result<StreamRow, sqlx::Error> {
    let expires_at = ttl_seconds.map(|ttl| Utc::now() + chrono::Duration::seconds(ttl));
    sqlx::query_as::<_, StreamRow>(
        r#"INSERT INTO streams (project_id, stream_id, content_type, public, ttl_seconds, expires_at)
           VALUES ($1, $2, $3, $4, $5, $6)
           RETURNING *"#,
    )
    .bind(project_id)
    .bind(stream_id)
    .bind(content_type)
    .bind(public)
    .bind(ttl_seconds)
    .bind(expires_at)
    .fetch_one(&mut **tx)
    .await
}

/// Advances the tail/segment bookkeeping after an append commits. Does not
/// touch rotation bookkeeping beyond what the caller already resolved.
#[allow(clippy::too_many_arguments)]
pub async fn apply_append(
    tx: &mut Transaction<'_, Postgres>,
    project_id: &str,
    stream_id: &str,
    new_tail_offset: i64,
    segment_messages: i64,
    segment_bytes: i64,
    close: Option<(String, i64, i64)>,
) -> Result<(), sqlx::Error> {
    match close {
        Some((producer_id, epoch, seq)) => {
            sqlx::query(
                r#"UPDATE streams
                   SET tail_offset = $3, segment_messages = $4, segment_bytes = $5,
                       closed = true, closed_at = now(),
                       closed_by_producer = $6, closed_by_epoch = $7, closed_by_seq = $8
                   WHERE project_id = $1 AND stream_id = $2"#,
            )
            .bind(project_id)
            .bind(stream_id)
            .bind(new_tail_offset)
            .bind(segment_messages)
            .bind(segment_bytes)
            .bind(producer_id)
            .bind(epoch)
            .bind(seq)
            .execute(&mut **tx)
            .await?;
        }
        None => {
            sqlx::query(
                r#"UPDATE streams
                   SET tail_offset = $3, segment_messages = $4, segment_bytes = $5
                   WHERE project_id = $1 AND stream_id = $2"#,
            )
            .bind(project_id)
            .bind(stream_id)
            .bind(new_tail_offset)
            .bind(segment_messages)
            .bind(segment_bytes)
            .execute(&mut **tx)
            .await?;
        }
    }
    Ok(())
}

pub async fn close_only(
    tx: &mut Transaction<'_, Postgres>,
    project_id: &str,
    stream_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE streams SET closed = true, closed_at = now()
           WHERE project_id = $1 AND stream_id = $2 AND closed = false"#,
    )
    .bind(project_id)
    .bind(stream_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn mark_rotated(
    tx: &mut Transaction<'_, Postgres>,
    project_id: &str,
    stream_id: &str,
    new_segment_start: i64,
    new_read_seq: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE streams
           SET segment_start = $3, read_seq = $4, segment_messages = 0, segment_bytes = 0
           WHERE project_id = $1 AND stream_id = $2"#,
    )
    .bind(project_id)
    .bind(stream_id)
    .bind(new_segment_start)
    .bind(new_read_seq)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Resets an estuary target's TTL (spec §4.6 "Touch").
pub async fn touch_ttl(
    tx: &mut Transaction<'_, Postgres>,
    project_id: &str,
    stream_id: &str,
    ttl_seconds: Option<i64>,
) -> Result<(), sqlx::Error> {
    let expires_at = ttl_seconds.map(|ttl| Utc::now() + chrono::Duration::seconds(ttl));
    sqlx::query("UPDATE streams SET ttl_seconds = $3, expires_at = $4 WHERE project_id = $1 AND stream_id = $2")
        .bind(project_id)
        .bind(stream_id)
        .bind(ttl_seconds)
        .bind(expires_at)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn delete(
    tx: &mut Transaction<'_, Postgres>,
    project_id: &str,
    stream_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM streams WHERE project_id = $1 AND stream_id = $2")
        .bind(project_id)
        .bind(stream_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
