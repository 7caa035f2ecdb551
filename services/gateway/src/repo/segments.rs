use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, Transaction};

#[derive(Debug, Clone, FromRow)]
pub struct SegmentRow {
    pub read_seq: i64,
    pub start_offset: i64,
    pub end_offset: i64,
    pub blob_key: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub size_bytes: i64,
    pub message_count: i64,
}

#[allow(clippy::too_many_arguments)]
pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    project_id: &str,
    stream_id: &str,
    read_seq: i64,
    start_offset: i64,
    end_offset: i64,
    blob_key: &str,
    content_type: &str,
    expires_at: Option<DateTime<Utc>>,
    size_bytes: i64,
    message_count: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO segments
               (project_id, stream_id, read_seq, start_offset, end_offset, blob_key,
                content_type, expires_at, size_bytes, message_count)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
    )
    .bind(project_id)
    .bind(stream_id)
    .bind(read_seq)
    .bind(start_offset)
    .bind(end_offset)
    .bind(blob_key)
    .bind(content_type)
    .bind(expires_at)
    .bind(size_bytes)
    .bind(message_count)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        r#"INSERT INTO segments_admin
               (project_id, stream_id, read_seq, blob_key, size_bytes, message_count)
           VALUES ($1, $2, $3, $4, $5, $6)"#,
    )
    .bind(project_id)
    .bind(stream_id)
    .bind(read_seq)
    .bind(blob_key)
    .bind(size_bytes)
    .bind(message_count)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// The segment whose range `[start_offset, end_offset)` contains `offset`.
pub async fn find_containing(
    tx: &mut Transaction<'_, Postgres>,
    project_id: &str,
    stream_id: &str,
    offset: i64,
) -> Result<Option<SegmentRow>, sqlx::Error> {
    sqlx::query_as::<_, SegmentRow>(
        r#"SELECT read_seq, start_offset, end_offset, blob_key, content_type, created_at,
                  expires_at, size_bytes, message_count
           FROM segments
           WHERE project_id = $1 AND stream_id = $2
             AND start_offset <= $3 AND end_offset > $3"#,
    )
    .bind(project_id)
    .bind(stream_id)
    .bind(offset)
    .fetch_optional(&mut **tx)
    .await
}

/// Deletes the stream's admin-index mirror rows synchronously; spec §9
/// requires this even when segment blob deletion itself is deferred.
pub async fn delete_admin_index(
    tx: &mut Transaction<'_, Postgres>,
    project_id: &str,
    stream_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM segments_admin WHERE project_id = $1 AND stream_id = $2")
        .bind(project_id)
        .bind(stream_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn list_blob_keys(
    tx: &mut Transaction<'_, Postgres>,
    project_id: &str,
    stream_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT blob_key FROM segments WHERE project_id = $1 AND stream_id = $2",
    )
    .bind(project_id)
    .bind(stream_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows.into_iter().map(|(k,)| k).collect())
}
