use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, Transaction};

#[derive(Debug, Clone, FromRow)]
pub struct ProducerRow {
    pub producer_id: String,
    pub epoch: i64,
    pub last_seq: i64,
    pub last_updated: DateTime<Utc>,
}

pub async fn fetch(
    tx: &mut Transaction<'_, Postgres>,
    project_id: &str,
    stream_id: &str,
    producer_id: &str,
) -> Result<Option<ProducerRow>, sqlx::Error> {
    sqlx::query_as::<_, ProducerRow>(
        r#"SELECT producer_id, epoch, last_seq, last_updated
           FROM producers
           WHERE project_id = $1 AND stream_id = $2 AND producer_id = $3"#,
    )
    .bind(project_id)
    .bind(stream_id)
    .bind(producer_id)
    .fetch_optional(&mut **tx)
    .await
}

pub async fn upsert(
    tx: &mut Transaction<'_, Postgres>,
    project_id: &str,
    stream_id: &str,
    producer_id: &str,
    epoch: i64,
    last_seq: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO producers (project_id, stream_id, producer_id, epoch, last_seq, last_updated)
           VALUES ($1, $2, $3, $4, $5, now())
           ON CONFLICT (project_id, stream_id, producer_id)
           DO UPDATE SET epoch = EXCLUDED.epoch, last_seq = EXCLUDED.last_seq, last_updated = now()"#,
    )
    .bind(project_id)
    .bind(stream_id)
    .bind(producer_id)
    .bind(epoch)
    .bind(last_seq)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Lazily prunes producer rows whose `last_updated` predates `ttl`. Called
/// opportunistically on access per spec §4.2, not on a background timer.
pub async fn prune_stale(
    tx: &mut Transaction<'_, Postgres>,
    project_id: &str,
    stream_id: &str,
    ttl: chrono::Duration,
) -> Result<(), sqlx::Error> {
    let cutoff = Utc::now() - ttl;
    sqlx::query(
        "DELETE FROM producers WHERE project_id = $1 AND stream_id = $2 AND last_updated < $3",
    )
    .bind(project_id)
    .bind(stream_id)
    .bind(cutoff)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
