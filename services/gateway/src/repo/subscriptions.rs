use sqlx::{Postgres, Transaction};

pub async fn add_edge(
    tx: &mut Transaction<'_, Postgres>,
    project_id: &str,
    source_key: &str,
    target_key: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO subscriptions (project_id, source_key, target_key)
           VALUES ($1, $2, $3)
           ON CONFLICT (project_id, source_key, target_key) DO NOTHING"#,
    )
    .bind(project_id)
    .bind(source_key)
    .bind(target_key)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn remove_edge(
    tx: &mut Transaction<'_, Postgres>,
    project_id: &str,
    source_key: &str,
    target_key: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "DELETE FROM subscriptions WHERE project_id = $1 AND source_key = $2 AND target_key = $3",
    )
    .bind(project_id)
    .bind(source_key)
    .bind(target_key)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Every target currently subscribed to `source_key` (source actor's view).
pub async fn subscribers_of(
    tx: &mut Transaction<'_, Postgres>,
    project_id: &str,
    source_key: &str,
) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT target_key FROM subscriptions WHERE project_id = $1 AND source_key = $2",
    )
    .bind(project_id)
    .bind(source_key)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows.into_iter().map(|(k,)| k).collect())
}

/// Every source `target_key` subscribes to (target actor's view).
pub async fn subscriptions_of(
    tx: &mut Transaction<'_, Postgres>,
    project_id: &str,
    target_key: &str,
) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT source_key FROM subscriptions WHERE project_id = $1 AND target_key = $2",
    )
    .bind(project_id)
    .bind(target_key)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows.into_iter().map(|(k,)| k).collect())
}

pub async fn remove_all_for_target(
    tx: &mut Transaction<'_, Postgres>,
    project_id: &str,
    target_key: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM subscriptions WHERE project_id = $1 AND target_key = $2")
        .bind(project_id)
        .bind(target_key)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
