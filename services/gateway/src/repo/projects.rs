use sqlx::PgPool;
use streams_protocol::ProjectConfig;

pub async fn get(pool: &PgPool, project_id: &str) -> Result<Option<ProjectConfig>, sqlx::Error> {
    let row: Option<(serde_json::Value,)> =
        sqlx::query_as("SELECT config FROM projects WHERE project_id = $1")
            .bind(project_id)
            .fetch_optional(pool)
            .await?;
    match row {
        Some((value,)) => Ok(Some(
            serde_json::from_value(value).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        )),
        None => Ok(None),
    }
}

pub async fn upsert(
    pool: &PgPool,
    project_id: &str,
    config: &ProjectConfig,
) -> Result<(), sqlx::Error> {
    let value = serde_json::to_value(config).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
    sqlx::query(
        r#"INSERT INTO projects (project_id, config, updated_at)
           VALUES ($1, $2, now())
           ON CONFLICT (project_id)
           DO UPDATE SET config = EXCLUDED.config, updated_at = now()"#,
    )
    .bind(project_id)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}
