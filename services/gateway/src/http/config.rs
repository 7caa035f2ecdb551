//! `GET|PUT /v1/config/{projectId}` — project registry admin (spec §4.7).
//! `manage` scope is required for both; `GET` additionally needs an existing
//! project to read back, while `PUT` upserts.

use axum::extract::{Json, Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use streams_protocol::{is_valid_identifier, ProjectConfig, Scope};

use crate::auth;
use crate::repo::projects;
use crate::state::AppState;

use super::cors;
use super::response::ApiError;

fn validate_id(project_id: &str) -> Result<(), ApiError> {
    if !is_valid_identifier(project_id) {
        return Err(ApiError::Validation("invalid project id".into()));
    }
    Ok(())
}

pub async fn get_config(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    validate_id(&project_id)?;
    auth::require_scope(&state, &headers, &project_id, Scope::Manage).await?;

    let config = projects::get(&state.pool, &project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("project not found".into()))?;
    let mut response = Json(config).into_response();
    cors::apply(&mut response, &state, &project_id, &headers).await;
    Ok(response)
}

pub async fn put_config(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    Json(config): Json<ProjectConfig>,
) -> Result<Response, ApiError> {
    validate_id(&project_id)?;
    auth::require_scope(&state, &headers, &project_id, Scope::Manage).await?;

    if config.signing_secrets.is_empty() {
        return Err(ApiError::Validation(
            "project config requires at least one signing secret".into(),
        ));
    }
    projects::upsert(&state.pool, &project_id, &config).await?;
    state.projects.invalidate(&project_id).await;
    let mut response = Json(config).into_response();
    cors::apply(&mut response, &state, &project_id, &headers).await;
    Ok(response)
}
