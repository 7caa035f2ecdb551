//! `/v1/estuary/*` — fan-out subscription management (spec §4.6, §4.7).

use axum::extract::{Json, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use streams_protocol::{is_valid_identifier, EstuarySubscribeRequest, Scope};
use tokio::sync::oneshot;

use crate::actor::fanout;
use crate::actor::messages::StreamCommand;
use crate::actor::registry;
use crate::auth;
use crate::state::AppState;

use super::cors;
use super::response::ApiError;

fn validate_ids(project_id: &str, a: &str, b: &str) -> Result<(), ApiError> {
    if !is_valid_identifier(project_id) || !is_valid_identifier(a) || !is_valid_identifier(b) {
        return Err(ApiError::Validation("invalid project, stream, or estuary id".into()));
    }
    Ok(())
}

async fn source_content_type(
    state: &AppState,
    project_id: &str,
    source_stream_id: &str,
) -> Result<String, ApiError> {
    let key = registry::stream_key(project_id, source_stream_id);
    let tx = state.actors.get_or_spawn(&key).await;
    let (reply_tx, reply_rx) = oneshot::channel();
    tx.send(StreamCommand::Head(reply_tx))
        .await
        .map_err(|_| ApiError::Internal(anyhow::anyhow!("source actor mailbox closed")))?;
    let head = reply_rx
        .await
        .map_err(|_| ApiError::Internal(anyhow::anyhow!("source actor dropped reply")))??;
    Ok(head.content_type)
}

pub async fn subscribe(
    State(state): State<AppState>,
    Path((project_id, source_stream_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<EstuarySubscribeRequest>,
) -> Result<Response, ApiError> {
    validate_ids(&project_id, &source_stream_id, &body.estuary_id)?;
    auth::require_scope(&state, &headers, &project_id, Scope::Write).await?;

    let content_type = source_content_type(&state, &project_id, &source_stream_id).await?;
    fanout::subscribe(
        &state,
        &project_id,
        &source_stream_id,
        &body.estuary_id,
        &content_type,
    )
    .await?;
    let mut response = StatusCode::NO_CONTENT.into_response();
    cors::apply(&mut response, &state, &project_id, &headers).await;
    Ok(response)
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    Path((project_id, source_stream_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<EstuarySubscribeRequest>,
) -> Result<Response, ApiError> {
    validate_ids(&project_id, &source_stream_id, &body.estuary_id)?;
    auth::require_scope(&state, &headers, &project_id, Scope::Write).await?;

    fanout::unsubscribe(&state, &project_id, &source_stream_id, &body.estuary_id).await?;
    let mut response = StatusCode::NO_CONTENT.into_response();
    cors::apply(&mut response, &state, &project_id, &headers).await;
    Ok(response)
}

#[derive(Debug, serde::Deserialize)]
pub struct TouchBody {
    #[serde(rename = "ttlSeconds")]
    pub ttl_seconds: Option<i64>,
}

pub async fn touch(
    State(state): State<AppState>,
    Path((project_id, estuary_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, ApiError> {
    if !is_valid_identifier(&project_id) || !is_valid_identifier(&estuary_id) {
        return Err(ApiError::Validation("invalid project or estuary id".into()));
    }
    auth::require_scope(&state, &headers, &project_id, Scope::Write).await?;

    let ttl_seconds = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<TouchBody>(&body)
            .map_err(|e| ApiError::Validation(e.to_string()))?
            .ttl_seconds
    };
    fanout::touch(&state, &project_id, &estuary_id, ttl_seconds).await?;
    let mut response = StatusCode::NO_CONTENT.into_response();
    cors::apply(&mut response, &state, &project_id, &headers).await;
    Ok(response)
}

#[derive(Debug, Serialize)]
struct InspectResponse {
    exists: bool,
    sources: Vec<String>,
}

pub async fn inspect(
    State(state): State<AppState>,
    Path((project_id, estuary_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if !is_valid_identifier(&project_id) || !is_valid_identifier(&estuary_id) {
        return Err(ApiError::Validation("invalid project or estuary id".into()));
    }
    auth::require_scope(&state, &headers, &project_id, Scope::Read).await?;

    let outcome = fanout::inspect(&state, &project_id, &estuary_id).await?;
    if !outcome.exists {
        return Err(ApiError::NotFound("estuary target not found".into()));
    }
    let mut response = axum::Json(InspectResponse {
        exists: outcome.exists,
        sources: outcome.sources,
    })
    .into_response();
    cors::apply(&mut response, &state, &project_id, &headers).await;
    Ok(response)
}

pub async fn delete(
    State(state): State<AppState>,
    Path((project_id, estuary_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if !is_valid_identifier(&project_id) || !is_valid_identifier(&estuary_id) {
        return Err(ApiError::Validation("invalid project or estuary id".into()));
    }
    auth::require_scope(&state, &headers, &project_id, Scope::Write).await?;

    fanout::delete_target(&state, &project_id, &estuary_id).await?;
    let mut response = StatusCode::NO_CONTENT.into_response();
    cors::apply(&mut response, &state, &project_id, &headers).await;
    Ok(response)
}
