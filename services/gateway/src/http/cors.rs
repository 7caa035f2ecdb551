//! Per-project CORS (spec §4.7 "CORS is per-project"): each project's
//! `corsOrigins` list (or `"*"`) decides what `Access-Control-Allow-Origin`
//! a response carries. A single static `tower_http::cors::CorsLayer` can't
//! vary per project, so this is applied by hand: one reflection helper used
//! by every handler's response, plus one preflight responder per route
//! shape (the `projectId` segment sits at a different position in each).

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use streams_protocol::ProjectConfig;

use crate::http::response::{try_set_header, ApiError};
use crate::state::AppState;

fn allowed_origin<'a>(config: &ProjectConfig, origin: &'a str) -> Option<&'a str> {
    if config
        .cors_origins
        .iter()
        .any(|allowed| allowed == "*" || allowed == origin)
    {
        Some(origin)
    } else {
        None
    }
}

/// Reflects `Origin` onto the response if the project's `corsOrigins` admits
/// it. Safe to call even when the project lookup failed upstream; CORS
/// failure never escalates a successful response into an error.
pub async fn apply(
    response: &mut Response,
    state: &AppState,
    project_id: &str,
    headers: &HeaderMap,
) {
    let Some(origin) = headers.get(axum::http::header::ORIGIN).and_then(|v| v.to_str().ok())
    else {
        return;
    };
    let Ok(Some(config)) = state.projects.get(&state.pool, project_id).await else {
        return;
    };
    if let Some(origin) = allowed_origin(&config, origin) {
        try_set_header(response, "access-control-allow-origin", origin);
        try_set_header(response, "vary", "origin");
    }
}

async fn preflight(state: &AppState, project_id: &str, headers: &HeaderMap) -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    apply(&mut response, state, project_id, headers).await;
    try_set_header(
        &mut response,
        "access-control-allow-methods",
        "GET, PUT, POST, DELETE, OPTIONS",
    );
    try_set_header(
        &mut response,
        "access-control-allow-headers",
        "authorization, content-type, producer-id, producer-epoch, producer-seq, stream-ttl-seconds, stream-public, stream-closed, stream-seq",
    );
    response
}

pub async fn stream_preflight(
    State(state): State<AppState>,
    Path((project_id, _stream_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    Ok(preflight(&state, &project_id, &headers).await)
}

pub async fn estuary_target_preflight(
    State(state): State<AppState>,
    Path((project_id, _estuary_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    Ok(preflight(&state, &project_id, &headers).await)
}

pub async fn estuary_subscribe_preflight(
    State(state): State<AppState>,
    Path((project_id, _source_stream_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    Ok(preflight(&state, &project_id, &headers).await)
}

pub async fn config_preflight(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    Ok(preflight(&state, &project_id, &headers).await)
}
