//! `/v1/stream/{projectId}/{streamId}` — create, append, read, head, delete
//! (spec §4.1, §4.7).

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use streams_protocol::{is_valid_identifier, RequestedOffset, Scope};
use tokio::sync::oneshot;

use crate::actor::messages::{
    AppendRequest, AppendStatus, ProducerHeader, PutRequest, ReadRequest, ReadWait, StreamCommand,
};
use crate::actor::registry;
use crate::auth;
use crate::state::AppState;

use super::cors;
use super::response::{self, set_cache_control, set_offset_headers, ApiError};
use super::sse;

fn validate_ids(project_id: &str, stream_id: &str) -> Result<(), ApiError> {
    if !is_valid_identifier(project_id) || !is_valid_identifier(stream_id) {
        return Err(ApiError::Validation("invalid project or stream id".into()));
    }
    Ok(())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn header_flag(headers: &HeaderMap, name: &str) -> bool {
    header_str(headers, name).is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

fn parse_producer_header(headers: &HeaderMap) -> Result<Option<ProducerHeader>, ApiError> {
    let Some(producer_id) = header_str(headers, "producer-id") else {
        return Ok(None);
    };
    let epoch = header_str(headers, "producer-epoch")
        .ok_or_else(|| ApiError::Validation("Producer-Epoch is required with Producer-Id".into()))?
        .parse::<i64>()
        .map_err(|_| ApiError::Validation("Producer-Epoch must be an integer".into()))?;
    let seq = header_str(headers, "producer-seq")
        .ok_or_else(|| ApiError::Validation("Producer-Seq is required with Producer-Id".into()))?
        .parse::<i64>()
        .map_err(|_| ApiError::Validation("Producer-Seq must be an integer".into()))?;
    Ok(Some(ProducerHeader {
        producer_id: producer_id.to_owned(),
        epoch,
        seq,
    }))
}

async fn send_command(
    state: &AppState,
    key: &str,
    cmd: StreamCommand,
) -> Result<(), ApiError> {
    let tx = state.actors.get_or_spawn(key).await;
    tx.send(cmd)
        .await
        .map_err(|_| ApiError::Internal(anyhow::anyhow!("stream actor mailbox closed")))
}

pub async fn put_stream(
    State(state): State<AppState>,
    Path((project_id, stream_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    validate_ids(&project_id, &stream_id)?;
    auth::require_scope(&state, &headers, &project_id, Scope::Write).await?;

    if body.len() > state.config.max_append_body_bytes {
        return Err(ApiError::Validation("body exceeds maximum append size".into()));
    }
    let content_type = header_str(&headers, "content-type")
        .unwrap_or("application/octet-stream")
        .to_owned();
    let producer = parse_producer_header(&headers)?;
    let ttl_seconds = header_str(&headers, "stream-ttl-seconds").and_then(|v| v.parse().ok());

    let req = PutRequest {
        content_type,
        public: header_flag(&headers, "stream-public"),
        closed: header_flag(&headers, "stream-closed"),
        ttl_seconds,
        initial_body: (!body.is_empty()).then_some(body),
        producer,
    };

    let key = registry::stream_key(&project_id, &stream_id);
    let (reply_tx, reply_rx) = oneshot::channel();
    send_command(&state, &key, StreamCommand::Put(req, reply_tx)).await?;
    let outcome = reply_rx
        .await
        .map_err(|_| ApiError::Internal(anyhow::anyhow!("stream actor dropped reply")))??;

    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let mut response = status.into_response();
    set_offset_headers(&mut response, &outcome.next_offset, outcome.closed, None);
    if outcome.created {
        response::try_set_header(
            &mut response,
            "location",
            format!("/v1/stream/{project_id}/{stream_id}"),
        );
    }
    cors::apply(&mut response, &state, &project_id, &headers).await;
    Ok(response)
}

pub async fn append_stream(
    State(state): State<AppState>,
    Path((project_id, stream_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    validate_ids(&project_id, &stream_id)?;
    auth::require_scope(&state, &headers, &project_id, Scope::Write).await?;

    if body.len() > state.config.max_append_body_bytes {
        return Err(ApiError::Validation("body exceeds maximum append size".into()));
    }
    let producer = parse_producer_header(&headers)?;
    let stream_seq = header_str(&headers, "stream-seq").and_then(|v| v.parse().ok());
    let close = header_flag(&headers, "stream-closed");
    let body_was_empty = body.is_empty();

    let req = AppendRequest {
        body,
        producer,
        stream_seq,
        close,
    };
    let key = registry::stream_key(&project_id, &stream_id);
    let (reply_tx, reply_rx) = oneshot::channel();
    send_command(&state, &key, StreamCommand::Append(req, reply_tx)).await?;
    let outcome = reply_rx
        .await
        .map_err(|_| ApiError::Internal(anyhow::anyhow!("stream actor dropped reply")))??;

    // 204 for a close-only/no-body append, 200 whenever data was written
    // (including a duplicate, which still reports the prior outcome).
    let status = if body_was_empty {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::OK
    };
    let mut response = status.into_response();
    set_offset_headers(&mut response, &outcome.next_offset, outcome.closed, None);
    response::try_set_header(
        &mut response,
        "stream-write-timestamp",
        outcome.write_timestamp_ms.to_string(),
    );
    if outcome.status == AppendStatus::Duplicate {
        response::try_set_header(&mut response, "stream-append-duplicate", "true");
    }
    cors::apply(&mut response, &state, &project_id, &headers).await;
    Ok(response)
}

pub async fn head_stream(
    State(state): State<AppState>,
    Path((project_id, stream_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    validate_ids(&project_id, &stream_id)?;
    auth::require_scope(&state, &headers, &project_id, Scope::Read).await?;

    let key = registry::stream_key(&project_id, &stream_id);
    let (reply_tx, reply_rx) = oneshot::channel();
    send_command(&state, &key, StreamCommand::Head(reply_tx)).await?;
    let outcome = reply_rx
        .await
        .map_err(|_| ApiError::Internal(anyhow::anyhow!("stream actor dropped reply")))??;

    let mut response = StatusCode::OK.into_response();
    set_offset_headers(&mut response, &outcome.next_offset, outcome.closed, None);
    response::try_set_header(&mut response, "content-type", &outcome.content_type);
    cors::apply(&mut response, &state, &project_id, &headers).await;
    Ok(response)
}

pub async fn delete_stream(
    State(state): State<AppState>,
    Path((project_id, stream_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    validate_ids(&project_id, &stream_id)?;
    auth::require_scope(&state, &headers, &project_id, Scope::Write).await?;

    let key = registry::stream_key(&project_id, &stream_id);
    let (reply_tx, reply_rx) = oneshot::channel();
    send_command(&state, &key, StreamCommand::Delete(reply_tx)).await?;
    reply_rx
        .await
        .map_err(|_| ApiError::Internal(anyhow::anyhow!("stream actor dropped reply")))??;
    let mut response = StatusCode::NO_CONTENT.into_response();
    cors::apply(&mut response, &state, &project_id, &headers).await;
    Ok(response)
}

#[derive(Debug, Deserialize)]
pub struct ReadQuery {
    pub offset: Option<String>,
    pub live: Option<String>,
    pub cursor: Option<i64>,
    #[serde(rename = "maxChunkBytes")]
    pub max_chunk_bytes: Option<usize>,
}

pub async fn read_stream(
    State(state): State<AppState>,
    Path((project_id, stream_id)): Path<(String, String)>,
    Query(query): Query<ReadQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    validate_ids(&project_id, &stream_id)?;

    // HEAD first so read auth can honor a stream's own `public` flag, not
    // just the project's (spec §3 "public — if true, reads bypass auth").
    let key = registry::stream_key(&project_id, &stream_id);
    let (head_tx, head_rx) = oneshot::channel();
    send_command(&state, &key, StreamCommand::Head(head_tx)).await?;
    let head = head_rx
        .await
        .map_err(|_| ApiError::Internal(anyhow::anyhow!("stream actor dropped reply")))??;

    auth::require_read_or_public(&state, &headers, &project_id, head.public).await?;

    if query.live.as_deref() == Some("sse") {
        let is_json = streams_protocol::is_json_content_type(&head.content_type);
        return sse::sse_stream(state, project_id, stream_id, query, is_json, headers).await;
    }

    let requested_offset = match &query.offset {
        Some(raw) => raw
            .parse::<RequestedOffset>()
            .map_err(|e| ApiError::Validation(e.to_string()))?,
        None => RequestedOffset::Tail,
    };
    let is_now = query.offset.as_deref() == Some("now") || query.offset.is_none();
    let max_chunk_bytes = query
        .max_chunk_bytes
        .unwrap_or(state.config.max_chunk_bytes)
        .min(state.config.max_chunk_bytes);

    let wait = match query.live.as_deref() {
        Some("long-poll") => ReadWait::Suspend(state.config.long_poll_timeout),
        _ => ReadWait::None,
    };
    let is_long_poll = matches!(wait, ReadWait::Suspend(_));

    let req = ReadRequest {
        offset: requested_offset,
        max_chunk_bytes,
        wait,
    };
    let (reply_tx, reply_rx) = oneshot::channel();
    send_command(&state, &key, StreamCommand::Read(req, reply_tx)).await?;
    let outcome = reply_rx
        .await
        .map_err(|_| ApiError::Internal(anyhow::anyhow!("stream actor dropped reply")))??;

    let closed_no_data = outcome.closed_at_tail && outcome.body.is_empty();
    let timed_out = is_long_poll && outcome.body.is_empty() && !outcome.closed_at_tail;
    let status = if timed_out || closed_no_data {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::OK
    };

    let is_json = outcome.is_json;
    let write_timestamp_ms = outcome.write_timestamp_ms;
    let truncated = outcome.truncated;
    let up_to_date = outcome.up_to_date;
    let closed_at_tail = outcome.closed_at_tail;
    let next_offset = outcome.next_offset;

    let mut response = (status, outcome.body).into_response();
    set_offset_headers(&mut response, &next_offset, closed_at_tail, Some(up_to_date));
    response::try_set_header(
        &mut response,
        "content-type",
        if is_json { "application/json" } else { "application/octet-stream" },
    );
    if let Some(ts) = write_timestamp_ms {
        response::try_set_header(&mut response, "stream-write-timestamp", ts.to_string());
    }
    if truncated {
        response::try_set_header(&mut response, "stream-truncated", "true");
    }

    let cacheable = !timed_out && !(is_now && up_to_date);
    set_cache_control(&mut response, cacheable);

    let now = chrono::Utc::now().timestamp();
    let current_interval = streams_protocol::cursor::current_interval(now);
    let cursor = streams_protocol::generate_response_cursor(query.cursor, current_interval);
    response::try_set_header(&mut response, "stream-cursor", cursor.to_string());
    cors::apply(&mut response, &state, &project_id, &headers).await;

    Ok(response)
}
