//! `GET /v1/stream/{projectId}/{streamId}?live=sse` (spec §4.3).
//!
//! Reuses the same `StreamCommand::Read`/waiter machinery as long-poll: each
//! loop iteration issues one suspended read, emits a `data` event (base64
//! for binary content) paired with a `control` event carrying the resulting
//! offset, then issues the next read from wherever the last one left off.

use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use streams_protocol::RequestedOffset;
use tokio::sync::oneshot;

use crate::actor::messages::{ReadRequest, ReadWait, StreamCommand};
use crate::actor::registry;
use crate::state::AppState;

use super::cors;
use super::response::ApiError;
use super::streams::ReadQuery;

pub async fn sse_stream(
    state: AppState,
    project_id: String,
    stream_id: String,
    query: ReadQuery,
    is_json: bool,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let requested_offset = match &query.offset {
        Some(raw) => raw
            .parse::<RequestedOffset>()
            .map_err(|e| ApiError::Validation(e.to_string()))?,
        None => RequestedOffset::Tail,
    };
    let max_chunk_bytes = query
        .max_chunk_bytes
        .unwrap_or(state.config.max_chunk_bytes)
        .min(state.config.max_chunk_bytes);
    let timeout = state.config.long_poll_timeout;
    let key = registry::stream_key(&project_id, &stream_id);

    let events = async_stream::stream! {
        let mut offset = requested_offset;
        loop {
            let req = ReadRequest {
                offset: offset.clone(),
                max_chunk_bytes,
                wait: ReadWait::Suspend(timeout),
            };
            let tx = state.actors.get_or_spawn(&key).await;
            let (reply_tx, reply_rx) = oneshot::channel();
            if tx.send(StreamCommand::Read(req, reply_tx)).await.is_err() {
                break;
            }
            let outcome = match reply_rx.await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(ApiError::NotFound(_))) => {
                    yield Ok(control_event(None, true, true));
                    break;
                }
                Ok(Err(_)) | Err(_) => break,
            };

            if !outcome.body.is_empty() {
                let data = if is_json {
                    String::from_utf8_lossy(&outcome.body).into_owned()
                } else {
                    BASE64.encode(&outcome.body)
                };
                yield Ok(Event::default().event("data").data(data));
            }

            let up_to_date = outcome.up_to_date;
            let closed = outcome.closed_at_tail;
            yield Ok(control_event(Some(outcome.next_offset.encode()), up_to_date, closed));

            if closed {
                break;
            }
            offset = RequestedOffset::Literal(outcome.next_offset);
        }
    };

    let mut response = Sse::new(events)
        .keep_alive(
            KeepAlive::new()
                .interval(state.config.sse_keepalive_interval)
                .text("ping"),
        )
        .into_response();
    if !is_json {
        super::response::try_set_header(&mut response, "stream-sse-data-encoding", "base64");
    }
    cors::apply(&mut response, &state, &project_id, &headers).await;
    Ok(response)
}

fn control_event(next_offset: Option<String>, up_to_date: bool, stream_closed: bool) -> Event {
    let payload = serde_json::json!({
        "streamNextOffset": next_offset,
        "upToDate": up_to_date,
        "streamClosed": stream_closed,
    });
    Event::default().event("control").data(payload.to_string())
}
