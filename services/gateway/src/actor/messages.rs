//! Mailbox message types for a single stream actor (spec §4.1).
//!
//! Every public operation is a request/reply pair over a oneshot channel;
//! nothing here blocks the actor loop itself (spec §9 "waiter passivity").

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::http::response::ApiError;
use streams_protocol::{Offset, RequestedOffset};

#[derive(Debug, Clone)]
pub struct ProducerHeader {
    pub producer_id: String,
    pub epoch: i64,
    pub seq: i64,
}

pub struct PutRequest {
    pub content_type: String,
    pub public: bool,
    pub closed: bool,
    pub ttl_seconds: Option<i64>,
    pub initial_body: Option<Bytes>,
    pub producer: Option<ProducerHeader>,
}

pub struct PutOutcome {
    pub created: bool,
    pub next_offset: Offset,
    pub closed: bool,
}

pub struct AppendRequest {
    pub body: Bytes,
    pub producer: Option<ProducerHeader>,
    pub stream_seq: Option<i64>,
    pub close: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendStatus {
    Accepted,
    Duplicate,
}

pub struct AppendOutcome {
    pub status: AppendStatus,
    pub next_offset: Offset,
    pub closed: bool,
    pub write_timestamp_ms: i64,
}

pub struct HeadOutcome {
    pub content_type: String,
    pub closed: bool,
    pub public: bool,
    pub next_offset: Offset,
}

pub enum ReadWait {
    /// Plain catch-up read: respond immediately even if no new data.
    None,
    /// Long-poll / SSE: if no data is available yet, register a waiter and
    /// reply later (on wake or on timeout).
    Suspend(std::time::Duration),
}

pub struct ReadRequest {
    pub offset: RequestedOffset,
    pub max_chunk_bytes: usize,
    pub wait: ReadWait,
}

pub struct ReadOutcome {
    pub body: Bytes,
    pub is_json: bool,
    pub next_offset: Offset,
    pub up_to_date: bool,
    pub closed_at_tail: bool,
    pub write_timestamp_ms: Option<i64>,
    pub truncated: bool,
}

pub struct InspectOutcome {
    pub exists: bool,
    pub sources: Vec<String>,
}

pub enum StreamCommand {
    Put(PutRequest, oneshot::Sender<Result<PutOutcome, ApiError>>),
    Append(AppendRequest, oneshot::Sender<Result<AppendOutcome, ApiError>>),
    Delete(oneshot::Sender<Result<(), ApiError>>),
    Head(oneshot::Sender<Result<HeadOutcome, ApiError>>),
    Read(ReadRequest, oneshot::Sender<Result<ReadOutcome, ApiError>>),

    /// Sent to a *target* actor: ensures the target stream exists (creating
    /// it with `source_content_type` if absent) and records the edge.
    Subscribe {
        source_key: String,
        source_content_type: String,
        reply: oneshot::Sender<Result<(), ApiError>>,
    },
    /// Sent to a *target* actor: drops the edge from `source_key`.
    Unsubscribe {
        source_key: String,
        reply: oneshot::Sender<Result<(), ApiError>>,
    },
    /// Sent to a *target* actor: create-if-absent (empty JSON stream) and
    /// reset its TTL.
    Touch {
        ttl_seconds: Option<i64>,
        reply: oneshot::Sender<Result<(), ApiError>>,
    },
    Inspect(oneshot::Sender<Result<InspectOutcome, ApiError>>),

    /// Internal: a previously-registered waiter's deadline elapsed.
    WaiterExpired(u64),
    /// Internal: an estuary target's TTL alarm fired. Carries the expiry
    /// generation it was armed under, so a `Touch` that resets the TTL in
    /// the meantime makes a stale alarm a no-op.
    Expire(u64),
}
