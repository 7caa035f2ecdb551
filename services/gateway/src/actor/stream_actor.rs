//! The per-stream mailbox loop (spec §4.1, §5, §9): one Tokio task per
//! `(projectId, streamId)`, processing [`StreamCommand`]s strictly in
//! arrival order. Suspending on a long-poll/SSE read never blocks the
//! loop — it registers a passive [`Waiter`] and moves on.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use streams_protocol::{is_json_content_type, Offset, RequestedOffset};
use tokio::sync::{mpsc, oneshot, OnceCell};
use tracing::{debug, instrument};

use crate::blob::BlobStore;
use crate::config::Config;
use crate::http::response::ApiError;
use crate::repo::{hot_ops, producers, segments, streams};
use crate::repo::streams::StreamRow;
use crate::state::AppState;

use super::fanout;
use super::framing;
use super::messages::*;
use super::registry::split_stream_key;
use super::rotation;
use super::waiter::WaiterRegistry;

#[derive(Clone)]
pub struct ActorContext {
    pub pool: PgPool,
    pub blob: BlobStore,
    pub config: Arc<Config>,
    /// Set once, after the owning [`AppState`] finishes constructing
    /// itself, since the registry that owns this context is itself a
    /// field of `AppState`. Only fan-out propagation needs it.
    pub app: Arc<OnceCell<AppState>>,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[instrument(skip(rx, ctx), fields(stream = %key))]
pub async fn run(key: String, mut rx: mpsc::Receiver<StreamCommand>, ctx: ActorContext) {
    let Some((project_id, stream_id)) = split_stream_key(&key) else {
        debug!("malformed stream key, actor exiting immediately");
        return;
    };
    let project_id = project_id.to_owned();
    let stream_id = stream_id.to_owned();

    let mut waiters = WaiterRegistry::default();
    let mut deleted = false;
    let mut expiry_epoch: u64 = 0;

    'outer: loop {
        let idle = tokio::time::sleep(ctx.config.actor_idle_timeout);
        tokio::select! {
            maybe_cmd = rx.recv() => {
                match maybe_cmd {
                    Some(cmd) => {
                        handle_command(&ctx, &project_id, &stream_id, cmd, &mut waiters, &mut deleted, &mut expiry_epoch).await;
                    }
                    None => break 'outer,
                }
            }
            () = idle, if waiters.is_empty() => {
                break 'outer;
            }
        }
        if deleted {
            break 'outer;
        }
    }

    for w in waiters.drain_all() {
        let _ = w.reply.send(Err(ApiError::NotFound("stream actor shutting down".into())));
    }
}

async fn handle_command(
    ctx: &ActorContext,
    project_id: &str,
    stream_id: &str,
    cmd: StreamCommand,
    waiters: &mut WaiterRegistry,
    deleted: &mut bool,
    expiry_epoch: &mut u64,
) {
    match cmd {
        StreamCommand::Put(req, reply) => {
            let _ = reply.send(handle_put(ctx, project_id, stream_id, req).await);
        }
        StreamCommand::Append(req, reply) => {
            let outcome = handle_append(ctx, project_id, stream_id, req).await;
            if let Ok(ok) = &outcome {
                wake_waiters(ctx, project_id, stream_id, waiters, ok.next_offset.value as i64).await;
            }
            let _ = reply.send(outcome);
        }
        StreamCommand::Delete(reply) => {
            let result = handle_delete(ctx, project_id, stream_id).await;
            for w in waiters.drain_all() {
                let _ = w.reply.send(Err(ApiError::NotFound("stream deleted".into())));
            }
            if result.is_ok() {
                *deleted = true;
            }
            let _ = reply.send(result);
        }
        StreamCommand::Head(reply) => {
            let _ = reply.send(handle_head(ctx, project_id, stream_id).await);
        }
        StreamCommand::Read(req, reply) => {
            handle_read(ctx, project_id, stream_id, req, reply, waiters).await;
        }
        StreamCommand::Subscribe { source_key, source_content_type, reply } => {
            let _ = reply.send(handle_subscribe(ctx, project_id, stream_id, &source_key, &source_content_type).await);
        }
        StreamCommand::Unsubscribe { source_key: _, reply } => {
            let _ = reply.send(Ok(()));
        }
        StreamCommand::Touch { ttl_seconds, reply } => {
            let result = handle_touch(ctx, project_id, stream_id, ttl_seconds).await;
            if result.is_ok() {
                *expiry_epoch += 1;
                let epoch = *expiry_epoch;
                if let Some(ttl) = ttl_seconds.filter(|ttl| *ttl > 0) {
                    let self_key = format!("{project_id}/{stream_id}");
                    if let Some(state) = ctx.app.get() {
                        let state = state.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(Duration::from_secs(ttl as u64)).await;
                            if let Some(tx) = state.actors.peek(&self_key).await {
                                let _ = tx.send(StreamCommand::Expire(epoch)).await;
                            }
                        });
                    }
                }
            }
            let _ = reply.send(result);
        }
        StreamCommand::Inspect(reply) => {
            let _ = reply.send(handle_inspect(ctx, project_id, stream_id).await);
        }
        StreamCommand::WaiterExpired(id) => {
            if let Some(w) = waiters.remove(id) {
                let _ = w.reply.send(Ok(ReadOutcome {
                    body: bytes::Bytes::new(),
                    is_json: false,
                    next_offset: Offset::new(w.segment_start as u64, w.expected_offset as u64),
                    up_to_date: true,
                    closed_at_tail: false,
                    write_timestamp_ms: None,
                    truncated: false,
                }));
            }
        }
        StreamCommand::Expire(epoch) => {
            if epoch != *expiry_epoch {
                return;
            }
            if let Err(err) = handle_expire(ctx, project_id, stream_id).await {
                tracing::warn!(error = %err, "estuary target expiry failed");
                return;
            }
            for w in waiters.drain_all() {
                let _ = w.reply.send(Err(ApiError::NotFound("estuary target expired".into())));
            }
            *deleted = true;
        }
    }
}

/// An estuary target's TTL alarm fired (spec §4.6 "Expiry alarm"): drop the
/// subscription edges from every source, then delete the target stream
/// itself. `handle_delete`'s queries are no-ops on missing rows, so a target
/// that was already removed by a concurrent `Delete` is treated as success.
async fn handle_expire(ctx: &ActorContext, project_id: &str, stream_id: &str) -> Result<(), ApiError> {
    let target_key = format!("{project_id}/{stream_id}");
    let mut tx = ctx.pool.begin().await?;
    crate::repo::subscriptions::remove_all_for_target(&mut tx, project_id, &target_key).await?;
    tx.commit().await?;
    handle_delete(ctx, project_id, stream_id).await
}

async fn handle_put(ctx: &ActorContext, project_id: &str, stream_id: &str, req: PutRequest) -> Result<PutOutcome, ApiError> {
    let mut tx = ctx.pool.begin().await?;
    match streams::fetch(&mut tx, project_id, stream_id).await? {
        Some(row) => {
            if row.content_type != req.content_type {
                return Err(ApiError::Conflict("stream exists with a different content type".into()));
            }
            Ok(PutOutcome {
                created: false,
                next_offset: Offset::new(row.segment_start as u64, row.tail_offset as u64),
                closed: row.closed,
            })
        }
        None => {
            let row = streams::insert(&mut tx, project_id, stream_id, &req.content_type, req.public, req.ttl_seconds).await?;
            let mut tail = row.tail_offset;
            if let Some(body) = req.initial_body.filter(|b| !b.is_empty()) {
                let is_json = is_json_content_type(&req.content_type);
                let delta = framing::offset_delta(&body, is_json);
                let start = row.tail_offset;
                let end = start + delta;
                hot_ops::insert(
                    &mut tx,
                    project_id,
                    stream_id,
                    start,
                    end,
                    &body,
                    &req.content_type,
                    req.producer.as_ref().map(|p| (p.producer_id.as_str(), p.epoch, p.seq)),
                )
                .await?;
                streams::apply_append(&mut tx, project_id, stream_id, end, 1, body.len() as i64, None).await?;
                if let Some(p) = &req.producer {
                    producers::upsert(&mut tx, project_id, stream_id, &p.producer_id, p.epoch, p.seq).await?;
                }
                tail = end;
            }
            if req.closed {
                streams::close_only(&mut tx, project_id, stream_id).await?;
            }
            tx.commit().await?;
            Ok(PutOutcome {
                created: true,
                next_offset: Offset::new(row.segment_start as u64, tail as u64),
                closed: req.closed,
            })
        }
    }
}

async fn handle_append(ctx: &ActorContext, project_id: &str, stream_id: &str, req: AppendRequest) -> Result<AppendOutcome, ApiError> {
    let mut tx = ctx.pool.begin().await?;
    let Some(row) = streams::fetch(&mut tx, project_id, stream_id).await? else {
        return Err(ApiError::NotFound("stream not found".into()));
    };
    if row.closed {
        return Err(ApiError::Closed);
    }

    if req.body.is_empty() {
        if req.close {
            streams::close_only(&mut tx, project_id, stream_id).await?;
        }
        tx.commit().await?;
        let closed_now = req.close || row.closed;
        if let Err(err) = rotation::maybe_rotate(
            &ctx.pool,
            &ctx.blob,
            project_id,
            stream_id,
            ctx.config.segment_max_messages,
            ctx.config.segment_max_bytes,
            ctx.config.retain_hot_ops,
            closed_now,
        )
        .await
        {
            tracing::warn!(error = %err, "segment rotation failed, will retry on next append");
        }
        return Ok(AppendOutcome {
            status: AppendStatus::Accepted,
            next_offset: Offset::new(row.segment_start as u64, row.tail_offset as u64),
            closed: closed_now,
            write_timestamp_ms: now_ms(),
        });
    }

    if let Some(p) = &req.producer {
        producers::prune_stale(&mut tx, project_id, stream_id, ctx.config.producer_ttl).await?;
        if let Some(prow) = producers::fetch(&mut tx, project_id, stream_id, &p.producer_id).await? {
            if p.epoch < prow.epoch {
                return Err(ApiError::Conflict("stale producer epoch".into()));
            }
            if p.epoch == prow.epoch {
                if p.seq == prow.last_seq {
                    return Ok(AppendOutcome {
                        status: AppendStatus::Duplicate,
                        next_offset: Offset::new(row.segment_start as u64, row.tail_offset as u64),
                        closed: row.closed,
                        write_timestamp_ms: now_ms(),
                    });
                }
                if p.seq < prow.last_seq {
                    return Err(ApiError::Conflict("duplicate or stale producer seq".into()));
                }
            }
        }
    }

    let is_json = is_json_content_type(&row.content_type);
    let delta = framing::offset_delta(&req.body, is_json);
    let start = row.tail_offset;
    let end = start + delta;
    hot_ops::insert(
        &mut tx,
        project_id,
        stream_id,
        start,
        end,
        &req.body,
        &row.content_type,
        req.producer.as_ref().map(|p| (p.producer_id.as_str(), p.epoch, p.seq)),
    )
    .await?;

    let new_segment_messages = row.segment_messages + 1;
    let new_segment_bytes = row.segment_bytes + req.body.len() as i64;

    if req.close {
        match &req.producer {
            Some(p) => {
                streams::apply_append(
                    &mut tx,
                    project_id,
                    stream_id,
                    end,
                    new_segment_messages,
                    new_segment_bytes,
                    Some((p.producer_id.clone(), p.epoch, p.seq)),
                )
                .await?;
            }
            None => {
                streams::apply_append(&mut tx, project_id, stream_id, end, new_segment_messages, new_segment_bytes, None).await?;
                streams::close_only(&mut tx, project_id, stream_id).await?;
            }
        }
    } else {
        streams::apply_append(&mut tx, project_id, stream_id, end, new_segment_messages, new_segment_bytes, None).await?;
    }

    if let Some(p) = &req.producer {
        producers::upsert(&mut tx, project_id, stream_id, &p.producer_id, p.epoch, p.seq).await?;
    }

    tx.commit().await?;

    let closed_now = req.close || row.closed;

    if let Err(err) = rotation::maybe_rotate(
        &ctx.pool,
        &ctx.blob,
        project_id,
        stream_id,
        ctx.config.segment_max_messages,
        ctx.config.segment_max_bytes,
        ctx.config.retain_hot_ops,
        closed_now,
    )
    .await
    {
        tracing::warn!(error = %err, "segment rotation failed, will retry on next append");
    }

    if let Some(state) = ctx.app.get() {
        fanout::propagate_append(
            state.clone(),
            project_id.to_owned(),
            stream_id.to_owned(),
            req.body.clone(),
            is_json,
            end,
        );
    }

    Ok(AppendOutcome {
        status: AppendStatus::Accepted,
        next_offset: Offset::new(row.segment_start as u64, end as u64),
        closed: closed_now,
        write_timestamp_ms: now_ms(),
    })
}

async fn handle_delete(ctx: &ActorContext, project_id: &str, stream_id: &str) -> Result<(), ApiError> {
    let mut tx = ctx.pool.begin().await?;
    let keys = segments::list_blob_keys(&mut tx, project_id, stream_id).await?;
    for key in keys {
        if let Err(err) = ctx.blob.delete_segment(&object_store::path::Path::from(key.clone())).await {
            tracing::warn!(key, error = %err, "best-effort segment delete failed");
        }
    }
    segments::delete_admin_index(&mut tx, project_id, stream_id).await?;
    streams::delete(&mut tx, project_id, stream_id).await?;
    tx.commit().await?;
    Ok(())
}

async fn handle_head(ctx: &ActorContext, project_id: &str, stream_id: &str) -> Result<HeadOutcome, ApiError> {
    let mut tx = ctx.pool.begin().await?;
    let Some(row) = streams::fetch(&mut tx, project_id, stream_id).await? else {
        return Err(ApiError::NotFound("stream not found".into()));
    };
    Ok(HeadOutcome {
        content_type: row.content_type.clone(),
        closed: row.closed,
        public: row.public,
        next_offset: Offset::new(row.segment_start as u64, row.tail_offset as u64),
    })
}

async fn read_at(ctx: &ActorContext, project_id: &str, stream_id: &str, row: &StreamRow, offset: i64, max_chunk_bytes: usize) -> Result<ReadOutcome, ApiError> {
    let is_json = is_json_content_type(&row.content_type);
    if offset >= row.segment_start {
        let mut tx = ctx.pool.begin().await?;
        let rows = hot_ops::fetch_from(&mut tx, project_id, stream_id, offset, max_chunk_bytes as i64).await?;
        let consumed = rows.last().map(|r| r.end_offset - offset).unwrap_or(0);
        let write_ts = rows.iter().map(|r| r.created_at.timestamp_millis()).max();
        let body = framing::frame_hot_ops(&rows, is_json, offset);
        let next = offset + consumed;
        let up_to_date = next == row.tail_offset;
        Ok(ReadOutcome {
            body,
            is_json,
            next_offset: Offset::new(row.segment_start as u64, next as u64),
            up_to_date,
            closed_at_tail: row.closed && up_to_date,
            write_timestamp_ms: write_ts,
            truncated: false,
        })
    } else {
        let cold = rotation::read_from_segment(&ctx.pool, &ctx.blob, project_id, stream_id, offset, max_chunk_bytes, is_json).await?;
        let next = offset + cold.consumed;
        let up_to_date = next == row.tail_offset;
        Ok(ReadOutcome {
            body: cold.body,
            is_json,
            next_offset: Offset::new(row.segment_start as u64, next as u64),
            up_to_date,
            closed_at_tail: row.closed && up_to_date,
            write_timestamp_ms: None,
            truncated: cold.truncated,
        })
    }
}

async fn handle_read(
    ctx: &ActorContext,
    project_id: &str,
    stream_id: &str,
    req: ReadRequest,
    reply: oneshot::Sender<Result<ReadOutcome, ApiError>>,
    waiters: &mut WaiterRegistry,
) {
    let row = match ctx.pool.begin().await {
        Ok(mut tx) => streams::fetch(&mut tx, project_id, stream_id).await,
        Err(e) => Err(e),
    };
    let row = match row {
        Ok(Some(row)) => row,
        Ok(None) => {
            let _ = reply.send(Err(ApiError::NotFound("stream not found".into())));
            return;
        }
        Err(e) => {
            let _ = reply.send(Err(e.into()));
            return;
        }
    };

    let offset = match req.offset {
        RequestedOffset::Start => 0,
        RequestedOffset::Tail => row.tail_offset,
        RequestedOffset::Literal(o) => o.value as i64,
    };
    if offset > row.tail_offset {
        let _ = reply.send(Err(ApiError::Validation("offset exceeds stream tail".into())));
        return;
    }

    let outcome = match read_at(ctx, project_id, stream_id, &row, offset, req.max_chunk_bytes).await {
        Ok(o) => o,
        Err(e) => {
            let _ = reply.send(Err(e));
            return;
        }
    };

    let has_data = outcome.next_offset.value as i64 != offset;
    let timeout = match req.wait {
        ReadWait::None => None,
        ReadWait::Suspend(_) if has_data || outcome.closed_at_tail => None,
        ReadWait::Suspend(timeout) => Some(timeout),
    };
    let Some(timeout) = timeout else {
        let _ = reply.send(Ok(outcome));
        return;
    };

    let id = waiters.register(offset, row.segment_start, req.max_chunk_bytes, reply);
    let self_key = format!("{project_id}/{stream_id}");
    if let Some(state) = ctx.app.get() {
        let state = state.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(tx) = state.actors.peek(&self_key).await {
                let _ = tx.send(StreamCommand::WaiterExpired(id)).await;
            }
        });
    }
}

async fn wake_waiters(ctx: &ActorContext, project_id: &str, stream_id: &str, waiters: &mut WaiterRegistry, new_tail: i64) {
    for w in waiters.drain_satisfied(new_tail) {
        let row = match ctx.pool.begin().await {
            Ok(mut tx) => streams::fetch(&mut tx, project_id, stream_id).await,
            Err(e) => Err(e),
        };
        let outcome = match row {
            Ok(Some(row)) => read_at(ctx, project_id, stream_id, &row, w.expected_offset, w.max_chunk_bytes).await,
            Ok(None) => Err(ApiError::NotFound("stream not found".into())),
            Err(e) => Err(e.into()),
        };
        let _ = w.reply.send(outcome);
    }
}

async fn handle_subscribe(ctx: &ActorContext, project_id: &str, stream_id: &str, _source_key: &str, source_content_type: &str) -> Result<(), ApiError> {
    let mut tx = ctx.pool.begin().await?;
    match streams::fetch(&mut tx, project_id, stream_id).await? {
        Some(row) => {
            if row.content_type != source_content_type {
                return Err(ApiError::Conflict("estuary target has a mismatching content type".into()));
            }
        }
        None => {
            streams::insert(&mut tx, project_id, stream_id, source_content_type, false, None).await?;
        }
    }
    tx.commit().await?;
    Ok(())
}

async fn handle_touch(ctx: &ActorContext, project_id: &str, stream_id: &str, ttl_seconds: Option<i64>) -> Result<(), ApiError> {
    let mut tx = ctx.pool.begin().await?;
    match streams::fetch(&mut tx, project_id, stream_id).await? {
        Some(_) => {
            streams::touch_ttl(&mut tx, project_id, stream_id, ttl_seconds).await?;
        }
        None => {
            streams::insert(&mut tx, project_id, stream_id, "application/json", false, ttl_seconds).await?;
        }
    }
    tx.commit().await?;
    Ok(())
}

async fn handle_inspect(ctx: &ActorContext, project_id: &str, stream_id: &str) -> Result<InspectOutcome, ApiError> {
    let mut tx = ctx.pool.begin().await?;
    let exists = streams::fetch(&mut tx, project_id, stream_id).await?.is_some();
    let target_key = format!("{project_id}/{stream_id}");
    let sources = crate::repo::subscriptions::subscriptions_of(&mut tx, project_id, &target_key).await?;
    Ok(InspectOutcome { exists, sources })
}
