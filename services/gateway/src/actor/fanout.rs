//! Fan-out / estuary subsystem (spec §4.6): subscription edges live in the
//! `subscriptions` table rather than as in-memory actor state, since the
//! edge table's primary key already gives us idempotent add/remove without
//! a dedicated actor role. Propagation and target lifecycle still funnel
//! through the target's own stream actor, which is the sole owner of that
//! stream's metadata.

use bytes::Bytes;
use tracing::warn;

use crate::http::response::ApiError;
use crate::repo::subscriptions;
use crate::state::AppState;

use super::messages::{AppendRequest, ProducerHeader, StreamCommand};
use super::registry::{split_stream_key, stream_key};

pub async fn subscribe(
    state: &AppState,
    project_id: &str,
    source_stream_id: &str,
    estuary_id: &str,
    source_content_type: &str,
) -> Result<(), ApiError> {
    let source_key = stream_key(project_id, source_stream_id);
    let target_key = stream_key(project_id, estuary_id);

    let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
    let tx = state.actors.get_or_spawn(&target_key).await;
    tx.send(StreamCommand::Subscribe {
        source_key: source_key.clone(),
        source_content_type: source_content_type.to_owned(),
        reply: reply_tx,
    })
    .await
    .map_err(|_| ApiError::Internal(anyhow::anyhow!("target actor mailbox closed")))?;
    reply_rx
        .await
        .map_err(|_| ApiError::Internal(anyhow::anyhow!("target actor dropped reply")))??;

    let mut conn = state.pool.begin().await?;
    subscriptions::add_edge(&mut conn, project_id, &source_key, &target_key).await?;
    conn.commit().await?;
    Ok(())
}

pub async fn unsubscribe(
    state: &AppState,
    project_id: &str,
    source_stream_id: &str,
    estuary_id: &str,
) -> Result<(), ApiError> {
    let source_key = stream_key(project_id, source_stream_id);
    let target_key = stream_key(project_id, estuary_id);

    let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
    let tx = state.actors.get_or_spawn(&target_key).await;
    tx.send(StreamCommand::Unsubscribe {
        source_key: source_key.clone(),
        reply: reply_tx,
    })
    .await
    .map_err(|_| ApiError::Internal(anyhow::anyhow!("target actor mailbox closed")))?;
    reply_rx
        .await
        .map_err(|_| ApiError::Internal(anyhow::anyhow!("target actor dropped reply")))??;

    let mut conn = state.pool.begin().await?;
    subscriptions::remove_edge(&mut conn, project_id, &source_key, &target_key).await?;
    conn.commit().await?;
    Ok(())
}

pub async fn touch(
    state: &AppState,
    project_id: &str,
    estuary_id: &str,
    ttl_seconds: Option<i64>,
) -> Result<(), ApiError> {
    let target_key = stream_key(project_id, estuary_id);
    let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
    let tx = state.actors.get_or_spawn(&target_key).await;
    tx.send(StreamCommand::Touch {
        ttl_seconds,
        reply: reply_tx,
    })
    .await
    .map_err(|_| ApiError::Internal(anyhow::anyhow!("target actor mailbox closed")))?;
    reply_rx
        .await
        .map_err(|_| ApiError::Internal(anyhow::anyhow!("target actor dropped reply")))??;
    Ok(())
}

pub async fn inspect(
    state: &AppState,
    project_id: &str,
    estuary_id: &str,
) -> Result<super::messages::InspectOutcome, ApiError> {
    let target_key = stream_key(project_id, estuary_id);
    let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
    let tx = state.actors.get_or_spawn(&target_key).await;
    tx.send(StreamCommand::Inspect(reply_tx))
        .await
        .map_err(|_| ApiError::Internal(anyhow::anyhow!("target actor mailbox closed")))?;
    reply_rx
        .await
        .map_err(|_| ApiError::Internal(anyhow::anyhow!("target actor dropped reply")))?
}

pub async fn delete_target(state: &AppState, project_id: &str, estuary_id: &str) -> Result<(), ApiError> {
    let target_key = stream_key(project_id, estuary_id);
    let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
    let tx = state.actors.get_or_spawn(&target_key).await;
    tx.send(StreamCommand::Delete(reply_tx))
        .await
        .map_err(|_| ApiError::Internal(anyhow::anyhow!("target actor mailbox closed")))?;
    reply_rx
        .await
        .map_err(|_| ApiError::Internal(anyhow::anyhow!("target actor dropped reply")))??;

    let mut conn = state.pool.begin().await?;
    subscriptions::remove_all_for_target(&mut conn, project_id, &target_key).await?;
    conn.commit().await?;
    Ok(())
}

/// Called by the source actor after a local append commit (spec §4.6
/// "Publish-by-append"). Best-effort and fire-and-forget: failures to
/// individual targets never surface to the source writer.
pub fn propagate_append(
    state: AppState,
    project_id: String,
    source_stream_id: String,
    body: Bytes,
    is_json: bool,
    source_tail: i64,
) {
    tokio::spawn(async move {
        let source_key = stream_key(&project_id, &source_stream_id);
        let targets = match subscriptions::subscribers_of(
            &mut match state.pool.begin().await {
                Ok(tx) => tx,
                Err(err) => {
                    warn!(error = %err, "fan-out: failed to open transaction for subscriber lookup");
                    return;
                }
            },
            &project_id,
            &source_key,
        )
        .await
        {
            Ok(targets) => targets,
            Err(err) => {
                warn!(error = %err, "fan-out: failed to list subscribers");
                return;
            }
        };
        if targets.is_empty() {
            return;
        }

        let content_type = if is_json { "application/json" } else { "application/octet-stream" };
        for target_key in targets {
            let Some((target_project, target_stream)) = split_stream_key(&target_key) else {
                continue;
            };
            if target_project != project_id {
                continue;
            }
            let tx = state.actors.get_or_spawn(&target_key).await;
            let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
            let req = AppendRequest {
                body: body.clone(),
                producer: Some(ProducerHeader {
                    producer_id: format!("estuary:{source_key}"),
                    epoch: 0,
                    seq: source_tail,
                }),
                stream_seq: None,
                close: false,
            };
            if tx.send(StreamCommand::Append(req, reply_tx)).await.is_err() {
                warn!(target = %target_stream, "fan-out: target actor mailbox closed");
                continue;
            }
            if let Ok(Err(err)) = reply_rx.await {
                warn!(target = %target_stream, error = %err, "fan-out: target append failed");
            }
        }
    });
}
