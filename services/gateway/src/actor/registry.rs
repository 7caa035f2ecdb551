//! Lazy-spawn, idle-evicting registry of stream actors (spec §9 "per-stream
//! serialization"): one mailbox per `(projectId, streamId)`, created on
//! first use and torn down after a period of inactivity.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use super::messages::StreamCommand;
use super::stream_actor::{self, ActorContext};

#[derive(Clone)]
pub struct ActorRegistry {
    senders: Arc<RwLock<HashMap<String, mpsc::Sender<StreamCommand>>>>,
    ctx: ActorContext,
}

/// Stream key shared with the blob-store layout: `"{projectId}/{streamId}"`.
pub fn stream_key(project_id: &str, stream_id: &str) -> String {
    format!("{project_id}/{stream_id}")
}

pub fn split_stream_key(key: &str) -> Option<(&str, &str)> {
    key.split_once('/')
}

impl ActorRegistry {
    pub fn new(ctx: ActorContext) -> Self {
        Self {
            senders: Arc::new(RwLock::new(HashMap::new())),
            ctx,
        }
    }

    /// Looks up a currently-live actor's mailbox without spawning one.
    /// Used by deadline timers, which must not resurrect an actor that has
    /// already idled out just to deliver a now-meaningless expiry.
    pub async fn peek(&self, key: &str) -> Option<mpsc::Sender<StreamCommand>> {
        self.senders.read().await.get(key).cloned()
    }

    pub async fn get_or_spawn(&self, key: &str) -> mpsc::Sender<StreamCommand> {
        if let Some(tx) = self.senders.read().await.get(key) {
            return tx.clone();
        }
        let mut map = self.senders.write().await;
        if let Some(tx) = map.get(key) {
            return tx.clone();
        }
        let (tx, rx) = mpsc::channel(256);
        map.insert(key.to_owned(), tx.clone());
        drop(map);

        let registry = self.clone();
        let key_owned = key.to_owned();
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            stream_actor::run(key_owned.clone(), rx, ctx).await;
            registry.evict_if_current(&key_owned, &tx).await;
        });
        self.senders.read().await.get(key).cloned().unwrap()
    }

    async fn evict_if_current(&self, key: &str, finished: &mpsc::Sender<StreamCommand>) {
        let mut map = self.senders.write().await;
        if let Some(current) = map.get(key) {
            if current.same_channel(finished) {
                map.remove(key);
            }
        }
    }
}
