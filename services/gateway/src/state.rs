use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::OnceCell;

use crate::actor::{ActorContext, ActorRegistry};
use crate::auth::ProjectCache;
use crate::blob::BlobStore;
use crate::config::Config;

/// Shared application state handed to every route. Holds the actor
/// registry by value so cloning `AppState` (axum's `with_state` requires
/// `Clone`) is just a handful of `Arc` bumps.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub blob: BlobStore,
    pub config: Arc<Config>,
    pub projects: ProjectCache,
    pub actors: ActorRegistry,
}

impl AppState {
    /// Builds the full `AppState`, including the actor registry, then
    /// publishes itself into `app_cell` so stream actors can reach back
    /// into `state.actors` for fan-out dispatch without a literal
    /// ownership cycle between `AppState` and `ActorRegistry`.
    pub fn new(
        pool: PgPool,
        blob: BlobStore,
        config: Arc<Config>,
        app_cell: Arc<OnceCell<AppState>>,
    ) -> Self {
        let projects = ProjectCache::new(config.project_cache_ttl);
        let ctx = ActorContext {
            pool: pool.clone(),
            blob: blob.clone(),
            config: config.clone(),
            app: app_cell,
        };
        Self {
            pool,
            blob,
            config,
            projects,
            actors: ActorRegistry::new(ctx),
        }
    }
}
