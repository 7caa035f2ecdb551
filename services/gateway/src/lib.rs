pub mod actor;
pub mod auth;
pub mod blob;
pub mod config;
pub mod db;
pub mod http;
pub mod repo;
pub mod state;

pub use config::Config;
pub use state::AppState;

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};

/// Assembles the full `/v1` surface (spec §4.7's route table) plus
/// unauthenticated liveness probes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route(
            "/v1/stream/:project_id/:stream_id",
            get(http::streams::read_stream)
                .put(http::streams::put_stream)
                .post(http::streams::append_stream)
                .head(http::streams::head_stream)
                .delete(http::streams::delete_stream)
                .options(http::cors::stream_preflight),
        )
        .route(
            "/v1/estuary/subscribe/:project_id/:source_stream_id",
            axum::routing::post(http::estuary::subscribe)
                .delete(http::estuary::unsubscribe)
                .options(http::cors::estuary_subscribe_preflight),
        )
        .route(
            "/v1/estuary/:project_id/:estuary_id",
            axum::routing::post(http::estuary::touch)
                .get(http::estuary::inspect)
                .delete(http::estuary::delete)
                .options(http::cors::estuary_target_preflight),
        )
        .route(
            "/v1/config/:project_id",
            get(http::config::get_config)
                .put(http::config::put_config)
                .options(http::cors::config_preflight),
        )
        .fallback(fallback_404)
        .with_state(state)
}

async fn fallback_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}

mod health {
    use axum::response::IntoResponse;
    pub async fn healthz() -> impl IntoResponse {
        "ok"
    }
    pub async fn readyz() -> impl IntoResponse {
        "ok"
    }
}
