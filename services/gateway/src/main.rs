use std::sync::Arc;

use gateway::{db, AppState, Config};
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::ObjectStore;
use tokio::sync::OnceCell;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let config = Arc::new(Config::from_env());

    info!("connecting to database...");
    let pool = db::create_pool(&config.database_url).await;
    db::run_migrations(&pool).await;
    info!("migrations applied");

    let blob = gateway::blob::BlobStore::new(build_object_store(&config.blob_store_url));

    let app_cell: Arc<OnceCell<AppState>> = Arc::new(OnceCell::new());
    let state = AppState::new(pool, blob, config.clone(), app_cell.clone());
    app_cell
        .set(state.clone())
        .unwrap_or_else(|_| unreachable!("app cell set exactly once, before any actor runs"));

    let router = gateway::build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind");
    info!(addr = %config.bind_addr, "server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
    info!("server shut down gracefully");
}

/// `memory://` and `file://<path>` are supported directly; anything else is
/// a configuration error rather than a silent fallback to in-memory storage.
fn build_object_store(url: &str) -> Arc<dyn ObjectStore> {
    if url == "memory://" {
        return Arc::new(InMemory::new());
    }
    if let Some(path) = url.strip_prefix("file://") {
        return Arc::new(
            LocalFileSystem::new_with_prefix(path).expect("failed to open local blob directory"),
        );
    }
    panic!("unsupported BLOB_STORE_URL scheme: {url} (expected memory:// or file://<path>)");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
