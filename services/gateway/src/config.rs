use std::env;
use std::time::Duration;

/// Runtime configuration, gathered from environment variables at startup.
/// Every limit named in spec §5 has a default matching the spec and an env
/// override, mirroring how `LOG_LEVEL`/`BIND_ADDR` already work.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub blob_store_url: String,
    pub segment_max_messages: i64,
    pub segment_max_bytes: i64,
    pub max_append_body_bytes: usize,
    pub max_chunk_bytes: usize,
    pub long_poll_timeout: Duration,
    pub sse_keepalive_interval: Duration,
    pub producer_ttl: chrono::Duration,
    pub project_cache_ttl: Duration,
    pub actor_idle_timeout: Duration,
    pub retain_hot_ops: bool,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned()),
            blob_store_url: env::var("BLOB_STORE_URL")
                .unwrap_or_else(|_| "memory://".to_owned()),
            segment_max_messages: env_or("SEGMENT_MAX_MESSAGES", 1000),
            segment_max_bytes: env_or("SEGMENT_MAX_BYTES", 4 * 1024 * 1024),
            max_append_body_bytes: env_or("MAX_APPEND_BODY_BYTES", 8 * 1024 * 1024),
            max_chunk_bytes: env_or("MAX_CHUNK_BYTES", 256 * 1024),
            long_poll_timeout: Duration::from_millis(env_or("LONG_POLL_TIMEOUT_MS", 4000)),
            sse_keepalive_interval: Duration::from_secs(env_or("SSE_KEEPALIVE_SECS", 55)),
            producer_ttl: chrono::Duration::seconds(env_or("PRODUCER_TTL_SECS", 7 * 24 * 3600)),
            project_cache_ttl: Duration::from_secs(env_or("PROJECT_CACHE_TTL_SECS", 5)),
            actor_idle_timeout: Duration::from_secs(env_or("ACTOR_IDLE_TIMEOUT_SECS", 300)),
            retain_hot_ops: env_or("RETAIN_HOT_OPS", false),
        }
    }
}
