use std::time::Duration;

use cronhub_core::framer::FrameBoundary;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long to wait for worker sessions to drain on shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Postgres connection string. Unset means in-memory stores.
    pub database_url: Option<String>,
    /// Plaintext worker keys accepted when running without a database.
    pub worker_api_keys: Vec<String>,
    /// Worker dispatch connection settings.
    pub protocol: WorkerProtocolConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    /// | `DATABASE_URL`         | unset (in-memory stores)   |
    /// | `WORKER_API_KEYS`      | empty                      |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins = split_list(
            &std::env::var("CORS_ORIGINS").unwrap_or_else(|_| "http://localhost:5173".into()),
        );

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let worker_api_keys = split_list(&std::env::var("WORKER_API_KEYS").unwrap_or_default());

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            database_url,
            worker_api_keys,
            protocol: WorkerProtocolConfig::from_env(),
        }
    }
}

/// Settings for worker dispatch connections.
#[derive(Debug, Clone)]
pub struct WorkerProtocolConfig {
    /// Frame delimiter. `None` selects JSON object boundary detection.
    pub frame_delimiter: Option<String>,
    /// Pending tasks pushed per batch when a worker connects.
    pub dispatch_batch_size: usize,
    /// Pause between drip-feed batches.
    pub dispatch_batch_pause: Duration,
    /// Interval between server Ping frames.
    pub heartbeat_interval: Duration,
    /// Decoded frames a session may queue before its read loop waits.
    pub event_queue_depth: usize,
    /// Lease length of the `task:{id}` cancel/claim guard.
    pub task_lock_ttl: Duration,
}

impl WorkerProtocolConfig {
    /// | Env Var                      | Default |
    /// |------------------------------|---------|
    /// | `WS_FRAME_DELIMITER`         | unset   |
    /// | `WS_DISPATCH_BATCH_SIZE`     | `10`    |
    /// | `WS_DISPATCH_BATCH_PAUSE_MS` | `100`   |
    /// | `WS_HEARTBEAT_INTERVAL_SECS` | `30`    |
    /// | `WS_EVENT_QUEUE_DEPTH`       | `256`   |
    /// | `TASK_LOCK_TTL_SECS`         | `10`    |
    pub fn from_env() -> Self {
        let frame_delimiter = std::env::var("WS_FRAME_DELIMITER")
            .ok()
            .filter(|d| !d.is_empty());

        let dispatch_batch_size: usize = std::env::var("WS_DISPATCH_BATCH_SIZE")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .expect("WS_DISPATCH_BATCH_SIZE must be a valid usize");

        let dispatch_batch_pause_ms: u64 = std::env::var("WS_DISPATCH_BATCH_PAUSE_MS")
            .unwrap_or_else(|_| "100".into())
            .parse()
            .expect("WS_DISPATCH_BATCH_PAUSE_MS must be a valid u64");

        let heartbeat_interval_secs: u64 = std::env::var("WS_HEARTBEAT_INTERVAL_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("WS_HEARTBEAT_INTERVAL_SECS must be a valid u64");

        let event_queue_depth: usize = std::env::var("WS_EVENT_QUEUE_DEPTH")
            .unwrap_or_else(|_| "256".into())
            .parse()
            .expect("WS_EVENT_QUEUE_DEPTH must be a valid usize");

        let task_lock_ttl_secs: u64 = std::env::var("TASK_LOCK_TTL_SECS")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .expect("TASK_LOCK_TTL_SECS must be a valid u64");

        assert!(dispatch_batch_size > 0, "WS_DISPATCH_BATCH_SIZE must be positive");
        assert!(event_queue_depth > 0, "WS_EVENT_QUEUE_DEPTH must be positive");
        assert!(heartbeat_interval_secs > 0, "WS_HEARTBEAT_INTERVAL_SECS must be positive");
        assert!(task_lock_ttl_secs > 0, "TASK_LOCK_TTL_SECS must be positive");

        Self {
            frame_delimiter,
            dispatch_batch_size,
            dispatch_batch_pause: Duration::from_millis(dispatch_batch_pause_ms),
            heartbeat_interval: Duration::from_secs(heartbeat_interval_secs),
            event_queue_depth,
            task_lock_ttl: Duration::from_secs(task_lock_ttl_secs),
        }
    }

    /// The frame boundary sessions read and write with.
    pub fn boundary(&self) -> FrameBoundary {
        FrameBoundary::from_delimiter(self.frame_delimiter.as_deref())
    }
}

impl Default for WorkerProtocolConfig {
    fn default() -> Self {
        Self {
            frame_delimiter: None,
            dispatch_batch_size: 10,
            dispatch_batch_pause: Duration::from_millis(100),
            heartbeat_interval: Duration::from_secs(30),
            event_queue_depth: 256,
            task_lock_ttl: Duration::from_secs(10),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
