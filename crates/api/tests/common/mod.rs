#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use cronhub_api::config::{ServerConfig, WorkerProtocolConfig};
use cronhub_api::router::build_app_router;
use cronhub_api::state::AppState;
use cronhub_api::ws::SessionRegistry;
use cronhub_db::store::memory::MemoryCredentialStore;
use cronhub_db::Stores;

/// Build a test `ServerConfig` with safe defaults and fast drip-feed pauses.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        database_url: None,
        worker_api_keys: Vec::new(),
        protocol: WorkerProtocolConfig {
            dispatch_batch_pause: Duration::from_millis(5),
            ..WorkerProtocolConfig::default()
        },
    }
}

/// In-memory application state plus the credential store behind it, so
/// tests can mint worker keys.
pub struct TestContext {
    pub state: AppState,
    pub credentials: Arc<MemoryCredentialStore>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        let credentials = Arc::new(MemoryCredentialStore::default());
        let stores = Stores::in_memory(Arc::clone(&credentials));
        let state = AppState::new(stores, config, Arc::new(SessionRegistry::new()));
        Self { state, credentials }
    }

    /// The full router with the production middleware stack.
    pub fn app(&self) -> Router {
        build_app_router(self.state.clone())
    }
}

/// Serve the app on an ephemeral local port for WebSocket tests.
pub async fn spawn_server(ctx: &TestContext) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = ctx.app();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// POST and assert the status in one step, returning the body.
pub async fn post_expect(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    expected: StatusCode,
) -> serde_json::Value {
    let response = post_json(app, uri, body).await;
    let status = response.status();
    let json = body_json(response).await;
    assert_eq!(status, expected, "unexpected status for POST {uri}: {json}");
    json
}

/// Poll `check` every 10ms until it returns true or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
