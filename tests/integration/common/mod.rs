//! Shared helpers for the integration tests: a recording axum mock backend
//! and a client wired to it.

#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use campus_client::{ApiClient, ClientConfig};
use campus_session::{LoginTokens, TokenStore};

/// One request as seen by the mock backend.
#[derive(Debug, Clone)]
pub struct Seen {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
}

/// Requests received by the mock backend, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct RequestLog(Arc<Mutex<Vec<Seen>>>);

impl RequestLog {
    pub fn all(&self) -> Vec<Seen> {
        self.0.lock().expect("request log poisoned").clone()
    }

    /// Number of requests received for `path`.
    pub fn hits(&self, path: &str) -> usize {
        self.all().iter().filter(|s| s.path == path).count()
    }

    /// Authorization headers sent to `path`.
    pub fn auth_for(&self, path: &str) -> Vec<Option<String>> {
        self.all()
            .into_iter()
            .filter(|s| s.path == path)
            .map(|s| s.authorization)
            .collect()
    }
}

async fn record(State(log): State<RequestLog>, request: Request, next: Next) -> Response {
    let seen = Seen {
        method: request.method().to_string(),
        path: request.uri().path().to_string(),
        authorization: request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string),
    };
    log.0.lock().expect("request log poisoned").push(seen);
    next.run(request).await
}

/// Helper to find an available port for testing.
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// Spawns the mock backend and returns its base URL and request log.
pub async fn spawn_backend(router: Router) -> (String, RequestLog) {
    let log = RequestLog::default();
    let router = router.layer(middleware::from_fn_with_state(log.clone(), record));

    let port = find_available_port();
    let addr = format!("127.0.0.1:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://{addr}"), log)
}

/// Builds a client for `base` with in-memory token storage.
pub fn client_for(base: &str, tokens: TokenStore) -> ApiClient {
    let config = ClientConfig::default().with_api_base(base);
    ApiClient::new(config, tokens).expect("Failed to build client")
}

/// Token storage holding the given access and refresh tokens.
pub fn signed_in(access: &str, refresh: Option<&str>) -> TokenStore {
    let tokens = TokenStore::in_memory();
    tokens
        .store_login(&LoginTokens {
            access: access.to_string(),
            refresh: refresh.map(ToString::to_string),
        })
        .expect("Failed to store tokens");
    tokens
}

/// Returns the bearer token carried by an Authorization header value.
pub fn bearer(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}
