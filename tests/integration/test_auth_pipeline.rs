//! Integration tests for the request pipeline: bearer attachment, the
//! no-auth allow-list and single-flight token refresh.
//!
//! Every test runs the real reqwest client against an axum mock backend.

mod common;

use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use campus_client::{ApiClient, CourseFilter};
use campus_session::TokenStore;
use common::{bearer, client_for, signed_in, spawn_backend};
use futures::future::join_all;
use serde_json::{json, Value};

const COURSES: &str = "/api/courses/";
const REFRESH: &str = "/api/token/refresh/";

/// Courses endpoint that only accepts the `fresh` token.
async fn courses_for_fresh(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if bearer(&headers) == Some("fresh") {
        (StatusCode::OK, Json(json!([{"id": 1, "title": "Rust 101"}])))
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Given token not valid for any token type"})),
        )
    }
}

/// Refresh endpoint that succeeds slowly so that concurrent 401s overlap.
async fn slow_refresh(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    tokio::time::sleep(Duration::from_millis(150)).await;
    if body["refresh"] == "r1" {
        (StatusCode::OK, Json(json!({"access": "fresh"})))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"detail": "bad refresh"})))
    }
}

/// Refresh endpoint that always rejects.
async fn rejecting_refresh() -> (StatusCode, Json<Value>) {
    tokio::time::sleep(Duration::from_millis(100)).await;
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "Token is invalid or expired"})),
    )
}

async fn list_all(client: &ApiClient) -> campus_client::Result<Vec<campus_client::Course>> {
    client.list_courses(&CourseFilter::default()).await
}

// ============================================================================
// Bearer attachment
// ============================================================================

/// Tests that protected requests carry the stored token and allow-listed
/// ones never do.
#[tokio::test]
async fn test_bearer_attached_except_on_allow_listed_paths() {
    let router = Router::new()
        .route(COURSES, get(courses_for_fresh))
        .route(
            "/api/auth/password/reset/",
            post(|| async { Json(json!({"detail": "Password reset e-mail has been sent."})) }),
        );
    let (base, log) = spawn_backend(router).await;
    let client = client_for(&base, signed_in("fresh", Some("r1")));

    client
        .request_password_reset("ada@example.edu")
        .await
        .expect("reset request failed");
    let courses = list_all(&client).await.expect("listing failed");

    assert_eq!(courses.len(), 1);
    assert_eq!(log.auth_for("/api/auth/password/reset/"), vec![None]);
    assert_eq!(log.auth_for(COURSES), vec![Some("Bearer fresh".to_string())]);
    assert_eq!(log.hits(REFRESH), 0);
}

/// Tests that a 401 from an allow-listed endpoint is returned as-is.
#[tokio::test]
async fn test_public_401_does_not_refresh() {
    let router = Router::new()
        .route(
            "/api/auth/login/",
            post(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"detail": "No active account found with the given credentials"})),
                )
            }),
        )
        .route(REFRESH, post(slow_refresh));
    let (base, log) = spawn_backend(router).await;
    let client = client_for(&base, signed_in("stale", Some("r1")));

    let err = client
        .login("ada@example.edu", "wrong-password")
        .await
        .expect_err("login should fail");

    assert_eq!(err.status(), Some(401));
    assert_eq!(
        err.detail(),
        Some("No active account found with the given credentials")
    );
    assert_eq!(log.hits(REFRESH), 0);
    assert_eq!(log.auth_for("/api/auth/login/"), vec![None]);
}

// ============================================================================
// Refresh
// ============================================================================

/// Tests that concurrent 401s share exactly one refresh call and all
/// succeed with the renewed token.
#[tokio::test]
async fn test_concurrent_401s_trigger_single_refresh() {
    let router = Router::new()
        .route(COURSES, get(courses_for_fresh))
        .route(REFRESH, post(slow_refresh));
    let (base, log) = spawn_backend(router).await;
    let client = client_for(&base, signed_in("stale", Some("r1")));

    let results = join_all((0..8).map(|_| list_all(&client))).await;

    for result in &results {
        let courses = result.as_ref().expect("request should succeed after refresh");
        assert_eq!(courses[0].title, "Rust 101");
    }
    assert_eq!(log.hits(REFRESH), 1, "refresh must be single-flight");
    assert_eq!(client.tokens().bearer().as_deref(), Some("fresh"));
    assert!(!client.is_refreshing());

    let replays = log
        .auth_for(COURSES)
        .into_iter()
        .filter(|auth| auth.as_deref() == Some("Bearer fresh"))
        .count();
    assert_eq!(replays, 8);
}

/// Tests that a failed refresh signs the user out and surfaces the
/// original 401 to every waiting request.
#[tokio::test]
async fn test_refresh_failure_clears_auth() {
    let router = Router::new()
        .route(COURSES, get(courses_for_fresh))
        .route(REFRESH, post(rejecting_refresh));
    let (base, log) = spawn_backend(router).await;
    let tokens = signed_in("stale", Some("r1"));
    tokens
        .cache_me(&json!({"id": "u1"}))
        .expect("cache me");
    let client = client_for(&base, tokens);

    let results = join_all((0..4).map(|_| list_all(&client))).await;

    for result in results {
        let err = result.expect_err("request should fail");
        assert_eq!(err.status(), Some(401));
        assert_eq!(
            err.detail(),
            Some("Given token not valid for any token type")
        );
    }
    assert_eq!(log.hits(REFRESH), 1);
    assert_eq!(client.tokens().bearer(), None);
    assert_eq!(client.tokens().refresh_token(), None);
    assert_eq!(client.tokens().cached_me::<Value>(), None);
}

/// Tests that without a refresh token the 401 is returned directly.
#[tokio::test]
async fn test_no_refresh_token_returns_401() {
    let router = Router::new()
        .route(COURSES, get(courses_for_fresh))
        .route(REFRESH, post(slow_refresh));
    let (base, log) = spawn_backend(router).await;
    let tokens = TokenStore::in_memory();
    tokens.set_access("stale").expect("set access");
    let client = client_for(&base, tokens);

    let err = list_all(&client).await.expect_err("request should fail");

    assert_eq!(err.status(), Some(401));
    assert!(err.is_auth_failure());
    assert_eq!(log.hits(REFRESH), 0);
    assert_eq!(log.hits(COURSES), 1);
}

/// Tests that a request is replayed at most once even if the renewed
/// token is rejected too.
#[tokio::test]
async fn test_replay_happens_at_most_once() {
    let router = Router::new()
        .route(
            COURSES,
            get(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"detail": "Authentication credentials were not provided."})),
                )
            }),
        )
        .route(REFRESH, post(slow_refresh));
    let (base, log) = spawn_backend(router).await;
    let client = client_for(&base, signed_in("stale", Some("r1")));

    let err = list_all(&client).await.expect_err("request should fail");

    assert_eq!(err.status(), Some(401));
    assert_eq!(log.hits(REFRESH), 1);
    assert_eq!(
        log.auth_for(COURSES),
        vec![
            Some("Bearer stale".to_string()),
            Some("Bearer fresh".to_string())
        ]
    );
}

/// Tests that later requests use the renewed token without refreshing
/// again.
#[tokio::test]
async fn test_sequential_requests_after_refresh_use_new_token() {
    let router = Router::new()
        .route(COURSES, get(courses_for_fresh))
        .route(REFRESH, post(slow_refresh));
    let (base, log) = spawn_backend(router).await;
    let client = client_for(&base, signed_in("stale", Some("r1")));

    list_all(&client).await.expect("first request");
    list_all(&client).await.expect("second request");

    assert_eq!(log.hits(REFRESH), 1);
    assert_eq!(
        log.auth_for(COURSES),
        vec![
            Some("Bearer stale".to_string()),
            Some("Bearer fresh".to_string()),
            Some("Bearer fresh".to_string())
        ]
    );
}

/// Tests that a 401 caused by a token that was replaced while the request
/// was in flight is replayed with the current token and no refresh.
#[tokio::test]
async fn test_replaced_token_replays_without_refresh() {
    let tokens = signed_in("stale", Some("r1"));
    let renewed_elsewhere = tokens.clone();
    let router = Router::new()
        .route(
            COURSES,
            get(move |headers: HeaderMap| {
                let renewed_elsewhere = renewed_elsewhere.clone();
                async move {
                    if bearer(&headers) == Some("stale") {
                        // Another caller stores a renewed token before this 401 lands
                        renewed_elsewhere.set_access("fresh").expect("set access");
                    }
                    courses_for_fresh(headers).await
                }
            }),
        )
        .route(REFRESH, post(slow_refresh));
    let (base, log) = spawn_backend(router).await;
    let client = client_for(&base, tokens);

    let courses = list_all(&client).await.expect("request should be replayed");

    assert_eq!(courses[0].title, "Rust 101");
    assert_eq!(log.hits(REFRESH), 0);
    assert_eq!(
        log.auth_for(COURSES),
        vec![
            Some("Bearer stale".to_string()),
            Some("Bearer fresh".to_string())
        ]
    );
    assert_eq!(client.tokens().refresh_token().as_deref(), Some("r1"));
}
