//! Integration tests for feature operations that depend on backend
//! behavior: sign-in, endpoint fallbacks and upserts.

mod common;

use std::collections::HashMap;

use axum::extract::{Multipart, Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, patch, post, put};
use axum::{Json, Router};
use campus_client::{
    ApiClient, BannerField, CertificateTemplate, ClientConfig, CourseUpdate, CourseVisibility,
    ItemId, Portal, Question, QuestionType, Quiz, ScoringItem, ScoringPayload, StatusField,
    UploadFile, UserMe,
};
use campus_session::TokenStore;
use common::{bearer, client_for, signed_in, spawn_backend};
use serde_json::{json, Value};

fn not_found() -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({"detail": "Not found."})))
}

/// One multipart field: name, file name and contents.
type Field = (String, Option<String>, Vec<u8>);

async fn read_fields(mut form: Multipart) -> Vec<Field> {
    let mut fields = Vec::new();
    while let Some(field) = form.next_field().await.expect("malformed multipart") {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(ToString::to_string);
        let bytes = field.bytes().await.expect("unreadable field").to_vec();
        fields.push((name, file_name, bytes));
    }
    fields
}

// ============================================================================
// Sign-in
// ============================================================================

/// Tests that login stores the tokens, caches the user and resolves the
/// portal from the role.
#[tokio::test]
async fn test_login_stores_tokens_and_resolves_portal() {
    let router = Router::new()
        .route(
            "/api/auth/login/",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["email"], "ada@example.edu");
                Json(json!({"access": "a1", "refresh": "r1"}))
            }),
        )
        .route(
            "/api/auth/user/",
            get(|headers: HeaderMap| async move {
                if bearer(&headers) == Some("a1") {
                    (
                        StatusCode::OK,
                        Json(json!({
                            "pk": 7,
                            "email": "ada@example.edu",
                            "first_name": "Ada",
                            "role": {"name": "instructor"},
                        })),
                    )
                } else {
                    (StatusCode::UNAUTHORIZED, Json(json!({"detail": "no"})))
                }
            }),
        );
    let (base, log) = spawn_backend(router).await;
    let client = client_for(&base, signed_in("old", Some("old-refresh")));

    let sign_in = client
        .login("  ada@example.edu ", "correct-horse")
        .await
        .expect("login failed");

    assert_eq!(sign_in.portal, Portal::Instructor);
    assert_eq!(sign_in.user.pk.as_deref(), Some("7"));
    assert_eq!(client.tokens().bearer().as_deref(), Some("a1"));
    assert_eq!(client.tokens().refresh_token().as_deref(), Some("r1"));
    let cached: Value = client.tokens().cached_me().expect("me not cached");
    assert_eq!(cached["email"], "ada@example.edu");
    assert_eq!(log.auth_for("/api/auth/login/"), vec![None]);
}

/// Tests that an expired stored session is dropped on restore.
#[tokio::test]
async fn test_restore_session_drops_rejected_tokens() {
    let router = Router::new().route(
        "/api/auth/user/",
        get(|| async { (StatusCode::UNAUTHORIZED, Json(json!({"detail": "expired"}))) }),
    );
    let (base, _log) = spawn_backend(router).await;
    let tokens = TokenStore::in_memory();
    tokens.set_access("expired").expect("set access");
    let client = client_for(&base, tokens);

    let restored = client.restore_session().await.expect("restore failed");

    assert!(restored.is_none());
    assert_eq!(client.tokens().cached_me::<Value>(), None);
}

// ============================================================================
// Current user fallback
// ============================================================================

/// Tests that `get_me` skips a 404 candidate and caches the normalized user.
#[tokio::test]
async fn test_get_me_skips_missing_endpoint() {
    let router = Router::new()
        .route("/api/auth/user/", get(|| async { not_found() }))
        .route(
            "/api/users/me/",
            get(|| async {
                Json(json!({
                    "pk": 12,
                    "email": "grace@example.edu",
                    "name": "Grace Hopper",
                    "university": {"id": 3, "name": "Campus U"},
                }))
            }),
        );
    let (base, log) = spawn_backend(router).await;
    let client = client_for(&base, signed_in("tok", None));

    let me = client.get_me().await.expect("get_me failed");

    assert_eq!(me.id, "12");
    assert_eq!(me.full_name, "Grace Hopper");
    assert_eq!(me.university.as_deref(), Some("Campus U"));
    assert_eq!(log.hits("/api/auth/user/"), 1);
    assert_eq!(log.hits("/api/instructor/me/"), 0);
    let cached: UserMe = client.tokens().cached_me().expect("me not cached");
    assert_eq!(cached, me);
}

/// Tests that `get_me` stops at the first 401.
#[tokio::test]
async fn test_get_me_stops_on_unauthorized() {
    let router = Router::new()
        .route("/api/auth/user/", get(|| async { not_found() }))
        .route(
            "/api/users/me/",
            get(|| async { (StatusCode::UNAUTHORIZED, Json(json!({"detail": "nope"}))) }),
        )
        .route(
            "/api/instructor/me/",
            get(|| async { Json(json!({"id": "should-not-be-reached"})) }),
        );
    let (base, log) = spawn_backend(router).await;
    let client = client_for(&base, signed_in("tok", None));

    let err = client.get_me().await.expect_err("get_me should fail");

    assert_eq!(err.status(), Some(401));
    assert_eq!(log.hits("/api/instructor/me/"), 0);
    assert_eq!(log.hits("/api/me/"), 0);
}

// ============================================================================
// Quiz upsert
// ============================================================================

fn sample_quiz() -> Quiz {
    Quiz {
        id: None,
        title: "Week 1".to_string(),
        questions: vec![Question {
            id: ItemId::generate(),
            kind: QuestionType::TrueFalse,
            title: "Rust has a garbage collector".to_string(),
            choices: Vec::new(),
            text_parts: vec![String::new()],
            correct_answers: vec!["false".to_string()],
            order: None,
        }],
    }
}

/// Tests that a quiz upsert falls back to POST when PUT answers 404.
#[tokio::test]
async fn test_quiz_upsert_falls_back_to_post() {
    let router = Router::new().route(
        "/api/courses/:id/quiz/",
        put(|| async { not_found() }).post(|Json(body): Json<Value>| async move {
            assert_eq!(body["questions"][0]["order"], 1);
            assert_eq!(body["questions"][0]["type"], "true-false");
            let mut saved = body;
            saved["id"] = json!(99);
            saved["questions"][0]["id"] = json!(501);
            (StatusCode::CREATED, Json(saved))
        }),
    );
    let (base, log) = spawn_backend(router).await;
    let client = client_for(&base, signed_in("tok", None));

    let saved = client
        .upsert_course_quiz("c1", &sample_quiz())
        .await
        .expect("upsert failed");

    assert_eq!(saved.id, Some(ItemId::Number(99)));
    assert_eq!(saved.questions[0].id, ItemId::Number(501));
    assert_eq!(saved.questions[0].order, Some(1));
    let methods: Vec<String> = log.all().into_iter().map(|s| s.method).collect();
    assert_eq!(methods, vec!["PUT", "POST"]);
}

/// Tests that other PUT failures are not retried as POST.
#[tokio::test]
async fn test_quiz_upsert_propagates_validation_errors() {
    let router = Router::new().route(
        "/api/courses/:id/quiz/",
        put(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"non_field_errors": ["Quiz must have a title"]})),
            )
        }),
    );
    let (base, log) = spawn_backend(router).await;
    let client = client_for(&base, signed_in("tok", None));

    let err = client
        .upsert_course_quiz("c1", &sample_quiz())
        .await
        .expect_err("upsert should fail");

    assert_eq!(err.status(), Some(400));
    assert_eq!(err.detail(), Some("Quiz must have a title"));
    assert_eq!(log.all().len(), 1);
}

// ============================================================================
// Assignments
// ============================================================================

/// Tests that `find_assignment` reads paginated results and only sends
/// UUID-shaped lesson ids.
#[tokio::test]
async fn test_find_assignment_with_paginated_results() {
    let router = Router::new().route(
        "/api/assignments/",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            let lesson = params.get("lesson").cloned();
            Json(json!({
                "count": 1,
                "results": [{
                    "id": 5,
                    "course": params.get("course").cloned().unwrap_or_default(),
                    "lesson": lesson,
                    "title": "Essay",
                    "attachments": [],
                }],
            }))
        }),
    );
    let (base, _log) = spawn_backend(router).await;
    let client = client_for(&base, signed_in("tok", None));

    let found = client
        .find_assignment("c1", Some("lesson-7"))
        .await
        .expect("find failed")
        .expect("no assignment");
    assert_eq!(found.id, "5");
    assert_eq!(found.course, "c1");
    assert_eq!(found.lesson, None);

    let lesson = "0b8f5a8e-3c1d-4b7a-9f2e-1a2b3c4d5e6f";
    let found = client
        .find_assignment("c1", Some(lesson))
        .await
        .expect("find failed")
        .expect("no assignment");
    assert_eq!(found.lesson.as_deref(), Some(lesson));
}

/// Tests that an empty list yields no assignment.
#[tokio::test]
async fn test_find_assignment_empty() {
    let router = Router::new().route("/api/assignments/", get(|| async { Json(json!([])) }));
    let (base, _log) = spawn_backend(router).await;
    let client = client_for(&base, signed_in("tok", None));

    let found = client.find_assignment("c1", None).await.expect("find failed");
    assert!(found.is_none());
}

// ============================================================================
// Documents and scoring
// ============================================================================

/// Tests that a forbidden instructor rename is retried on the admin path.
#[tokio::test]
async fn test_document_rename_falls_back_to_admin_path() {
    let router = Router::new()
        .route(
            "/api/instructor/documents/:id/",
            patch(|| async {
                (
                    StatusCode::FORBIDDEN,
                    Json(json!({"detail": "You do not own this document."})),
                )
            }),
        )
        .route(
            "/api/admin/documents/:id/",
            patch(|Json(body): Json<Value>| async move {
                assert_eq!(body, json!({"title": "Syllabus 2025"}));
                Json(json!({"id": 4, "title": "Syllabus 2025"}))
            }),
        );
    let (base, log) = spawn_backend(router).await;
    let client = client_for(&base, signed_in("tok", None));

    client
        .rename_document("4", "  Syllabus 2025 ")
        .await
        .expect("rename failed");

    assert_eq!(log.hits("/api/instructor/documents/4/"), 1);
    assert_eq!(log.hits("/api/admin/documents/4/"), 1);
}

/// Tests that scoring is created without item ids when none exists yet.
#[tokio::test]
async fn test_scoring_upsert_creates_when_missing() {
    let router = Router::new().route(
        "/api/courses/:id/scoring/",
        get(|| async { Json(json!({"id": null, "course": "c1", "pass_score": "0.00", "items": []})) })
            .post(|Json(body): Json<Value>| async move {
                assert!(body["items"][0].get("id").is_none());
                Json(json!({
                    "id": 1,
                    "course": "c1",
                    "pass_score": body["pass_score"],
                    "items": [{"id": 10, "description": "Quiz", "correct": 8, "incorrect": 2, "score": "80.00", "order": 1}],
                }))
            }),
    );
    let (base, log) = spawn_backend(router).await;
    let client = client_for(&base, signed_in("tok", None));

    let payload = ScoringPayload {
        pass_score: 60.0,
        items: vec![ScoringItem {
            id: Some("stale".to_string()),
            description: "Quiz".to_string(),
            correct: 8,
            incorrect: 2,
            score: 80.0,
            order: 1,
        }],
    };
    let scoring = client
        .upsert_course_scoring("c1", &payload)
        .await
        .expect("upsert failed");

    assert_eq!(scoring.id.as_deref(), Some("1"));
    assert!((scoring.pass_score - 60.0).abs() < f64::EPSILON);
    assert!((scoring.items[0].score - 80.0).abs() < f64::EPSILON);
    let methods: Vec<String> = log.all().into_iter().map(|s| s.method).collect();
    assert_eq!(methods, vec!["GET", "POST"]);
}

// ============================================================================
// Lookups
// ============================================================================

/// Tests that a 403 stops the endpoint fallback instead of trying the next
/// candidate.
#[tokio::test]
async fn test_lookup_fallback_stops_on_forbidden() {
    let router = Router::new()
        .route(
            "/api/categories/",
            get(|| async {
                (
                    StatusCode::FORBIDDEN,
                    Json(json!({"detail": "You do not have permission to perform this action."})),
                )
            }),
        )
        .route(
            "/api/course-categories/",
            get(|| async { Json(json!([{"id": 1, "name": "Science"}])) }),
        );
    let (base, log) = spawn_backend(router).await;
    let client = client_for(&base, signed_in("tok", None));

    let err = client.list_categories().await.expect_err("listing should fail");

    assert_eq!(err.status(), Some(403));
    assert_eq!(log.hits("/api/course-categories/"), 0);
}

/// Tests that curricula are read from the first endpoint that exists.
#[tokio::test]
async fn test_list_curricula_falls_back_past_missing_endpoints() {
    let router = Router::new()
        .route("/api/curricula/", get(|| async { not_found() }))
        .route(
            "/api/curriculums/",
            get(|| async {
                Json(json!({
                    "count": 2,
                    "results": [
                        {"id": 3, "name": "Basic Education 2008", "slug": "basic-2008"},
                        {"id": "4", "name": "Vocational"},
                    ],
                }))
            }),
        );
    let (base, log) = spawn_backend(router).await;
    let client = client_for(&base, signed_in("tok", None));

    let curricula = client.list_curricula().await.expect("listing failed");

    assert_eq!(curricula.len(), 2);
    assert_eq!(curricula[0].id, "3");
    assert_eq!(curricula[0].slug.as_deref(), Some("basic-2008"));
    assert_eq!(curricula[1].slug, None);
    assert_eq!(log.hits("/api/curricula/"), 1);
    assert_eq!(log.hits("/api/courses/curricula/"), 0);
}

// ============================================================================
// Attachments and certificates
// ============================================================================

/// Tests that every attachment gets its own DELETE and a failure surfaces.
#[tokio::test]
async fn test_remove_attachments_deletes_each_file() {
    let router = Router::new().route(
        "/api/assignments/:assignment/attachments/:file/",
        delete(|Path((_, file)): Path<(String, String)>| async move {
            if file == "missing" {
                not_found().into_response()
            } else {
                StatusCode::NO_CONTENT.into_response()
            }
        }),
    );
    let (base, log) = spawn_backend(router).await;
    let client = client_for(&base, signed_in("tok", None));

    client
        .remove_attachments("a1", &["f1".to_string(), "f2".to_string()])
        .await
        .expect("removal failed");
    assert_eq!(log.hits("/api/assignments/a1/attachments/f1/"), 1);
    assert_eq!(log.hits("/api/assignments/a1/attachments/f2/"), 1);

    let err = client
        .remove_attachments("a1", &["f3".to_string(), "missing".to_string()])
        .await
        .expect_err("removal should fail");
    assert_eq!(err.status(), Some(404));
}

/// Tests that issuing for completed students sends the forced flags
/// alongside the template fields.
#[tokio::test]
async fn test_issue_for_completed_sends_forced_flags() {
    let router = Router::new().route(
        "/api/courses/:id/certificates/save-and-issue/",
        post(|Json(body): Json<Value>| async move {
            assert_eq!(
                body,
                json!({
                    "style": "modern",
                    "issuer_name": "Campus U",
                    "issue_for_student_ids": [],
                    "issue_for_all_enrolled": true,
                    "issue_for_completed_only": true,
                })
            );
            Json(json!({
                "style": "modern",
                "created": [{
                    "id": 70,
                    "serial_no": "CERT-0001",
                    "verification_code": "ab12",
                    "student_name": "Ada",
                    "render_status": "pending",
                }],
            }))
        }),
    );
    let (base, _log) = spawn_backend(router).await;
    let client = client_for(&base, signed_in("tok", None));

    let template = CertificateTemplate {
        style: Some("modern".to_string()),
        issuer_name: Some("Campus U".to_string()),
        ..CertificateTemplate::default()
    };
    let issued = client
        .issue_for_completed("c1", &template)
        .await
        .expect("issue failed");

    assert_eq!(issued.len(), 1);
    assert_eq!(issued[0].id, "70");
    assert!(!issued[0].is_rendered());
}

// ============================================================================
// Multipart updates
// ============================================================================

/// Tests that a profile image goes out as a `profile_image` file part on
/// the signed-in user's record.
#[tokio::test]
async fn test_update_profile_image_uploads_file_part() {
    let router = Router::new().route(
        "/api/auth/user/",
        patch(|headers: HeaderMap, form: Multipart| async move {
            assert_eq!(bearer(&headers), Some("tok"));
            let fields = read_fields(form).await;
            assert_eq!(
                fields,
                vec![(
                    "profile_image".to_string(),
                    Some("me.png".to_string()),
                    b"\x89PNG".to_vec()
                )]
            );
            Json(json!({"profile_image_url": "/media/profiles/me.png"}))
        }),
    );
    let (base, _log) = spawn_backend(router).await;
    let client = client_for(&base, signed_in("tok", None));

    let image = UploadFile::new("me.png", b"\x89PNG".to_vec()).with_content_type("image/png");
    let stored = client
        .update_profile_image(&image)
        .await
        .expect("upload failed");

    assert_eq!(stored.profile_image_url, "/media/profiles/me.png");
}

/// Tests that a course update sends only the configured status and banner
/// fields as a multipart PUT.
#[tokio::test]
async fn test_update_course_uses_configured_fields() {
    let router = Router::new().route(
        "/api/courses/:id/",
        put(|Path(id): Path<String>, form: Multipart| async move {
            let fields = read_fields(form).await;
            let names: Vec<&str> = fields.iter().map(|(name, _, _)| name.as_str()).collect();
            assert_eq!(names, vec!["title", "visibility", "banner_image"]);
            assert_eq!(fields[1].2, b"HIDDEN".to_vec());
            assert_eq!(fields[2].1.as_deref(), Some("banner.jpg"));
            Json(json!({"id": id, "title": "Rust 201", "status": "HIDDEN"}))
        }),
    );
    let (base, log) = spawn_backend(router).await;
    let config = ClientConfig {
        course_status_field: StatusField::Visibility,
        banner_field: BannerField::BannerImage,
        ..ClientConfig::default().with_api_base(&base)
    };
    let client = ApiClient::new(config, signed_in("tok", None)).expect("client");

    let update = CourseUpdate {
        title: Some("Rust 201".to_string()),
        status: Some("DRAFT".to_string()),
        visibility: Some(CourseVisibility::Hidden),
        banner: Some(UploadFile::new("banner.jpg", vec![0xFF, 0xD8])),
        ..CourseUpdate::default()
    };
    let detail = client.update_course("c9", &update).await.expect("update failed");

    assert_eq!(detail.id, "c9");
    assert_eq!(detail.status.as_deref(), Some("HIDDEN"));
    let methods: Vec<String> = log.all().into_iter().map(|s| s.method).collect();
    assert_eq!(methods, vec!["PUT"]);
}
