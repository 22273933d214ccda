use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use agora_domain::idempotency::InMemoryIdempotencyStore;
use agora_infra::config::AppConfig;
use axum::body::{Body, to_bytes};
use axum::http::header::CONTENT_TYPE;
use axum::http::{Request, StatusCode};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::Serialize;
use serde_json::{Value, json};
use tower_util::ServiceExt;

use crate::observability;
use crate::routes;
use crate::state::AppState;

const SECRET: &str = "test-secret";

#[derive(Serialize)]
struct Claims {
    sub: String,
    username: String,
    exp: usize,
}

fn test_config() -> AppConfig {
    AppConfig {
        app_env: "test".to_string(),
        port: 0,
        log_level: "info".to_string(),
        data_backend: "memory".to_string(),
        surreal_endpoint: "ws://127.0.0.1:8000".to_string(),
        surreal_ns: "agora".to_string(),
        surreal_db: "community".to_string(),
        surreal_user: "root".to_string(),
        surreal_pass: "root".to_string(),
        idempotency_backend: "memory".to_string(),
        redis_url: "redis://127.0.0.1:6379".to_string(),
        jwt_secret: SECRET.to_string(),
        leaderboard_window_hours: 24,
        leaderboard_limit: 5,
    }
}

fn token_for(sub: &str, username: &str) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time")
        .as_secs();
    let claims = Claims {
        sub: sub.to_string(),
        username: username.to_string(),
        exp: (now + 3600) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("token")
}

fn test_app() -> axum::Router {
    let store = InMemoryIdempotencyStore::new("test");
    let state = AppState::with_idempotency_store(test_config(), Arc::new(store));
    routes::router(state)
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    request_id: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    if let Some(request_id) = request_id {
        builder = builder.header("x-request-id", request_id);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn create_post(app: &axum::Router, token: &str, request_id: &str) -> i64 {
    let (status, body) = send(
        app,
        "POST",
        "/v1/posts",
        Some(token),
        Some(request_id),
        Some(json!({ "content": "hello agora" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body.get("post_id").and_then(Value::as_i64).expect("post_id")
}

#[tokio::test]
async fn health_reports_storage_backend() {
    let app = test_app();
    let (status, body) = send(&app, "GET", "/health", None, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.get("status"), Some(&json!("ok")));
    assert_eq!(body.get("storage"), Some(&json!("memory")));
}

#[tokio::test]
async fn mutations_require_a_valid_token() {
    let app = test_app();
    let payload = json!({ "content": "anonymous" });

    let (status, body) = send(&app, "POST", "/v1/posts", None, None, Some(payload.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        body.pointer("/error/code").and_then(Value::as_str),
        Some("unauthorized")
    );

    let (status, _) = send(
        &app,
        "POST",
        "/v1/posts",
        Some("not-a-jwt"),
        None,
        Some(payload),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn post_and_nested_comments_round_trip_through_detail() {
    let app = test_app();
    let bob = token_for("user-b", "bob");
    let alice = token_for("user-a", "alice");
    let post_id = create_post(&app, &bob, "post-1").await;

    let (status, root) = send(
        &app,
        "POST",
        &format!("/v1/posts/{post_id}/comments"),
        Some(&alice),
        Some("comment-1"),
        Some(json!({ "content": "root comment" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let root_id = root.get("comment_id").and_then(Value::as_i64).expect("id");
    assert_eq!(root.get("depth"), Some(&json!(0)));
    assert_eq!(root.get("path"), Some(&json!(root_id.to_string())));

    let (status, reply) = send(
        &app,
        "POST",
        &format!("/v1/posts/{post_id}/comments"),
        Some(&bob),
        Some("comment-2"),
        Some(json!({ "content": "reply", "parent_id": root_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let reply_id = reply.get("comment_id").and_then(Value::as_i64).expect("id");
    assert_eq!(reply.get("depth"), Some(&json!(1)));
    assert_eq!(
        reply.get("path"),
        Some(&json!(format!("{root_id}.{reply_id}")))
    );

    let (status, detail) = send(
        &app,
        "GET",
        &format!("/v1/posts/{post_id}"),
        Some(&alice),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail.get("post_id"), Some(&json!(post_id)));
    assert_eq!(detail.get("comment_count"), Some(&json!(2)));
    assert_eq!(detail.get("is_liked"), Some(&json!(false)));
    assert_eq!(
        detail.pointer("/comments/0/children/0/comment_id"),
        Some(&json!(reply_id))
    );

    let (status, thread) = send(
        &app,
        "GET",
        &format!("/v1/posts/{post_id}/comments"),
        None,
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(thread.as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn comment_on_missing_post_or_parent_is_not_found() {
    let app = test_app();
    let alice = token_for("user-a", "alice");

    let (status, body) = send(
        &app,
        "POST",
        "/v1/posts/9999/comments",
        Some(&alice),
        Some("orphan-1"),
        Some(json!({ "content": "nobody home" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body.pointer("/error/code").and_then(Value::as_str),
        Some("not_found")
    );

    let post_id = create_post(&app, &alice, "post-1").await;
    let (status, _) = send(
        &app,
        "POST",
        &format!("/v1/posts/{post_id}/comments"),
        Some(&alice),
        Some("orphan-2"),
        Some(json!({ "content": "dangling", "parent_id": 4242 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn blank_content_is_rejected() {
    let app = test_app();
    let alice = token_for("user-a", "alice");
    let (status, body) = send(
        &app,
        "POST",
        "/v1/posts",
        Some(&alice),
        Some("blank-1"),
        Some(json!({ "content": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body.pointer("/error/code").and_then(Value::as_str),
        Some("validation_error")
    );
}

#[tokio::test]
async fn like_toggle_updates_count_karma_and_leaderboard() {
    let app = test_app();
    let bob = token_for("user-b", "bob");
    let alice = token_for("user-a", "alice");
    let post_id = create_post(&app, &bob, "post-1").await;

    let (status, liked) = send(
        &app,
        "POST",
        "/v1/likes",
        Some(&alice),
        Some("like-1"),
        Some(json!({ "target_type": "post", "target_id": post_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(liked.get("is_liked"), Some(&json!(true)));
    assert_eq!(liked.get("like_count"), Some(&json!(1)));
    assert_eq!(liked.get("outcome"), Some(&json!("liked")));

    let (status, balance) = send(&app, "GET", "/v1/users/user-b/karma", None, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balance.get("karma"), Some(&json!(5)));

    let (status, board) = send(&app, "GET", "/v1/leaderboard", None, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(board.pointer("/0/user_id"), Some(&json!("user-b")));
    assert_eq!(board.pointer("/0/username"), Some(&json!("bob")));
    assert_eq!(board.pointer("/0/karma"), Some(&json!(5)));
    assert_eq!(board.pointer("/0/rank"), Some(&json!(1)));

    let (status, unliked) = send(
        &app,
        "POST",
        "/v1/likes",
        Some(&alice),
        Some("like-2"),
        Some(json!({ "target_type": "post", "target_id": post_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unliked.get("is_liked"), Some(&json!(false)));
    assert_eq!(unliked.get("like_count"), Some(&json!(0)));

    let (_, balance) = send(&app, "GET", "/v1/users/user-b/karma", None, None, None).await;
    assert_eq!(balance.get("karma"), Some(&json!(0)));
    let (_, board) = send(&app, "GET", "/v1/leaderboard", None, None, None).await;
    assert_eq!(board.as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn retried_like_with_same_request_id_replays_instead_of_toggling() {
    let app = test_app();
    let bob = token_for("user-b", "bob");
    let alice = token_for("user-a", "alice");
    let post_id = create_post(&app, &bob, "post-1").await;
    let payload = json!({ "target_type": "post", "target_id": post_id });

    for _ in 0..3 {
        let (status, body) = send(
            &app,
            "POST",
            "/v1/likes",
            Some(&alice),
            Some("like-retry"),
            Some(payload.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.get("is_liked"), Some(&json!(true)));
        assert_eq!(body.get("like_count"), Some(&json!(1)));
    }

    let (_, detail) = send(
        &app,
        "GET",
        &format!("/v1/posts/{post_id}"),
        Some(&alice),
        None,
        None,
    )
    .await;
    assert_eq!(detail.get("like_count"), Some(&json!(1)));
    assert_eq!(detail.get("is_liked"), Some(&json!(true)));
}

#[tokio::test]
async fn like_rejects_unknown_target_type_and_missing_target() {
    let app = test_app();
    let alice = token_for("user-a", "alice");

    let (status, body) = send(
        &app,
        "POST",
        "/v1/likes",
        Some(&alice),
        Some("like-bad-type"),
        Some(json!({ "target_type": "user", "target_id": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body.pointer("/error/code").and_then(Value::as_str),
        Some("validation_error")
    );

    let (status, _) = send(
        &app,
        "POST",
        "/v1/likes",
        Some(&alice),
        Some("like-missing"),
        Some(json!({ "target_type": "comment", "target_id": 77 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn failed_mutation_releases_its_request_id() {
    let app = test_app();
    let bob = token_for("user-b", "bob");
    let alice = token_for("user-a", "alice");
    let payload = json!({ "target_type": "post", "target_id": 1 });

    let (status, _) = send(
        &app,
        "POST",
        "/v1/likes",
        Some(&alice),
        Some("like-early"),
        Some(payload.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let post_id = create_post(&app, &bob, "post-1").await;
    assert_eq!(post_id, 1);
    let (status, body) = send(
        &app,
        "POST",
        "/v1/likes",
        Some(&alice),
        Some("like-early"),
        Some(payload),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.get("is_liked"), Some(&json!(true)));
}

#[tokio::test]
async fn leaderboard_honours_query_parameters() {
    let app = test_app();
    let alice = token_for("user-a", "alice");
    let bob = token_for("user-b", "bob");
    let carol = token_for("user-c", "carol");
    let bob_post = create_post(&app, &bob, "post-b").await;
    let carol_post = create_post(&app, &carol, "post-c").await;

    for (idx, post_id) in [bob_post, carol_post].into_iter().enumerate() {
        let (status, _) = send(
            &app,
            "POST",
            "/v1/likes",
            Some(&alice),
            Some(&format!("like-{idx}")),
            Some(json!({ "target_type": "post", "target_id": post_id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, board) = send(
        &app,
        "GET",
        "/v1/leaderboard?window_hours=1&limit=1",
        None,
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let entries = board.as_array().expect("entries");
    assert_eq!(entries.len(), 1);
    // Equal karma: ascending user id wins the tie.
    assert_eq!(entries[0].get("user_id"), Some(&json!("user-b")));

    let (_, board) = send(
        &app,
        "GET",
        "/v1/leaderboard?window_hours=0",
        None,
        None,
        None,
    )
    .await;
    assert_eq!(board.as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn list_posts_is_newest_first() {
    let app = test_app();
    let alice = token_for("user-a", "alice");
    let first = create_post(&app, &alice, "post-1").await;
    let second = create_post(&app, &alice, "post-2").await;

    let (status, posts) = send(&app, "GET", "/v1/posts?limit=10", None, None, None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = posts
        .as_array()
        .expect("posts")
        .iter()
        .filter_map(|post| post.get("post_id").and_then(Value::as_i64))
        .collect();
    assert_eq!(ids, vec![second, first]);
}

#[tokio::test]
async fn metrics_endpoint_is_exposed() {
    let _ = observability::init_metrics();
    let app = test_app();

    let (status, _) = send(&app, "GET", "/health", None, None, None).await;
    assert_eq!(status, StatusCode::OK);

    let request = Request::builder()
        .method("GET")
        .uri("/metrics")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("text/plain"))
    );
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let body = String::from_utf8(body.to_vec()).expect("metrics body");
    assert!(body.contains("agora_api_http_requests_total"));
}
