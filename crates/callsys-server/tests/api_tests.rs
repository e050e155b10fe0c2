//! Integration tests for the callsys API endpoints.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server, over the in-process store backends.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use callsys_core::config::{SessionConfig, UserConfig};
use callsys_core::{Backends, CallsysConfig, QueueSystem};
use callsys_server::router::build_router;
use callsys_server::state::AppState;
use callsys_types::Role;
use serde_json::{Value, json};
use tower::ServiceExt;

const BOT_TOKEN: &str = "bot-secret";

fn user(username: &str, role: Role) -> UserConfig {
    UserConfig {
        username: username.to_owned(),
        password: "pw".to_owned(),
        role,
        nickname: String::new(),
    }
}

async fn make_router() -> Router {
    let config = CallsysConfig {
        users: vec![user("admin", Role::Admin), user("alice", Role::Operator)],
        sessions: SessionConfig {
            bot_token: Some(BOT_TOKEN.to_owned()),
            ..SessionConfig::default()
        },
        ..CallsysConfig::default()
    };
    let system = QueueSystem::new(config, Backends::in_memory()).expect("system builds");
    system.start().await.expect("default line");
    build_router(AppState::new(Arc::new(system)))
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn login(router: &Router, username: &str) -> String {
    let (status, json) = send(
        router,
        json_request(
            "POST",
            "/api/auth/login",
            None,
            &json!({ "username": username, "password": "pw" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    json["token"].as_str().unwrap().to_owned()
}

async fn default_line_id(router: &Router) -> String {
    let (_, json) = send(router, get("/api/lines", None)).await;
    json["lines"][0]["id"].as_str().unwrap().to_owned()
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_index_returns_html() {
    let router = make_router().await;
    let response = router
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.contains("text/html"));
}

#[tokio::test]
async fn test_default_line_listed() {
    let router = make_router().await;
    let response = router.oneshot(get("/api/lines", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["count"], 1);
}

#[tokio::test]
async fn test_login_rejects_bad_password() {
    let router = make_router().await;
    let (status, json) = send(
        &router,
        json_request(
            "POST",
            "/api/auth/login",
            None,
            &json!({ "username": "alice", "password": "nope" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["status"], 401);
}

#[tokio::test]
async fn test_commands_require_session() {
    let router = make_router().await;
    let line = default_line_id(&router).await;
    let (status, _) = send(
        &router,
        json_request(
            "POST",
            &format!("/api/lines/{line}/call"),
            None,
            &json!({ "direction": "next" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_issue_then_call() {
    let router = make_router().await;
    let token = login(&router, "alice").await;
    let line = default_line_id(&router).await;

    let (status, json) = send(
        &router,
        json_request(
            "POST",
            &format!("/api/lines/{line}/issue"),
            Some(&token),
            &json!({ "direction": "next" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["number"], 1);

    let call = json_request(
        "POST",
        &format!("/api/lines/{line}/call"),
        Some(&token),
        &json!({ "direction": "next" }),
    );
    let (status, json) = send(&router, call).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["number"], 1);

    let call = json_request(
        "POST",
        &format!("/api/lines/{line}/call"),
        Some(&token),
        &json!({ "direction": "next" }),
    );
    let (status, json) = send(&router, call).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["status"], 409);
}

#[tokio::test]
async fn test_operator_cannot_reset() {
    let router = make_router().await;
    let token = login(&router, "alice").await;
    let line = default_line_id(&router).await;

    let (status, _) = send(
        &router,
        json_request(
            "POST",
            &format!("/api/lines/{line}/reset"),
            Some(&token),
            &json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_invalid_line_id_is_bad_request() {
    let router = make_router().await;
    let (status, json) = send(&router, get("/api/lines/not-a-uuid/passed", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("invalid id"));
}

#[tokio::test]
async fn test_public_ticket_intake() {
    let router = make_router().await;
    let line = default_line_id(&router).await;

    let (status, json) = send(
        &router,
        json_request("POST", &format!("/api/lines/{line}/ticket"), None, &json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["number"], 1);

    let admin = login(&router, "admin").await;
    let (status, _) = send(
        &router,
        json_request(
            "PUT",
            "/api/settings/public",
            Some(&admin),
            &json!({ "enabled": false }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &router,
        json_request("POST", &format!("/api/lines/{line}/ticket"), None, &json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_create_line_validates_body() {
    let router = make_router().await;
    let admin = login(&router, "admin").await;

    let (status, _) = send(
        &router,
        json_request(
            "POST",
            "/api/lines",
            Some(&admin),
            &json!({ "name": "", "prefix": "B" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(
        &router,
        json_request(
            "POST",
            "/api/lines",
            Some(&admin),
            &json!({ "name": "Pharmacy", "prefix": "p", "color": "#0a0" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["prefix"], "P");

    let (_, json) = send(&router, get("/api/lines", None)).await;
    assert_eq!(json["count"], 2);
}

#[tokio::test]
async fn test_bot_requires_token() {
    let router = make_router().await;
    let request = Request::get("/api/bot/subscription/U1")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bot_subscribe_and_query() {
    let router = make_router().await;
    let (_, lines) = send(&router, get("/api/lines", None)).await;
    let prefix = lines["lines"][0]["prefix"].as_str().unwrap().to_owned();

    let request = Request::post("/api/bot/subscribe")
        .header("content-type", "application/json")
        .header("x-bot-token", BOT_TOKEN)
        .body(Body::from(
            json!({ "subscriber_id": "U1", "prefix": prefix, "number": 4 }).to_string(),
        ))
        .unwrap();
    let (status, json) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ahead"], 4);
    assert!(json["message"].as_str().unwrap().contains('4'));

    let request = Request::get("/api/bot/subscription/U1")
        .header("x-bot-token", BOT_TOKEN)
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["subscription"]["subscription"]["number"], 4);
}

#[tokio::test]
async fn test_reports_need_session() {
    let router = make_router().await;
    let (status, _) = send(&router, get("/api/admin-log", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = login(&router, "alice").await;
    let (status, json) = send(&router, get("/api/stats/daily", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["hourly"].as_array().unwrap().len(), 24);
}
