// ==================================
// tests/integration/auth_flow_tests.rs
// ==================================
//! Login over `/api/authenticate/{username}` in token and session mode.
use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
};
use chrono::Utc;
use serde_json::{json, Value};
use vplan_backend_lib::config::{BucketLimit, Settings};
use vplan_common::{ErrorEnvelope, TokenResponseBody};

use crate::test_utils::{
    read_json, set_cookie_header, set_cookie_value, setup_test_env, setup_test_env_with, TestEnv,
};

const TEST_IDENT: &str = "9f0a4ae739f79351923368d1e088de65723985e61fc41806fe58543acae0325f";

#[tokio::test]
async fn test_token_login_returns_token_and_future_expiry() {
    let env = setup_test_env();

    let response = env
        .login("test", json!({"password": "passwd", "group": "", "session": 0}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: TokenResponseBody = read_json(response).await;
    assert_eq!(body.auth.ident, TEST_IDENT);
    assert_eq!(body.auth.ctx, Value::Null);
    assert!(!body.token.is_empty());
    assert!(body.expire > Utc::now());
}

#[tokio::test]
async fn test_token_login_without_session_field() {
    let env = setup_test_env();
    let response = env.login("test", json!({"password": "passwd"})).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = read_json(response).await;
    assert!(body["token"].is_string());
}

#[tokio::test]
async fn test_repeated_login_rotates_token() {
    let env = setup_test_env();
    let first = env.token_login().await;
    let second = env.token_login().await;
    assert_ne!(first, second);

    // only the newest token is stored for the identity
    assert_eq!(env.state.tokens.validate(&first).await.unwrap(), None);
    assert_eq!(
        env.state.tokens.validate(&second).await.unwrap().as_deref(),
        Some(TEST_IDENT)
    );
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized_with_blank_message() {
    let env = setup_test_env();
    let response = env.login("test", json!({"password": "wrong"})).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: ErrorEnvelope = read_json(response).await;
    assert_eq!(body, ErrorEnvelope::new(401, ""));
}

#[tokio::test]
async fn test_unknown_user_is_unauthorized() {
    let env = setup_test_env();
    let response = env.login("nobody", json!({"password": "passwd"})).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_empty_password_is_bad_request() {
    let env = setup_test_env();
    let response = env.login("test", json!({"password": ""})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorEnvelope = read_json(response).await;
    assert_eq!(body.error.code, 400);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let env = setup_test_env();
    let response = env
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/authenticate/test")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorEnvelope = read_json(response).await;
    assert!(!body.error.message.is_empty());
}

#[tokio::test]
async fn test_session_login_sets_cookie_without_token() {
    let env = setup_test_env();
    let response = env
        .login("test", json!({"password": "passwd", "session": 1}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let sid = set_cookie_value(&response, "vplan_session").expect("session cookie");
    assert!(!sid.is_empty());
    let header = set_cookie_header(&response).unwrap();
    assert!(header.contains("HttpOnly"));
    assert!(header.contains(&format!(
        "Max-Age={}",
        env.state.settings.sessions.default_max_age_secs
    )));

    let body: Value = read_json(response).await;
    assert_eq!(body["ident"], TEST_IDENT);
    assert!(body.get("token").is_none());
}

#[tokio::test]
async fn test_remember_me_uses_long_max_age() {
    let env = setup_test_env();
    let response = env
        .login("test", json!({"password": "passwd", "session": 2}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let header = set_cookie_header(&response).unwrap();
    assert!(header.contains(&format!(
        "Max-Age={}",
        env.state.settings.sessions.remember_max_age_secs
    )));
}

#[tokio::test]
async fn test_health() {
    let env = setup_test_env();
    let response = env
        .send(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = read_json(response).await;
    assert_eq!(body["status"], "ok");
}

async fn login_forwarded_for(env: &TestEnv, forwarded: &str) -> StatusCode {
    let peer: SocketAddr = "198.51.100.7:40000".parse().unwrap();
    env.send(
        Request::builder()
            .method("POST")
            .uri("/api/authenticate/test")
            .header("x-forwarded-for", forwarded)
            .extension(ConnectInfo(peer))
            .body(Body::from(r#"{"password":"wrong"}"#))
            .unwrap(),
    )
    .await
    .status()
}

#[tokio::test]
async fn test_rotating_forwarded_for_does_not_escape_the_login_budget() {
    let mut settings = Settings::default();
    settings.rate_limit.authenticate = BucketLimit::new(60, 2);
    let env = setup_test_env_with(settings);

    let mut statuses = Vec::new();
    for i in 0..10 {
        statuses.push(login_forwarded_for(&env, &format!("1.2.3.{i}")).await);
    }
    assert_eq!(&statuses[..2], &[StatusCode::UNAUTHORIZED, StatusCode::UNAUTHORIZED]);
    assert!(statuses[2..].iter().all(|s| *s == StatusCode::TOO_MANY_REQUESTS));
    assert_eq!(env.state.rate_limiter.tracked(), 1);
}

#[tokio::test]
async fn test_forwarded_for_is_honoured_behind_trusted_proxy() {
    let mut settings = Settings::default();
    settings.rate_limit.authenticate = BucketLimit::new(60, 1);
    settings.rate_limit.trust_proxy_headers = true;
    let env = setup_test_env_with(settings);

    assert_eq!(login_forwarded_for(&env, "1.2.3.1").await, StatusCode::UNAUTHORIZED);
    assert_eq!(login_forwarded_for(&env, "1.2.3.2").await, StatusCode::UNAUTHORIZED);
    assert_eq!(login_forwarded_for(&env, "1.2.3.1").await, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_undecodable_username_is_bad_request_envelope() {
    let env = setup_test_env();
    let response = env
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/authenticate/%FF")
                .body(Body::from(r#"{"password":"passwd"}"#))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorEnvelope = read_json(response).await;
    assert_eq!(body.error.code, 400);
    assert!(!body.error.message.is_empty());
}
