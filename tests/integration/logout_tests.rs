// ==================================
// tests/integration/logout_tests.rs
// ==================================
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use serde_json::{json, Value};

use crate::test_utils::{read_json, set_cookie_header, set_cookie_value, setup_test_env, TestEnv};

async fn logout(env: &TestEnv, cookie: Option<&str>, bearer: Option<&str>) -> axum::http::Response<Body> {
    let mut builder = Request::builder().method(Method::POST).uri("/api/logout");
    if let Some(sid) = cookie {
        builder = builder.header(header::COOKIE, format!("vplan_session={sid}"));
    }
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    env.send(builder.body(Body::empty()).unwrap()).await
}

async fn vplan_with_cookie(env: &TestEnv, sid: &str) -> StatusCode {
    env.send(
        Request::builder()
            .uri("/api/vplan")
            .header(header::COOKIE, format!("vplan_session={sid}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .status()
}

#[tokio::test]
async fn test_logout_without_session_succeeds() {
    let env = setup_test_env();
    let response = logout(&env, None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let header = set_cookie_header(&response).unwrap();
    assert!(header.starts_with("vplan_session=deleted"));
    assert!(header.contains("Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
    let body: Value = read_json(response).await;
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn test_logout_ends_cookie_session() {
    let env = setup_test_env();
    let response = env
        .login("test", json!({"password": "passwd", "session": 1}))
        .await;
    let sid = set_cookie_value(&response, "vplan_session").unwrap();
    assert_eq!(vplan_with_cookie(&env, &sid).await, StatusCode::OK);

    let response = logout(&env, Some(&sid), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(vplan_with_cookie(&env, &sid).await, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_bearer_token() {
    let env = setup_test_env();
    let token = env.token_login().await;

    let response = logout(&env, None, Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(env.state.tokens.validate(&token).await.unwrap(), None);
}

#[tokio::test]
async fn test_logout_is_rate_limited() {
    let env = setup_test_env();
    let budget = env.state.settings.rate_limit.logout.max_requests;
    for _ in 0..budget {
        assert_eq!(logout(&env, None, None).await.status(), StatusCode::OK);
    }
    assert_eq!(
        logout(&env, None, None).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}
