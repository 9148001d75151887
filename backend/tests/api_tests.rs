//! HTTP surface tests driven through the axum router

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{siwe_message, test_app, TestApp, Wallet, CHAIN, DOMAIN};
use marketplace_auth::routes;
use marketplace_auth::state::AppState;
use marketplace_auth::store::CredentialStore;

fn router(app: &TestApp) -> Router {
    routes::app(AppState::new(app.service.clone(), None))
}

async fn post(router: &Router, uri: &str, body: Value, bearer: Option<&str>) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, "api-tests/1.0")
        .header("x-forwarded-for", "203.0.113.9");
    if let Some(token) = bearer {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    let response = router
        .clone()
        .oneshot(request.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn login(router: &Router, wallet: &Wallet) -> Value {
    let (status, body) = post(
        router,
        "/auth/nonce",
        json!({ "account_id": wallet.address, "chain_id": CHAIN, "domain": DOMAIN }),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let nonce = body["nonce"].as_str().unwrap().to_string();

    let message = siwe_message(&wallet.address, 1, &nonce);
    let (status, body) = post(
        router,
        "/auth/verify",
        json!({
            "account_id": wallet.address,
            "message": message,
            "signature": wallet.sign(&message),
            "device_id": "device-1",
            "collection_intent_context": { "version": 1, "payload": { "collection": "genesis" } },
        }),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "verify failed: {}", body);
    body
}

#[tokio::test]
async fn test_health_without_database() {
    let app = test_app();
    let response = router(&app)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store"
    );
}

#[tokio::test]
async fn test_login_and_refresh_over_http() {
    let app = test_app();
    let router = router(&app);
    let wallet = Wallet::from_seed(0x21);

    let login = login(&router, &wallet).await;
    assert_eq!(login["token_type"], "Bearer");
    assert_eq!(login["token_generation"], 0);
    assert_eq!(login["address"], wallet.address.as_str());

    let session_id = login["session_id"].as_str().unwrap().parse().unwrap();
    let session = app.store.get_session(session_id).await.unwrap().unwrap();
    assert_eq!(session.ip_address.as_deref(), Some("203.0.113.9"));
    assert_eq!(session.user_agent.as_deref(), Some("api-tests/1.0"));
    assert_eq!(session.collection_intent().unwrap().version, 1);

    let (status, refreshed) = post(
        &router,
        "/auth/refresh",
        json!({ "refresh_token": login["refresh_token"] }),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refreshed["token_generation"], 1);
}

#[tokio::test]
async fn test_replay_is_generic_unauthorized() {
    let app = test_app();
    let router = router(&app);
    let wallet = Wallet::from_seed(0x22);
    let login = login(&router, &wallet).await;
    let secret0 = login["refresh_token"].clone();

    let (status, _) = post(&router, "/auth/refresh", json!({ "refresh_token": secret0 }), None).await;
    assert_eq!(status, StatusCode::OK);

    let (replay_status, replay) =
        post(&router, "/auth/refresh", json!({ "refresh_token": secret0 }), None).await;
    let (unknown_status, unknown) = post(
        &router,
        "/auth/refresh",
        json!({ "refresh_token": "ab".repeat(32) }),
        None,
    )
    .await;

    assert_eq!(replay_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    // Reuse detection is not distinguishable from an unknown token
    assert_eq!(replay, unknown);
}

#[tokio::test]
async fn test_malformed_refresh_token_is_bad_request() {
    let app = test_app();
    let (status, body) = post(
        &router(&app),
        "/auth/refresh",
        json!({ "refresh_token": "short" }),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_nonce_validation_errors() {
    let app = test_app();
    let (status, _) = post(
        &router(&app),
        "/auth/nonce",
        json!({ "account_id": "0x1234", "chain_id": CHAIN, "domain": DOMAIN }),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bearer_logout_is_retryable() {
    let app = test_app();
    let router = router(&app);
    let wallet = Wallet::from_seed(0x23);
    let login = login(&router, &wallet).await;
    let access = login["access_token"].as_str().unwrap();

    let mut statuses = Vec::new();
    for _ in 0..2 {
        let (status, _) = post(&router, "/auth/logout", json!({}), Some(access)).await;
        statuses.push(status);
    }
    assert_eq!(statuses, [StatusCode::NO_CONTENT, StatusCode::NO_CONTENT]);

    // The session is gone, so routes needing a live session refuse the token
    let (status, _) = post(&router, "/auth/logout-all", json!({}), Some(access)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = post(&router, "/auth/logout", json!({}), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = post(&router, "/auth/logout", json!({}), Some("not.a.jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_by_token_and_logout_all() {
    let app = test_app();
    let router = router(&app);
    let wallet = Wallet::from_seed(0x24);
    let first = login(&router, &wallet).await;
    let second = login(&router, &wallet).await;

    let (status, _) = post(
        &router,
        "/auth/logout/token",
        json!({ "refresh_token": first["refresh_token"] }),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = post(
        &router,
        "/auth/logout-all",
        json!({}),
        Some(second["access_token"].as_str().unwrap()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked_sessions"], 1);
}
