//! Integration tests for the authenticated client.
//!
//! These tests verify that AuthenticatedClient correctly:
//! - Refreshes only when no valid token is held
//! - Short-circuits calls when the refresh is rejected
//! - Refreshes once for many concurrent callers, whether it succeeds or not
//! - Persists refreshed tokens through the token store

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use offers_core::{
    ClientError, Headers, MemoryStore, Params, RefreshFailure, TokenStore,
};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, header, method, path},
};

use common::*;

async fn mount_refresh(server: &MockServer, token: &str, expected: u64) {
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .and(header("Bearer", REFRESH_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": token })))
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_refreshes_once_before_first_call() {
    let server = MockServer::start().await;
    let token = valid_jwt();
    mount_refresh(&server, &token, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/products/1/offers"))
        .and(header("Bearer", token.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let client = client_with(&server, Arc::clone(&store), uncached_config()).await;

    let first = client
        .get("products/1/offers", &Params::new(), &Headers::new())
        .await
        .unwrap();
    let second = client
        .get("products/1/offers", &Params::new(), &Headers::new())
        .await
        .unwrap();

    assert_eq!(first.status(), 200);
    assert_eq!(second.body(), &json!([]));
    assert!(!client.token_manager().is_expired());
    assert_eq!(store.load(TOKEN_KEY).await.unwrap().unwrap().expose(), token);
}

#[tokio::test]
async fn test_valid_stored_token_skips_refresh() {
    let server = MockServer::start().await;
    let token = valid_jwt();
    mount_refresh(&server, "unused", 0).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/products/1/offers"))
        .and(header("Bearer", token.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::with_token(TOKEN_KEY, token.as_str()));
    let client = client_with(&server, store, fast_config()).await;

    let response = client
        .get("products/1/offers", &Params::new(), &Headers::new())
        .await
        .unwrap();

    assert!(response.is_success());
}

#[tokio::test]
async fn test_expired_stored_token_is_refreshed() {
    let server = MockServer::start().await;
    let fresh = valid_jwt();
    mount_refresh(&server, &fresh, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/ping"))
        .and(header("Bearer", fresh.as_str()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::with_token(TOKEN_KEY, expired_jwt()));
    let client = client_with(&server, Arc::clone(&store), fast_config()).await;

    client.get("ping", &Params::new(), &Headers::new()).await.unwrap();

    assert_eq!(store.load(TOKEN_KEY).await.unwrap().unwrap().expose(), fresh);
}

#[tokio::test]
async fn test_refresh_rejection_short_circuits() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "bad refresh"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client(&server).await;

    let err = client
        .get("products/1/offers", &Params::new(), &Headers::new())
        .await
        .unwrap_err();

    let err = match err {
        ClientError::TokenRefresh(err) => err,
        other => panic!("expected a refresh error, got {:?}", other),
    };
    assert_eq!(err.status(), 401);
    assert_eq!(err.kind(), RefreshFailure::Rejected);
    assert_eq!(err.hint(), "Failed to refresh token");
    assert_eq!(err.response().body(), &json!({"detail": "bad refresh"}));
    assert!(client.token_manager().is_expired());
}

#[tokio::test]
async fn test_refresh_without_access_token_fails() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "wrong-field"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server).await;

    let err = client.refresh().await.unwrap_err();

    assert!(matches!(
        err,
        ClientError::TokenRefresh(ref e) if e.kind() == RefreshFailure::MissingAccessToken
    ));
}

#[tokio::test]
async fn test_refresh_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server).await;

    let err = client
        .get("products/1/offers", &Params::new(), &Headers::new())
        .await
        .unwrap_err();

    let err = match err {
        ClientError::TokenRefresh(err) => err,
        other => panic!("expected a refresh error, got {:?}", other),
    };
    assert_eq!(err.status(), 503);
    assert_eq!(err.hint(), "Unknown token refresh error");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_share_one_refresh() {
    let server = MockServer::start().await;
    let token = valid_jwt();

    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": token }))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/ping"))
        .and(header("Bearer", token.as_str()))
        .respond_with(ResponseTemplate::new(200))
        .expect(8)
        .mount(&server)
        .await;

    let client = Arc::new(
        client_with(&server, Arc::new(MemoryStore::new()), uncached_config()).await,
    );

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                client.get("ping", &Params::new(), &Headers::new()).await
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_success());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_rejection() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"detail": "revoked"}))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = Arc::new(
        client_with(&server, Arc::new(MemoryStore::new()), uncached_config()).await,
    );

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                client.get("ping", &Params::new(), &Headers::new()).await
            })
        })
        .collect();

    for handle in handles {
        match handle.await.unwrap() {
            Err(ClientError::TokenRefresh(err)) => assert_eq!(err.status(), 401),
            other => panic!("expected a refresh error, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_later_call_retries_after_rejection() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server).await;

    for _ in 0..2 {
        let err = client
            .get("ping", &Params::new(), &Headers::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::TokenRefresh(_)));
    }
}

#[tokio::test]
async fn test_refresh_rejection_short_circuits_post() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(ResponseTemplate::new(422))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/products/register"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let client = client(&server).await;

    let err = client
        .post("products/register", Some(&json!({"name": "n"})), &Headers::new())
        .await
        .unwrap_err();

    let err = match err {
        ClientError::TokenRefresh(err) => err,
        other => panic!("expected a refresh error, got {:?}", other),
    };
    assert_eq!(err.status(), 422);
    assert_eq!(err.hint(), "Malformed authentication request");
}

#[tokio::test]
async fn test_forced_refresh_replaces_valid_token() {
    let server = MockServer::start().await;
    let fresh = valid_jwt();
    mount_refresh(&server, &fresh, 2).await;

    let stored = jwt(Utc::now() + chrono::Duration::hours(2));
    let store = Arc::new(MemoryStore::with_token(TOKEN_KEY, stored.as_str()));
    let client = client_with(&server, Arc::clone(&store), fast_config()).await;
    assert_eq!(client.token_manager().current_token().unwrap().expose(), stored);

    client.refresh().await.unwrap();
    client.refresh().await.unwrap();

    assert_eq!(client.token_manager().current_token().unwrap().expose(), fresh);
    assert_eq!(store.load(TOKEN_KEY).await.unwrap().unwrap().expose(), fresh);
}

#[tokio::test]
async fn test_refreshed_token_survives_new_client() {
    let server = MockServer::start().await;
    let token = valid_jwt();
    mount_refresh(&server, &token, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/ping"))
        .and(header("Bearer", token.as_str()))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());

    let first = client_with(&server, Arc::clone(&store), uncached_config()).await;
    first.get("ping", &Params::new(), &Headers::new()).await.unwrap();

    let second = client_with(&server, Arc::clone(&store), uncached_config()).await;
    second.get("ping", &Params::new(), &Headers::new()).await.unwrap();
}

#[tokio::test]
async fn test_caller_header_overrides_default() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/ping"))
        .and(header("Bearer", "caller-token"))
        .and(header("X-Test", "1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::with_token(TOKEN_KEY, valid_jwt()));
    let client = client_with(&server, store, uncached_config()).await;
    let headers = Headers::from([
        ("Bearer".to_string(), "caller-token".to_string()),
        ("X-Test".to_string(), "1".to_string()),
    ]);

    client.get("ping", &Params::new(), &headers).await.unwrap();
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let server = MockServer::start().await;
    let body = json!({"name": "Widget", "description": "A widget", "id": "42"});

    Mock::given(method("POST"))
        .and(path("/api/v1/products/register"))
        .and(body_json(body.clone()))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "42"})))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::with_token(TOKEN_KEY, valid_jwt()));
    let client = client_with(&server, store, fast_config()).await;

    let response = client
        .post("products/register", Some(&body), &Headers::new())
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    assert!(!response.is_from_cache());
    assert_eq!(response.body(), &json!({"id": "42"}));
}
