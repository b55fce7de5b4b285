mod common;

use std::sync::Arc;

use common::*;
use paygate_core::provider::{InMemoryTokenCache, ProviderClient, ProviderError};

#[tokio::test]
async fn test_circuit_breaker_opens_after_consecutive_failures() {
    let mut server = mockito::Server::new_async().await;
    let auth = server
        .mock("POST", "/auth/tokens")
        .with_status(500)
        .expect(2)
        .create_async()
        .await;

    let mut config = provider_config(&server.url());
    config.circuit_breaker_threshold = 2;
    let client = ProviderClient::new(config, Arc::new(InMemoryTokenCache::new()));
    assert_eq!(client.circuit_state(), "closed");

    for _ in 0..2 {
        let err = client.get_auth_token().await.unwrap_err();
        assert!(matches!(err, ProviderError::Status { status: 500, .. }));
    }

    // Rejected locally, the server sees no third call
    let err = client.get_auth_token().await.unwrap_err();
    assert!(matches!(err, ProviderError::CircuitBreakerOpen(_)));
    assert_eq!(client.circuit_state(), "open");
    auth.assert_async().await;
}

#[tokio::test]
async fn test_unreachable_provider_is_request_error() {
    let client = ProviderClient::new(
        provider_config("http://127.0.0.1:9"),
        Arc::new(InMemoryTokenCache::new()),
    );

    let err = client.get_auth_token().await.unwrap_err();
    assert!(matches!(err, ProviderError::Request { .. }));
}

#[tokio::test]
async fn test_token_shared_across_clients_through_cache() {
    let mut server = mockito::Server::new_async().await;
    let auth = server
        .mock("POST", "/auth/tokens")
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"token": "bearer-1"}"#)
        .expect(1)
        .create_async()
        .await;

    let cache = Arc::new(InMemoryTokenCache::new());
    let first = ProviderClient::new(provider_config(&server.url()), cache.clone());
    let second = ProviderClient::new(provider_config(&server.url()), cache);

    assert_eq!(first.get_auth_token().await.unwrap(), "bearer-1");
    assert_eq!(second.get_auth_token().await.unwrap(), "bearer-1");
    auth.assert_async().await;
}
