//! Integration tests for the HTTP token endpoint client.
//!
//! These tests run the CredentialsManager against a mock OAuth server and verify:
//! - The refresh-token grant and revocation request bodies
//! - Decoding of token, SSO and error responses
//! - Error codes surfaced for server rejections

#![cfg(feature = "oauth")]

use chrono::{Duration, Utc};
use keywarden_core::{
    AuthClient, AuthEndpoints, ClientError, Credentials, CredentialsManager,
    CredentialsManagerError, HttpAuthClient, MemoryStore, ScopeSet, Secret,
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, method, path},
};

/// Helper to create endpoints pointing at the mock server.
fn endpoints(server: &MockServer) -> AuthEndpoints {
    AuthEndpoints {
        token_url: format!("{}/oauth/token", server.uri()),
        revoke_url: Some(format!("{}/oauth/revoke", server.uri())),
        client_id: "test-client-id".to_string(),
        sso_audience: Some("https://sso.example.com".to_string()),
    }
}

/// Helper to set up a manager holding an expired, renewable record.
async fn setup_manager(server: &MockServer) -> CredentialsManager<MemoryStore, HttpAuthClient> {
    let client = HttpAuthClient::new(&endpoints(server)).unwrap();
    let manager = CredentialsManager::new(MemoryStore::new(), client);

    let expires_at = Utc::now() - Duration::hours(1);
    let expired = Credentials::new("expired-access-token", expires_at)
        .with_issued_at(expires_at - Duration::hours(1))
        .with_refresh_token("old-refresh-token")
        .with_scope(ScopeSet::parse("openid offline_access"));
    manager.store(&expired).await.unwrap();

    manager
}

#[tokio::test]
async fn test_renewal_posts_refresh_token_grant() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("client_id=test-client-id"))
        .and(body_string_contains("refresh_token=old-refresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "new-access-token",
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": "new-refresh-token",
            "id_token": "new-id-token",
            "scope": "openid offline_access"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let manager = setup_manager(&server).await;

    let renewed = manager.get(60).await.unwrap();
    assert_eq!(renewed.access_token.expose(), "new-access-token");
    assert_eq!(
        renewed.refresh_token.as_ref().map(|t| t.expose()),
        Some("new-refresh-token")
    );
    assert_eq!(renewed.id_token.as_ref().map(|t| t.expose()), Some("new-id-token"));
    assert_eq!(renewed.lifetime(), 3600);

    // Persisted: the second call is served from the store.
    assert_eq!(manager.get(60).await.unwrap(), renewed);
}

#[tokio::test]
async fn test_renewal_without_rotation_keeps_refresh_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "new-access-token",
            "expires_in": 3600
        })))
        .mount(&server)
        .await;

    let manager = setup_manager(&server).await;

    let renewed = manager.get(0).await.unwrap();
    assert_eq!(renewed.token_type, "Bearer");
    assert_eq!(
        renewed.refresh_token.as_ref().map(|t| t.expose()),
        Some("old-refresh-token")
    );
    assert_eq!(renewed.scope, ScopeSet::parse("openid offline_access"));
}

#[tokio::test]
async fn test_rejected_renewal_reports_renew_failed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Unknown or invalid refresh token."
        })))
        .mount(&server)
        .await;

    let manager = setup_manager(&server).await;

    let error = manager.get(60).await.unwrap_err();
    assert_eq!(error, CredentialsManagerError::RENEW_FAILED);

    let cause = error.cause().expect("server error should be kept as cause");
    match cause.downcast_ref::<ClientError>() {
        Some(ClientError::Server {
            status,
            error,
            description,
        }) => {
            assert_eq!(*status, 403);
            assert_eq!(error, "invalid_grant");
            assert_eq!(description.as_deref(), Some("Unknown or invalid refresh token."));
        }
        other => panic!("Expected ClientError::Server, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_response_is_invalid_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let client = HttpAuthClient::new(&endpoints(&server)).unwrap();
    let result = client
        .exchange_refresh_token(&Secret::new("refresh-token"), None)
        .await;

    assert!(
        matches!(result, Err(ClientError::InvalidResponse { .. })),
        "Expected InvalidResponse, got {:?}",
        result
    );
}

#[tokio::test]
async fn test_scoped_renewal_sends_scope() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("scope=openid+read%3Amessages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "scoped-access-token",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let manager = setup_manager(&server).await;
    let requested = ScopeSet::parse("openid read:messages");

    let credentials = manager.get_with_scope(requested.clone(), 60).await.unwrap();
    assert_eq!(credentials.access_token.expose(), "scoped-access-token");
    assert_eq!(credentials.scope, requested);
}

#[tokio::test]
async fn test_sso_exchange_sends_audience() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("audience=https%3A%2F%2Fsso.example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "session-transfer-token",
            "issued_token_type": "urn:auth0:params:oauth:token-type:session_transfer_token",
            "expires_in": 60,
            "refresh_token": "rotated-refresh-token"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let manager = setup_manager(&server).await;

    let sso = manager.sso_credentials().await.unwrap();
    assert_eq!(sso.session_transfer_token.expose(), "session-transfer-token");
    assert_eq!(
        sso.issued_token_type,
        "urn:auth0:params:oauth:token-type:session_transfer_token"
    );
    assert!(manager.can_renew().await.unwrap());
}

#[tokio::test]
async fn test_revoke_posts_refresh_token_and_clears() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/revoke"))
        .and(body_string_contains("token=old-refresh-token"))
        .and(body_string_contains("token_type_hint=refresh_token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let manager = setup_manager(&server).await;

    manager.revoke().await.unwrap();
    assert_eq!(
        manager.get(0).await.unwrap_err(),
        CredentialsManagerError::NO_CREDENTIALS
    );
}

#[tokio::test]
async fn test_rejected_revoke_reports_revoke_failed_and_clears() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/revoke"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let manager = setup_manager(&server).await;

    let error = manager.revoke().await.unwrap_err();
    assert_eq!(error, CredentialsManagerError::REVOKE_FAILED);
    assert!(error.to_string().contains("503"));
    assert_eq!(
        manager.get(0).await.unwrap_err(),
        CredentialsManagerError::NO_CREDENTIALS
    );
}
