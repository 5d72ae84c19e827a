//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use keywarden_core::{
    AuthClient, BiometricAuthenticator, BiometricPrompt, BoxError, ClientError, CredentialStore,
    Credentials, CredentialsManager, MemoryStore, ScopeSet, Secret, SsoCredentials, StoreError,
};
use parking_lot::Mutex;
use zeroize::Zeroizing;

/// Scriptable [`AuthClient`] that counts its calls.
#[derive(Clone)]
pub struct MockClient {
    pub exchanges: Arc<AtomicUsize>,
    pub sso_exchanges: Arc<AtomicUsize>,
    pub revocations: Arc<AtomicUsize>,
    pub last_scope: Arc<Mutex<Option<ScopeSet>>>,
    /// Time each call takes (tokio clock).
    pub latency: std::time::Duration,
    /// Lifetime in seconds of the credentials the server grants.
    pub granted_lifetime: i64,
    pub rotate_refresh_token: bool,
    pub fail_exchange: bool,
    pub fail_revoke: bool,
}

impl Default for MockClient {
    fn default() -> Self {
        Self {
            exchanges: Arc::new(AtomicUsize::new(0)),
            sso_exchanges: Arc::new(AtomicUsize::new(0)),
            revocations: Arc::new(AtomicUsize::new(0)),
            last_scope: Arc::new(Mutex::new(None)),
            latency: std::time::Duration::ZERO,
            granted_lifetime: 3600,
            rotate_refresh_token: true,
            fail_exchange: false,
            fail_revoke: false,
        }
    }
}

impl MockClient {
    pub fn exchange_count(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    pub fn sso_count(&self) -> usize {
        self.sso_exchanges.load(Ordering::SeqCst)
    }

    pub fn revoke_count(&self) -> usize {
        self.revocations.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

fn invalid_grant() -> ClientError {
    ClientError::Server {
        status: 400,
        error: "invalid_grant".to_string(),
        description: Some("Unknown or invalid refresh token.".to_string()),
    }
}

#[async_trait]
impl AuthClient for MockClient {
    async fn exchange_refresh_token(
        &self,
        _refresh_token: &Secret,
        scope: Option<&ScopeSet>,
    ) -> Result<Credentials, ClientError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        *self.last_scope.lock() = scope.cloned();
        self.simulate_latency().await;

        if self.fail_exchange {
            return Err(invalid_grant());
        }

        let now = Utc::now();
        let mut credentials = Credentials::new(
            "renewed-access-token",
            now + Duration::seconds(self.granted_lifetime),
        )
        .with_issued_at(now);
        if let Some(scope) = scope {
            credentials = credentials.with_scope(scope.clone());
        }
        if self.rotate_refresh_token {
            credentials = credentials.with_refresh_token("new-refresh-token");
        }
        Ok(credentials)
    }

    async fn exchange_for_sso(&self, _refresh_token: &Secret) -> Result<SsoCredentials, ClientError> {
        self.sso_exchanges.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if self.fail_exchange {
            return Err(invalid_grant());
        }

        Ok(SsoCredentials {
            session_transfer_token: Secret::new("session-transfer-token"),
            issued_token_type: "urn:auth0:params:oauth:token-type:session_transfer_token"
                .to_string(),
            expires_at: Utc::now() + Duration::seconds(60),
            id_token: None,
            refresh_token: self
                .rotate_refresh_token
                .then(|| Secret::new("sso-rotated-refresh-token")),
        })
    }

    async fn revoke_refresh_token(&self, _refresh_token: &Secret) -> Result<(), ClientError> {
        self.revocations.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if self.fail_revoke {
            return Err(ClientError::Network {
                message: "connection reset".to_string(),
            });
        }
        Ok(())
    }
}

/// [`MemoryStore`] wrapper that counts accesses and can be told to fail writes.
#[derive(Default)]
pub struct InstrumentedStore {
    inner: MemoryStore,
    pub accesses: Arc<AtomicUsize>,
    pub fail_saves: Arc<AtomicBool>,
}

#[async_trait]
impl CredentialStore for InstrumentedStore {
    async fn save(&self, bytes: &[u8]) -> Result<(), StoreError> {
        self.accesses.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::BackendError {
                message: "keychain write denied".to_string(),
            });
        }
        self.inner.save(bytes).await
    }

    async fn load(&self) -> Result<Option<Zeroizing<Vec<u8>>>, StoreError> {
        self.accesses.fetch_add(1, Ordering::SeqCst);
        self.inner.load().await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.accesses.fetch_add(1, Ordering::SeqCst);
        self.inner.clear().await
    }
}

/// Authenticator that counts prompts and succeeds or fails as configured.
pub struct MockAuthenticator {
    pub prompts: Arc<AtomicUsize>,
    pub succeed: bool,
}

#[async_trait]
impl BiometricAuthenticator for MockAuthenticator {
    async fn authenticate(&self, _prompt: &BiometricPrompt) -> Result<(), BoxError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        if self.succeed {
            Ok(())
        } else {
            Err("biometry lockout".into())
        }
    }
}

/// A renewable record that expired `expired_for` seconds ago after a grant of `lifetime` seconds.
pub fn expired_record(lifetime: i64, expired_for: i64) -> Credentials {
    let expires_at = Utc::now() - Duration::seconds(expired_for);
    Credentials::new("expired-access-token", expires_at)
        .with_issued_at(expires_at - Duration::seconds(lifetime))
        .with_refresh_token("old-refresh-token")
        .with_id_token("old-id-token")
        .with_scope(ScopeSet::parse("openid profile offline_access"))
}

/// A renewable record issued now and valid for `lifetime` seconds.
pub fn fresh_record(lifetime: i64) -> Credentials {
    let now = Utc::now();
    Credentials::new("fresh-access-token", now + Duration::seconds(lifetime))
        .with_issued_at(now)
        .with_refresh_token("old-refresh-token")
        .with_scope(ScopeSet::parse("openid profile offline_access"))
}

/// Manager over a memory store already holding `record`.
pub async fn seeded_manager(
    client: MockClient,
    record: &Credentials,
) -> CredentialsManager<MemoryStore, MockClient> {
    let manager = CredentialsManager::new(MemoryStore::new(), client);
    manager.store(record).await.unwrap();
    manager
}
