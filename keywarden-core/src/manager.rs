//! Credentials manager: storage, renewal and revocation of one credential record.
//!
//! This module provides [`CredentialsManager`], which keeps one [`Credentials`]
//! record in a [`CredentialStore`], renews it through an [`AuthClient`] when a caller
//! needs more remaining lifetime than it has, and revokes it on request.
//!
//! # Features
//!
//! - Fast path: a stored record that satisfies the caller's minTTL is returned without
//!   any network call
//! - Single-flight renewal: concurrent callers share one token exchange
//! - minTTL policy checked against the grant lifetime before any network I/O
//! - Optional biometric gate in front of every store access
//!
//! # Example
//!
//! ```rust,ignore
//! use keywarden_core::{CredentialsManager, HttpAuthClient, MemoryStore};
//!
//! let manager = CredentialsManager::new(MemoryStore::new(), HttpAuthClient::new(&endpoints)?);
//! manager.store(&credentials_from_login).await?;
//!
//! // At least five minutes of validity, renewing if needed.
//! let credentials = manager.get(300).await?;
//! println!("Access token: {}", credentials.access_token.expose());
//! ```

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::client::AuthClient;
use crate::config::ManagerConfig;
use crate::coordinator::{Flight, RefreshCoordinator, RenewalResult};
use crate::credentials::{Credentials, ScopeSet, SsoCredentials};
use crate::error::{CredentialsManagerError, ErrorCode};
use crate::gate::{BiometricAuthenticator, BiometricGate, UnlockedStore};
use crate::secret::Secret;
use crate::store::CredentialStore;

/// The stored record was replaced (by `store`, `clear` or `revoke`) while a renewal was running.
#[derive(Debug, Error)]
#[error("stored credentials were replaced while the renewal was in flight")]
pub struct SlotReplaced;

/// Which exchange was attempted; selects the error code reported on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExchangePath {
    Renew,
    Api,
    Sso,
}

impl ExchangePath {
    fn error_code(self) -> ErrorCode {
        match self {
            Self::Renew => ErrorCode::RenewFailed,
            Self::Api => ErrorCode::ApiExchangeFailed,
            Self::Sso => ErrorCode::SsoExchangeFailed,
        }
    }
}

/// Manages the lifecycle of one credential record.
///
/// Cloning is cheap and every clone shares the same store, coordinator and gate, so
/// one manager can serve any number of concurrent tasks.
///
/// # Type Parameters
///
/// * `S` - The credential store implementation to use
/// * `C` - The token endpoint client
pub struct CredentialsManager<S, C> {
    inner: Arc<Inner<S, C>>,
}

struct Inner<S, C> {
    store: Arc<S>,
    client: C,
    gate: BiometricGate,
    coordinator: RefreshCoordinator,
    /// Version of the stored record, bumped on every write. Reads hold the read
    /// lock so they never observe a write in progress.
    slot: RwLock<u64>,
    default_min_ttl: u64,
}

impl<S, C> Clone for CredentialsManager<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, C> std::fmt::Debug for CredentialsManager<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsManager")
            .field("gate", &self.inner.gate)
            .field("coordinator", &self.inner.coordinator)
            .field("default_min_ttl", &self.inner.default_min_ttl)
            .finish_non_exhaustive()
    }
}

/// Builder for [`CredentialsManager`].
pub struct CredentialsManagerBuilder<S, C> {
    store: S,
    client: C,
    gate: BiometricGate,
    default_min_ttl: u64,
}

impl<S, C> CredentialsManagerBuilder<S, C>
where
    S: CredentialStore + 'static,
    C: AuthClient + 'static,
{
    /// Require a biometric challenge before every store access.
    pub fn gate(mut self, gate: BiometricGate) -> Self {
        self.gate = gate;
        self
    }

    /// minTTL used by [`CredentialsManager::credentials`].
    pub fn default_min_ttl(mut self, min_ttl: u64) -> Self {
        self.default_min_ttl = min_ttl;
        self
    }

    /// Create the manager.
    pub fn build(self) -> CredentialsManager<S, C> {
        CredentialsManager {
            inner: Arc::new(Inner {
                store: Arc::new(self.store),
                client: self.client,
                gate: self.gate,
                coordinator: RefreshCoordinator::new(),
                slot: RwLock::new(0),
                default_min_ttl: self.default_min_ttl,
            }),
        }
    }
}

impl<S, C> CredentialsManager<S, C>
where
    S: CredentialStore + 'static,
    C: AuthClient + 'static,
{
    /// Create a manager without a biometric gate.
    pub fn new(store: S, client: C) -> Self {
        Self::builder(store, client).build()
    }

    /// Start building a manager over `store` and `client`.
    pub fn builder(store: S, client: C) -> CredentialsManagerBuilder<S, C> {
        CredentialsManagerBuilder {
            store,
            client,
            gate: BiometricGate::Disabled,
            default_min_ttl: 0,
        }
    }

    /// Create a manager from loaded configuration.
    ///
    /// A `[biometrics]` section requires an `authenticator`; configuring the prompt
    /// without one is rejected rather than silently running ungated.
    pub fn from_config(
        config: &ManagerConfig,
        store: S,
        client: C,
        authenticator: Option<Arc<dyn BiometricAuthenticator>>,
    ) -> anyhow::Result<Self> {
        let gate = match (&config.biometrics, authenticator) {
            (Some(prompt), Some(authenticator)) => BiometricGate::Enabled {
                authenticator,
                prompt: prompt.clone(),
            },
            (Some(_), None) => {
                anyhow::bail!("biometrics are configured but no authenticator was provided")
            }
            (None, _) => BiometricGate::Disabled,
        };

        Ok(Self::builder(store, client)
            .gate(gate)
            .default_min_ttl(config.default_min_ttl)
            .build())
    }

    /// Whether a renewal is currently in flight.
    pub fn is_renewing(&self) -> bool {
        self.inner.coordinator.is_refreshing()
    }

    /// Credentials valid for at least the configured default minTTL.
    pub async fn credentials(&self) -> Result<Credentials, CredentialsManagerError> {
        self.get(self.inner.default_min_ttl).await
    }

    /// Get credentials valid for at least `min_ttl` seconds, renewing if necessary.
    ///
    /// This is the primary method consumers should use. It:
    /// 1. Loads the stored record (`NoCredentials` if there is none)
    /// 2. Returns it unchanged if it is valid for `min_ttl`
    /// 3. Fails with `NoRefreshToken` if it cannot be renewed
    /// 4. Fails with `LargeMinTtl` if `min_ttl` exceeds the grant lifetime
    /// 5. Otherwise renews (sharing any renewal already in flight), persists and
    ///    returns the new record
    pub async fn get(&self, min_ttl: u64) -> Result<Credentials, CredentialsManagerError> {
        self.retrieve(None, min_ttl, false).await
    }

    /// Like [`get`](Self::get), but the returned credentials must carry `scope`.
    ///
    /// A stored record with a different scope is renewed with `scope` even if it is
    /// still valid. Exchange failures are reported as `ApiExchangeFailed`.
    pub async fn get_with_scope(
        &self,
        scope: ScopeSet,
        min_ttl: u64,
    ) -> Result<Credentials, CredentialsManagerError> {
        self.retrieve(Some(scope), min_ttl, false).await
    }

    /// Renew the stored credentials regardless of their remaining lifetime.
    pub async fn renew(&self) -> Result<Credentials, CredentialsManagerError> {
        self.retrieve(None, 0, true).await
    }

    async fn retrieve(
        &self,
        scope: Option<ScopeSet>,
        min_ttl: u64,
        force: bool,
    ) -> Result<Credentials, CredentialsManagerError> {
        let store = self.inner.gate.unlock(&self.inner.store).await?;
        let path = if scope.is_some() {
            ExchangePath::Api
        } else {
            ExchangePath::Renew
        };

        loop {
            let epoch = self.inner.coordinator.epoch();
            let (version, stored) = self.inner.load(&store).await?;
            let credentials = stored.ok_or(CredentialsManagerError::NO_CREDENTIALS)?;

            let scope_changed = scope.as_ref().is_some_and(|scope| *scope != credentials.scope);
            if !force && !scope_changed && credentials.is_valid_at(Utc::now(), min_ttl) {
                tracing::debug!("Using stored credentials (min_ttl {}s)", min_ttl);
                return Ok(credentials);
            }

            let Some(refresh_token) = credentials.refresh_token.clone() else {
                tracing::debug!("Stored credentials need renewal but hold no refresh token");
                return Err(CredentialsManagerError::NO_REFRESH_TOKEN);
            };

            let lifetime = credentials.lifetime();
            if min_ttl > lifetime {
                tracing::warn!(
                    "Requested min_ttl {}s exceeds granted lifetime {}s",
                    min_ttl,
                    lifetime
                );
                return Err(CredentialsManagerError::large_min_ttl(min_ttl, lifetime));
            }

            let renewal = Renewal {
                inner: Arc::clone(&self.inner),
                store: store.clone(),
                previous: credentials,
                refresh_token,
                version,
                scope: scope.clone(),
                path,
            };

            let flight = self
                .inner
                .coordinator
                .join(epoch, scope.as_ref(), renewal.run())
                .await;
            match flight {
                Flight::Stale => {
                    tracing::debug!("Credentials were renewed meanwhile, re-reading store");
                }
                Flight::Completed(result) => {
                    let renewed = result?;
                    let lifetime = renewed.lifetime();
                    if min_ttl > lifetime {
                        return Err(CredentialsManagerError::large_min_ttl(min_ttl, lifetime));
                    }
                    return Ok(renewed);
                }
            }
        }
    }

    /// Exchange the refresh token for session-transfer (SSO) credentials.
    ///
    /// If the server rotates the refresh token, the stored record is updated with it.
    pub async fn sso_credentials(&self) -> Result<SsoCredentials, CredentialsManagerError> {
        let store = self.inner.gate.unlock(&self.inner.store).await?;
        let (version, stored) = self.inner.load(&store).await?;
        let credentials = stored.ok_or(CredentialsManagerError::NO_CREDENTIALS)?;
        let refresh_token = credentials
            .refresh_token
            .clone()
            .ok_or(CredentialsManagerError::NO_REFRESH_TOKEN)?;

        tracing::info!("Exchanging refresh token for SSO credentials");
        let sso = self
            .inner
            .client
            .exchange_for_sso(&refresh_token)
            .await
            .map_err(|e| {
                tracing::error!("Failed to exchange refresh token for SSO credentials: {}", e);
                CredentialsManagerError::with_cause(ExchangePath::Sso.error_code(), e)
            })?;

        if let Some(rotated) = sso.refresh_token.as_ref().filter(|r| **r != refresh_token) {
            let mut updated = credentials;
            updated.refresh_token = Some(rotated.clone());
            self.inner.persist(&store, Some(version), &updated).await?;
            tracing::debug!("Stored rotated refresh token");
        }

        Ok(sso)
    }

    /// Store a new credential record, replacing any existing one.
    ///
    /// Called after an initial login performed outside the manager.
    pub async fn store(&self, credentials: &Credentials) -> Result<(), CredentialsManagerError> {
        let store = self.inner.gate.unlock(&self.inner.store).await?;
        self.inner.persist(&store, None, credentials).await
    }

    /// Remove the stored record. Clearing an empty store succeeds.
    pub async fn clear(&self) -> Result<(), CredentialsManagerError> {
        let store = self.inner.gate.unlock(&self.inner.store).await?;
        self.inner.clear_slot(&store).await?;
        tracing::info!("Cleared stored credentials");
        Ok(())
    }

    /// Revoke the refresh token and remove the stored record.
    ///
    /// This:
    /// 1. Revokes the refresh token with the server, if there is one
    /// 2. Removes the record locally, even if step 1 failed
    ///
    /// A failed server call is reported as `RevokeFailed` after the local cleanup.
    /// A record that cannot be read is removed without contacting the server.
    pub async fn revoke(&self) -> Result<(), CredentialsManagerError> {
        let store = self.inner.gate.unlock(&self.inner.store).await?;
        let stored = match self.inner.load(&store).await {
            Ok((_, stored)) => stored,
            Err(e) => {
                tracing::warn!("Stored credentials unreadable, clearing without revocation: {}", e);
                None
            }
        };

        let Some(refresh_token) = stored.and_then(|credentials| credentials.refresh_token) else {
            tracing::debug!("No refresh token to revoke, clearing stored credentials");
            return self.inner.clear_slot(&store).await;
        };

        let remote = self.inner.client.revoke_refresh_token(&refresh_token).await;
        let local = self.inner.clear_slot(&store).await;

        match remote {
            Ok(()) => {
                local?;
                tracing::info!("Revoked refresh token and cleared stored credentials");
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Failed to revoke refresh token: {}", e);
                if let Err(local) = local {
                    tracing::error!("Failed to clear stored credentials after revocation: {}", local);
                }
                Err(CredentialsManagerError::with_cause(ErrorCode::RevokeFailed, e))
            }
        }
    }

    /// Whether the stored record is valid for `min_ttl` seconds without renewal.
    pub async fn has_valid(&self, min_ttl: u64) -> Result<bool, CredentialsManagerError> {
        let store = self.inner.gate.unlock(&self.inner.store).await?;
        let (_, stored) = self.inner.load(&store).await?;
        Ok(stored.is_some_and(|credentials| credentials.is_valid(min_ttl)))
    }

    /// Whether a stored record exists and holds a refresh token.
    pub async fn can_renew(&self) -> Result<bool, CredentialsManagerError> {
        let store = self.inner.gate.unlock(&self.inner.store).await?;
        let (_, stored) = self.inner.load(&store).await?;
        Ok(stored.is_some_and(|credentials| credentials.can_renew()))
    }
}

impl<S: CredentialStore, C> Inner<S, C> {
    /// Load the record together with the slot version it was read at.
    async fn load(
        &self,
        store: &UnlockedStore<S>,
    ) -> Result<(u64, Option<Credentials>), CredentialsManagerError> {
        let version = self.slot.read().await;
        let bytes = store.load().await.map_err(|e| {
            tracing::error!("Failed to load stored credentials: {}", e);
            CredentialsManagerError::with_cause(ErrorCode::NoCredentials, e)
        })?;

        let credentials = match bytes {
            Some(bytes) => Some(Credentials::from_bytes(&bytes).map_err(|e| {
                tracing::error!("Stored credentials could not be decoded: {}", e);
                CredentialsManagerError::with_cause(ErrorCode::NoCredentials, e)
            })?),
            None => None,
        };

        Ok((*version, credentials))
    }

    /// Write `credentials`; with `expected_version`, only if the slot is unchanged since that read.
    async fn persist(
        &self,
        store: &UnlockedStore<S>,
        expected_version: Option<u64>,
        credentials: &Credentials,
    ) -> Result<(), CredentialsManagerError> {
        let bytes = credentials
            .to_bytes()
            .map_err(|e| CredentialsManagerError::with_cause(ErrorCode::StoreFailed, e))?;

        let mut version = self.slot.write().await;
        if expected_version.is_some_and(|expected| expected != *version) {
            tracing::warn!("Stored credentials changed during renewal, discarding renewed record");
            return Err(CredentialsManagerError::with_cause(
                ErrorCode::StoreFailed,
                SlotReplaced,
            ));
        }

        store.save(&bytes).await.map_err(|e| {
            tracing::error!("Failed to store credentials: {}", e);
            CredentialsManagerError::with_cause(ErrorCode::StoreFailed, e)
        })?;
        *version = version.wrapping_add(1);

        tracing::debug!("Stored credentials (expires at {})", credentials.expires_at);
        Ok(())
    }

    async fn clear_slot(&self, store: &UnlockedStore<S>) -> Result<(), CredentialsManagerError> {
        let mut version = self.slot.write().await;
        store.clear().await.map_err(|e| {
            tracing::error!("Failed to clear stored credentials: {}", e);
            CredentialsManagerError::with_cause(ErrorCode::StoreFailed, e)
        })?;
        *version = version.wrapping_add(1);
        Ok(())
    }
}

/// One token exchange plus persistence, run by the coordinator's leader task.
struct Renewal<S, C> {
    inner: Arc<Inner<S, C>>,
    store: UnlockedStore<S>,
    previous: Credentials,
    refresh_token: Secret,
    version: u64,
    scope: Option<ScopeSet>,
    path: ExchangePath,
}

impl<S, C> Renewal<S, C>
where
    S: CredentialStore + 'static,
    C: AuthClient + 'static,
{
    async fn run(self) -> RenewalResult {
        tracing::info!("Renewing credentials (expired at {})", self.previous.expires_at);

        let exchanged = self
            .inner
            .client
            .exchange_refresh_token(&self.refresh_token, self.scope.as_ref())
            .await
            .map_err(|e| {
                tracing::error!("Failed to renew credentials: {}", e);
                CredentialsManagerError::with_cause(self.path.error_code(), e)
            })?;

        let renewed = self.previous.merge_renewal(exchanged);
        self.inner
            .persist(&self.store, Some(self.version), &renewed)
            .await?;

        tracing::info!("Successfully renewed credentials");
        Ok(renewed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::Duration;

    /// Client for tests that must never reach the network.
    struct OfflineClient;

    #[async_trait]
    impl AuthClient for OfflineClient {
        async fn exchange_refresh_token(
            &self,
            _refresh_token: &Secret,
            _scope: Option<&ScopeSet>,
        ) -> Result<Credentials, ClientError> {
            panic!("unexpected token exchange");
        }

        async fn exchange_for_sso(
            &self,
            _refresh_token: &Secret,
        ) -> Result<SsoCredentials, ClientError> {
            panic!("unexpected SSO exchange");
        }

        async fn revoke_refresh_token(&self, _refresh_token: &Secret) -> Result<(), ClientError> {
            panic!("unexpected revocation");
        }
    }

    fn manager() -> CredentialsManager<MemoryStore, OfflineClient> {
        CredentialsManager::new(MemoryStore::new(), OfflineClient)
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let result = manager().get(0).await;
        assert_eq!(result.unwrap_err(), CredentialsManagerError::NO_CREDENTIALS);
    }

    #[tokio::test]
    async fn test_store_and_get_valid() {
        let manager = manager();
        let credentials = Credentials::new("valid-token", Utc::now() + Duration::hours(1))
            .with_refresh_token("refresh-token");

        manager.store(&credentials).await.unwrap();

        let retrieved = manager.get(60).await.unwrap();
        assert_eq!(retrieved, credentials);
        assert!(manager.has_valid(60).await.unwrap());
        assert!(manager.can_renew().await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_record_reports_no_credentials_with_cause() {
        let manager = CredentialsManager::new(MemoryStore::with_bytes(b"not json".to_vec()), OfflineClient);

        let error = manager.get(0).await.unwrap_err();
        assert_eq!(error, CredentialsManagerError::NO_CREDENTIALS);
        assert!(error.cause().is_some());
    }

    #[tokio::test]
    async fn test_default_min_ttl_applies_to_credentials() {
        let manager = CredentialsManager::builder(MemoryStore::new(), OfflineClient)
            .default_min_ttl(7200)
            .build();
        let now = Utc::now();
        let credentials = Credentials::new("token", now + Duration::hours(1)).with_issued_at(now);
        manager.store(&credentials).await.unwrap();

        assert!(manager.get(60).await.is_ok());
        assert_eq!(
            manager.credentials().await.unwrap_err(),
            CredentialsManagerError::NO_REFRESH_TOKEN
        );
    }

    #[tokio::test]
    async fn test_from_config_requires_authenticator_for_biometrics() {
        let config = ManagerConfig {
            biometrics: Some(crate::gate::BiometricPrompt::new("Unlock")),
            ..ManagerConfig::default()
        };

        let result = CredentialsManager::from_config(&config, MemoryStore::new(), OfflineClient, None);
        assert!(result.is_err());

        let ungated = CredentialsManager::from_config(
            &ManagerConfig::default(),
            MemoryStore::new(),
            OfflineClient,
            None,
        )
        .unwrap();
        assert!(!ungated.inner.gate.is_enabled());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let manager = manager();
        let clone = manager.clone();

        clone
            .store(&Credentials::new("shared", Utc::now() + Duration::hours(1)))
            .await
            .unwrap();

        assert_eq!(manager.get(0).await.unwrap().access_token.expose(), "shared");
    }
}
