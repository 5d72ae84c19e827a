//! Biometric gate in front of the credential store.
//!
//! The gate is the only way to obtain an [`UnlockedStore`], so every manager
//! operation that touches the store passes through it. A disabled gate hands the
//! store out directly; an enabled gate first runs one challenge through the
//! configured [`BiometricAuthenticator`] and refuses access if it fails.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{BoxError, CredentialsManagerError, ErrorCode};
use crate::store::{CredentialStore, StoreError};

/// Which factors satisfy the challenge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiometricPolicy {
    /// Biometrics only.
    #[default]
    Biometrics,
    /// Biometrics, or the device passcode as fallback.
    BiometricsOrPasscode,
}

/// Text and policy shown by the platform prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiometricPrompt {
    /// Reason displayed to the user.
    pub title: String,

    #[serde(default)]
    pub cancel_title: Option<String>,

    #[serde(default)]
    pub fallback_title: Option<String>,

    #[serde(default)]
    pub policy: BiometricPolicy,
}

impl BiometricPrompt {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            cancel_title: None,
            fallback_title: None,
            policy: BiometricPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: BiometricPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Platform biometric/passcode provider.
#[async_trait]
pub trait BiometricAuthenticator: Send + Sync {
    /// Run one blocking challenge. `Ok(())` means the user was authenticated.
    async fn authenticate(&self, prompt: &BiometricPrompt) -> Result<(), BoxError>;
}

/// Optional biometric precondition, fixed for the lifetime of a manager.
#[derive(Clone, Default)]
pub enum BiometricGate {
    /// Store access proceeds directly.
    #[default]
    Disabled,
    /// Store access requires a successful challenge.
    Enabled {
        authenticator: Arc<dyn BiometricAuthenticator>,
        prompt: BiometricPrompt,
    },
}

impl BiometricGate {
    /// Create an enabled gate.
    pub fn enabled(
        authenticator: impl BiometricAuthenticator + 'static,
        prompt: BiometricPrompt,
    ) -> Self {
        Self::Enabled {
            authenticator: Arc::new(authenticator),
            prompt,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled { .. })
    }

    /// Authenticate if required, then hand out access to `store`.
    ///
    /// On failure returns [`ErrorCode::BiometricsFailed`] with the platform error as
    /// cause; the store is not touched.
    pub(crate) async fn unlock<S: CredentialStore>(
        &self,
        store: &Arc<S>,
    ) -> Result<UnlockedStore<S>, CredentialsManagerError> {
        if let Self::Enabled {
            authenticator,
            prompt,
        } = self
        {
            authenticator.authenticate(prompt).await.map_err(|e| {
                tracing::warn!("Biometric authentication failed: {}", e);
                CredentialsManagerError::with_cause(ErrorCode::BiometricsFailed, e)
            })?;
            tracing::debug!("Biometric authentication succeeded");
        }

        Ok(UnlockedStore {
            store: Arc::clone(store),
        })
    }
}

impl std::fmt::Debug for BiometricGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => f.write_str("BiometricGate::Disabled"),
            Self::Enabled { prompt, .. } => f
                .debug_struct("BiometricGate::Enabled")
                .field("prompt", prompt)
                .finish(),
        }
    }
}

/// Store access granted by [`BiometricGate::unlock`].
pub(crate) struct UnlockedStore<S> {
    store: Arc<S>,
}

impl<S> Clone for UnlockedStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: CredentialStore> UnlockedStore<S> {
    pub(crate) async fn save(&self, bytes: &[u8]) -> Result<(), StoreError> {
        self.store.save(bytes).await
    }

    pub(crate) async fn load(&self) -> Result<Option<Zeroizing<Vec<u8>>>, StoreError> {
        self.store.load().await
    }

    pub(crate) async fn clear(&self) -> Result<(), StoreError> {
        self.store.clear().await
    }
}
