//! OS keyring-backed credential storage implementation.

use async_trait::async_trait;
use keyring::Entry;
use zeroize::Zeroizing;

use super::{CredentialStore, StoreError};

/// OS keyring-backed credential store.
///
/// This store uses the platform's native keyring service:
/// - macOS: Keychain
/// - Linux: Secret Service API (via libsecret)
/// - Windows: Credential Manager
///
/// The record lives in a single entry identified by `service` and `account`.
///
/// # Example
///
/// ```rust,ignore
/// use keywarden_core::store::{CredentialStore, KeyringStore};
///
/// let store = KeyringStore::try_new("keywarden", "credentials").unwrap();
/// store.save(b"{...}").await.unwrap();
/// ```
pub struct KeyringStore {
    service: String,
    account: String,
    entry: Entry,
}

impl KeyringStore {
    /// Try to create a new keyring store.
    ///
    /// Returns an error if the keyring backend is not available on this platform.
    pub fn try_new(service: &str, account: &str) -> Result<Self, StoreError> {
        let entry = Entry::new(service, account).map_err(|e| StoreError::KeyringUnavailable {
            message: format!("keyring backend not available: {}", e),
        })?;

        Ok(Self {
            service: service.to_string(),
            account: account.to_string(),
            entry,
        })
    }
}

impl std::fmt::Debug for KeyringStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringStore")
            .field("service", &self.service)
            .field("account", &self.account)
            .finish()
    }
}

fn backend_error(action: &str, error: keyring::Error) -> StoreError {
    match error {
        keyring::Error::NoStorageAccess(e) => StoreError::AccessDenied {
            message: format!("cannot {} keyring entry: {}", action, e),
        },
        keyring::Error::PlatformFailure(e) => StoreError::BackendError {
            message: format!("platform keyring failure during {}: {}", action, e),
        },
        e => StoreError::BackendError {
            message: format!("failed to {} keyring entry: {}", action, e),
        },
    }
}

#[async_trait]
impl CredentialStore for KeyringStore {
    async fn save(&self, bytes: &[u8]) -> Result<(), StoreError> {
        self.entry
            .set_secret(bytes)
            .map_err(|e| backend_error("write", e))
    }

    async fn load(&self) -> Result<Option<Zeroizing<Vec<u8>>>, StoreError> {
        match self.entry.get_secret() {
            Ok(bytes) => Ok(Some(Zeroizing::new(bytes))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(backend_error("read", e)),
        }
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match self.entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()), // Idempotent delete
            Err(e) => Err(backend_error("delete", e)),
        }
    }
}
