//! Secure storage abstraction for the credential record.
//!
//! This module provides:
//! - [`CredentialStore`] - Trait for byte-level storage backends holding one record
//! - [`MemoryStore`] - In-memory implementation for testing
//! - [`KeyringStore`] - OS keyring implementation (with `keyring-store` feature)
//! - [`create_store`] - Helper to select backend based on availability
//!
//! The store never interprets the bytes it holds; serialization of
//! [`Credentials`](crate::Credentials) belongs to the manager.
//!
//! # Example
//!
//! ```rust,ignore
//! use keywarden_core::store::{CredentialStore, MemoryStore};
//!
//! let store = MemoryStore::new();
//! store.save(b"{...}").await.unwrap();
//!
//! let bytes = store.load().await.unwrap();
//! assert!(bytes.is_some());
//! ```

use async_trait::async_trait;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::config::StoreConfig;

mod memory;
#[cfg(feature = "keyring-store")]
mod keyring;

pub use memory::MemoryStore;
#[cfg(feature = "keyring-store")]
pub use keyring::KeyringStore;

/// Error type for secret store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Access to the stored entry was denied.
    #[error("access denied to stored credentials: {message}")]
    AccessDenied { message: String },

    /// The storage backend encountered an error.
    #[error("backend error: {message}")]
    BackendError { message: String },

    /// The keyring backend is not available.
    #[error("keyring not available: {message}")]
    KeyringUnavailable { message: String },
}

/// Durable storage for one serialized credential record.
///
/// Each call is atomic on its own; callers must not assume transactions across calls.
///
/// Implementations include:
/// - [`MemoryStore`] - In-memory storage for testing
/// - [`KeyringStore`] (with `keyring-store` feature) - OS keyring
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Persist the record bytes, overwriting any previous value.
    async fn save(&self, bytes: &[u8]) -> Result<(), StoreError>;

    /// Load the record bytes.
    ///
    /// Returns `Ok(None)` if nothing is stored.
    async fn load(&self) -> Result<Option<Zeroizing<Vec<u8>>>, StoreError>;

    /// Remove the stored record.
    ///
    /// Returns `Ok(())` even if nothing was stored.
    async fn clear(&self) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: CredentialStore + ?Sized> CredentialStore for Box<T> {
    async fn save(&self, bytes: &[u8]) -> Result<(), StoreError> {
        (**self).save(bytes).await
    }

    async fn load(&self) -> Result<Option<Zeroizing<Vec<u8>>>, StoreError> {
        (**self).load().await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        (**self).clear().await
    }
}

/// Create a credential store with automatic backend selection.
///
/// - If `config.prefer_keyring` is `true` and the `keyring-store` feature is enabled,
///   attempts a [`KeyringStore`] for `config.service`/`config.account` and falls back
///   to [`MemoryStore`] with a warning if the keyring is unavailable.
/// - Otherwise returns a [`MemoryStore`].
pub fn create_store(config: &StoreConfig) -> Box<dyn CredentialStore> {
    #[cfg(feature = "keyring-store")]
    if config.prefer_keyring {
        match KeyringStore::try_new(&config.service, &config.account) {
            Ok(store) => {
                tracing::info!("Using OS keyring for credential storage");
                return Box::new(store);
            }
            Err(e) => {
                tracing::warn!(
                    "Keyring unavailable ({}), falling back to memory store. \
                     Credentials will not persist across restarts.",
                    e
                );
            }
        }
    }

    #[cfg(not(feature = "keyring-store"))]
    if config.prefer_keyring {
        tracing::warn!(
            "Keyring storage requested but keyring-store feature not enabled. \
             Using memory store. Credentials will not persist across restarts."
        );
    }

    tracing::debug!("Using in-memory credential storage");
    Box::new(MemoryStore::new())
}
