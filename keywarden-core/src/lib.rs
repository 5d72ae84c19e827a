//! # Keywarden Core
//!
//! Credentials manager core for OAuth/OIDC client applications.
//!
//! This crate provides:
//! - [`Credentials`] - The stored token record and its validity window
//! - [`CredentialsManager`] - Storage, single-flight renewal and revocation of that record
//! - [`CredentialStore`] - Trait for secure storage, with in-memory and keyring backends
//! - [`BiometricGate`] - Optional biometric precondition for store access
//! - [`CredentialsManagerError`] - The closed error taxonomy shared by all operations
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use keywarden_core::{CredentialsManager, CredentialsManagerError};
//!
//! async fn bearer(manager: &CredentialsManager<impl CredentialStore, impl AuthClient>)
//!     -> Result<String, CredentialsManagerError>
//! {
//!     let credentials = manager.get(60).await?;
//!     Ok(credentials.access_token.expose().to_string())
//! }
//! ```

pub mod client;
pub mod config;
pub mod coordinator;
pub mod credentials;
pub mod error;
pub mod gate;
pub mod manager;
pub mod secret;
pub mod store;

// Re-export commonly used types at crate root
pub use client::{
    AuthClient,
    ClientError,
};

#[cfg(feature = "oauth")]
pub use client::HttpAuthClient;

pub use config::{
    AuthEndpoints,
    ManagerConfig,
    StoreConfig,
    load_config,
    load_config_from_path,
};

pub use coordinator::{
    RefreshCoordinator,
    RenewalAborted,
};

pub use credentials::{
    Credentials,
    ScopeSet,
    SsoCredentials,
};

pub use error::{
    BoxError,
    CredentialsManagerError,
    ErrorCode,
};

pub use gate::{
    BiometricAuthenticator,
    BiometricGate,
    BiometricPolicy,
    BiometricPrompt,
};

pub use manager::{
    CredentialsManager,
    CredentialsManagerBuilder,
    SlotReplaced,
};

pub use secret::Secret;

pub use store::{
    CredentialStore,
    MemoryStore,
    StoreError,
    create_store,
};

#[cfg(feature = "keyring-store")]
pub use store::KeyringStore;
