//! Token endpoint client consumed by the credentials manager.
//!
//! This module provides:
//! - [`AuthClient`] - Trait for refresh token exchange and revocation
//! - [`ClientError`] - Errors surfaced by client implementations
//! - [`HttpAuthClient`] - `reqwest` implementation (with `oauth` feature)
//!
//! The manager treats every [`ClientError`] opaquely and attaches it as the cause
//! of the corresponding [`CredentialsManagerError`](crate::CredentialsManagerError).

use async_trait::async_trait;
use thiserror::Error;

use crate::credentials::{Credentials, ScopeSet, SsoCredentials};
use crate::secret::Secret;

#[cfg(feature = "oauth")]
mod http;

#[cfg(feature = "oauth")]
pub use http::HttpAuthClient;

/// Error type for token endpoint calls.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request could not be sent or the connection failed.
    #[error("network error: {message}")]
    Network { message: String },

    /// The server answered with an OAuth error.
    #[error("server rejected request ({status}): {error}{}", .description.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    Server {
        status: u16,
        error: String,
        description: Option<String>,
    },

    /// The response body could not be interpreted.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// The client lacks an endpoint or parameter for this call.
    #[error("client not configured: {message}")]
    NotConfigured { message: String },
}

/// Client for the token-exchange and revocation endpoints.
#[async_trait]
pub trait AuthClient: Send + Sync {
    /// Exchange a refresh token for a new credential record.
    ///
    /// `scope` requests a specific scope; `None` keeps the server default.
    async fn exchange_refresh_token(
        &self,
        refresh_token: &Secret,
        scope: Option<&ScopeSet>,
    ) -> Result<Credentials, ClientError>;

    /// Exchange a refresh token for session-transfer (SSO) credentials.
    async fn exchange_for_sso(&self, refresh_token: &Secret) -> Result<SsoCredentials, ClientError>;

    /// Revoke a refresh token server-side.
    async fn revoke_refresh_token(&self, refresh_token: &Secret) -> Result<(), ClientError>;
}
