//! Error taxonomy for the credentials manager.
//!
//! Every failure surfaced by [`CredentialsManager`](crate::CredentialsManager) is a
//! [`CredentialsManagerError`]: a closed [`ErrorCode`] plus an optional cause carrying
//! the collaborator error (network, storage, biometric) that triggered it.
//!
//! Equality is defined by code only. The cause is kept for diagnostics and is
//! reachable through [`std::error::Error::source`].

use std::error::Error as StdError;
use std::fmt;
use std::mem;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error type used at collaborator boundaries.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Shared cause attached to a [`CredentialsManagerError`].
///
/// Shared so the identical error can be handed to every caller waiting on a renewal.
pub type Cause = Arc<dyn StdError + Send + Sync + 'static>;

/// Failure codes of the credentials manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The store holds no credentials.
    NoCredentials,

    /// The stored credentials cannot be renewed.
    NoRefreshToken,

    /// Exchanging the refresh token for renewed credentials failed.
    RenewFailed,

    /// Exchanging the refresh token for credentials with an explicit scope failed.
    ApiExchangeFailed,

    /// Exchanging the refresh token for SSO credentials failed.
    SsoExchangeFailed,

    /// Persisting credentials failed.
    StoreFailed,

    /// The biometric challenge did not succeed.
    BiometricsFailed,

    /// The revocation endpoint rejected the refresh token.
    RevokeFailed,

    /// The requested minimum TTL exceeds what the server grants.
    LargeMinTtl {
        /// Requested minimum remaining lifetime, in seconds.
        min_ttl: u64,
        /// Lifetime of the granted access token, in seconds.
        lifetime: u64,
    },
}

impl ErrorCode {
    /// Returns `true` if both codes are the same variant, ignoring associated values.
    pub fn same_kind(&self, other: &ErrorCode) -> bool {
        mem::discriminant(self) == mem::discriminant(other)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => f.write_str("No credentials were found in the store."),
            Self::NoRefreshToken => {
                f.write_str("The stored credentials instance does not contain a refresh token.")
            }
            Self::RenewFailed => f.write_str("The credentials renewal failed."),
            Self::ApiExchangeFailed => {
                f.write_str("The exchange of the refresh token for API credentials failed.")
            }
            Self::SsoExchangeFailed => {
                f.write_str("The exchange of the refresh token for SSO credentials failed.")
            }
            Self::StoreFailed => f.write_str("Storing the renewed credentials failed."),
            Self::BiometricsFailed => f.write_str("The biometric authentication failed."),
            Self::RevokeFailed => f.write_str("The revocation of the refresh token failed."),
            Self::LargeMinTtl { min_ttl, lifetime } => write!(
                f,
                "The minTTL requested ({min_ttl}s) is greater than the lifetime of the renewed \
                 access token ({lifetime}s). Request a lower minTTL or increase the \
                 'Token Expiration' value in the settings page of your identity provider."
            ),
        }
    }
}

/// Error returned by every credentials manager operation.
///
/// # Example
///
/// ```
/// use keywarden_core::{CredentialsManagerError, ErrorCode};
///
/// let io = std::io::Error::new(std::io::ErrorKind::Other, "keychain locked");
/// let error = CredentialsManagerError::with_cause(ErrorCode::StoreFailed, io);
///
/// assert_eq!(error, CredentialsManagerError::STORE_FAILED);
/// assert_eq!(
///     error.to_string(),
///     "Storing the renewed credentials failed. CAUSE: keychain locked"
/// );
/// ```
#[derive(Clone, Error)]
#[error("{}", render(.code, .cause))]
pub struct CredentialsManagerError {
    code: ErrorCode,
    #[source]
    cause: Option<Cause>,
}

fn render(code: &ErrorCode, cause: &Option<Cause>) -> String {
    match cause {
        Some(cause) => format!("{code} CAUSE: {cause}"),
        None => code.to_string(),
    }
}

impl CredentialsManagerError {
    pub const NO_CREDENTIALS: Self = Self::new(ErrorCode::NoCredentials);
    pub const NO_REFRESH_TOKEN: Self = Self::new(ErrorCode::NoRefreshToken);
    pub const RENEW_FAILED: Self = Self::new(ErrorCode::RenewFailed);
    pub const API_EXCHANGE_FAILED: Self = Self::new(ErrorCode::ApiExchangeFailed);
    pub const SSO_EXCHANGE_FAILED: Self = Self::new(ErrorCode::SsoExchangeFailed);
    pub const STORE_FAILED: Self = Self::new(ErrorCode::StoreFailed);
    pub const BIOMETRICS_FAILED: Self = Self::new(ErrorCode::BiometricsFailed);
    pub const REVOKE_FAILED: Self = Self::new(ErrorCode::RevokeFailed);

    /// Create an error without a cause.
    pub const fn new(code: ErrorCode) -> Self {
        Self { code, cause: None }
    }

    /// Create an error carrying the collaborator error that caused it.
    pub fn with_cause(code: ErrorCode, cause: impl Into<BoxError>) -> Self {
        Self {
            code,
            cause: Some(Arc::from(cause.into())),
        }
    }

    /// Shorthand for [`ErrorCode::LargeMinTtl`].
    pub const fn large_min_ttl(min_ttl: u64, lifetime: u64) -> Self {
        Self::new(ErrorCode::LargeMinTtl { min_ttl, lifetime })
    }

    /// The failure code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// The underlying collaborator error, if any.
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// Structural match used for catch-style dispatch.
    ///
    /// Succeeds iff `other` is a `CredentialsManagerError` of the same code variant.
    /// Causes and associated values are ignored, and `other` may be an erased
    /// `&dyn Error` (for example the contents of a `Box<dyn Error>`).
    pub fn matches(&self, other: &(dyn StdError + 'static)) -> bool {
        other
            .downcast_ref::<Self>()
            .is_some_and(|other| self.code.same_kind(&other.code))
    }
}

impl PartialEq for CredentialsManagerError {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for CredentialsManagerError {}

impl From<ErrorCode> for CredentialsManagerError {
    fn from(code: ErrorCode) -> Self {
        Self::new(code)
    }
}

// Debug output is the human-readable message; no extra fields.
impl fmt::Debug for CredentialsManagerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
