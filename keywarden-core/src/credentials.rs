//! The credential record managed by [`CredentialsManager`](crate::CredentialsManager).
//!
//! This module provides:
//! - [`Credentials`] - Access/refresh/ID tokens with their validity window
//! - [`ScopeSet`] - Order-independent set of granted scopes
//! - [`SsoCredentials`] - Session-transfer credentials from an SSO exchange

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::secret::Secret;

/// Set of granted permission strings.
///
/// Ordering is irrelevant for equality; iteration and serialization are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    /// Create an empty scope set.
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Parse a space-delimited scope string (`"openid profile offline_access"`).
    pub fn parse(scope: &str) -> Self {
        scope.split_whitespace().collect()
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Space-delimited, as sent on the wire.
impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        write!(f, "{}", joined.join(" "))
    }
}

/// One set of tokens and their validity window `[issued_at, expires_at)`.
///
/// Records are replaced as a whole on renewal, never patched field by field.
///
/// # Example
///
/// ```
/// use chrono::{Duration, Utc};
/// use keywarden_core::Credentials;
///
/// let credentials = Credentials::new("access-token", Utc::now() + Duration::hours(1))
///     .with_refresh_token("refresh-token");
///
/// assert!(credentials.is_valid(60));
/// assert!(credentials.can_renew());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// The access token presented to APIs.
    pub access_token: Secret,

    /// Token type (usually "Bearer").
    pub token_type: String,

    /// OpenID Connect ID token, if one was issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<Secret>,

    /// Refresh token; without it the record cannot be renewed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<Secret>,

    /// When the grant was issued.
    pub issued_at: DateTime<Utc>,

    /// When the access token stops being valid.
    pub expires_at: DateTime<Utc>,

    /// Granted scopes.
    #[serde(default)]
    pub scope: ScopeSet,
}

impl Credentials {
    /// Create a bearer credential issued now.
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: Secret::new(access_token),
            token_type: "Bearer".to_string(),
            id_token: None,
            refresh_token: None,
            issued_at: Utc::now(),
            expires_at,
            scope: ScopeSet::new(),
        }
    }

    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = token_type.into();
        self
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(Secret::new(refresh_token));
        self
    }

    pub fn with_id_token(mut self, id_token: impl Into<String>) -> Self {
        self.id_token = Some(Secret::new(id_token));
        self
    }

    pub fn with_scope(mut self, scope: ScopeSet) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_issued_at(mut self, issued_at: DateTime<Utc>) -> Self {
        self.issued_at = issued_at;
        self
    }

    /// Lifetime of the grant in whole seconds (`expires_at - issued_at`, never negative).
    pub fn lifetime(&self) -> u64 {
        (self.expires_at - self.issued_at).num_seconds().max(0) as u64
    }

    /// Check if at least `min_ttl` seconds of validity remain at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>, min_ttl: u64) -> bool {
        let min_ttl = i64::try_from(min_ttl).unwrap_or(i64::MAX);
        match Duration::try_seconds(min_ttl) {
            Some(min_ttl) => self.expires_at - now >= min_ttl,
            None => false,
        }
    }

    /// Check if at least `min_ttl` seconds of validity remain.
    pub fn is_valid(&self, min_ttl: u64) -> bool {
        self.is_valid_at(Utc::now(), min_ttl)
    }

    /// Check if the access token has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether a refresh token is available for renewal.
    pub fn can_renew(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Expired and not renewable: the user has to sign in again.
    pub fn is_terminal_at(&self, now: DateTime<Utc>) -> bool {
        !self.can_renew() && self.is_expired_at(now)
    }

    /// Combine a renewal response with the record it replaces.
    ///
    /// Servers without refresh token rotation omit the refresh token, and some omit
    /// the ID token or scope; the previous values carry over in that case.
    pub fn merge_renewal(&self, mut renewed: Credentials) -> Credentials {
        if renewed.refresh_token.is_none() {
            renewed.refresh_token = self.refresh_token.clone();
        }
        if renewed.id_token.is_none() {
            renewed.id_token = self.id_token.clone();
        }
        if renewed.scope.is_empty() {
            renewed.scope = self.scope.clone();
        }
        renewed
    }

    /// Serialize for the secure store.
    pub fn to_bytes(&self) -> Result<Zeroizing<Vec<u8>>, serde_json::Error> {
        serde_json::to_vec(self).map(Zeroizing::new)
    }

    /// Deserialize bytes produced by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Credentials obtained by exchanging a refresh token for a session transfer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsoCredentials {
    /// Token that lets a web session be established without another login.
    pub session_transfer_token: Secret,

    /// Type of the issued token, as reported by the server.
    pub issued_token_type: String,

    /// When the session transfer token expires.
    pub expires_at: DateTime<Utc>,

    /// ID token, if one was issued alongside.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<Secret>,

    /// Rotated refresh token, if the server rotated it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<Secret>,
}
