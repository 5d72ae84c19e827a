//! HTTP implementation of [`AuthClient`] using form-encoded OAuth requests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use super::{AuthClient, ClientError};
use crate::config::AuthEndpoints;
use crate::credentials::{Credentials, ScopeSet, SsoCredentials};
use crate::secret::Secret;

/// [`AuthClient`] talking to an OAuth 2.0 token endpoint over HTTPS.
///
/// - Renewal posts `grant_type=refresh_token` to the token endpoint.
/// - SSO exchange posts the same grant with the configured `sso_audience`.
/// - Revocation posts the refresh token to the revocation endpoint (RFC 7009).
///
/// # Example
///
/// ```rust,no_run
/// # fn example() -> Result<(), keywarden_core::ClientError> {
/// use keywarden_core::{AuthEndpoints, HttpAuthClient};
///
/// let client = HttpAuthClient::new(&AuthEndpoints {
///     token_url: "https://login.example.com/oauth/token".to_string(),
///     revoke_url: Some("https://login.example.com/oauth/revoke".to_string()),
///     client_id: "my-client".to_string(),
///     sso_audience: None,
/// })?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpAuthClient {
    http: reqwest::Client,
    token_url: Url,
    revoke_url: Option<Url>,
    client_id: String,
    sso_audience: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Deserialize)]
struct SsoResponse {
    access_token: String,
    issued_token_type: String,
    expires_in: i64,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

fn parse_url(name: &str, value: &str) -> Result<Url, ClientError> {
    Url::parse(value).map_err(|e| ClientError::NotConfigured {
        message: format!("invalid {}: {}", name, e),
    })
}

fn expiry(issued_at: DateTime<Utc>, expires_in: i64) -> Result<DateTime<Utc>, ClientError> {
    Duration::try_seconds(expires_in)
        .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
        .ok_or_else(|| ClientError::InvalidResponse {
            message: format!("expires_in out of range: {}", expires_in),
        })
}

impl HttpAuthClient {
    /// Create a client for the given endpoints.
    pub fn new(endpoints: &AuthEndpoints) -> Result<Self, ClientError> {
        Self::with_http_client(endpoints, reqwest::Client::new())
    }

    /// Create a client reusing an existing `reqwest` client (timeouts, proxies, TLS).
    pub fn with_http_client(
        endpoints: &AuthEndpoints,
        http: reqwest::Client,
    ) -> Result<Self, ClientError> {
        let token_url = parse_url("token_url", &endpoints.token_url)?;
        let revoke_url = endpoints
            .revoke_url
            .as_deref()
            .map(|url| parse_url("revoke_url", url))
            .transpose()?;

        Ok(Self {
            http,
            token_url,
            revoke_url,
            client_id: endpoints.client_id.clone(),
            sso_audience: endpoints.sso_audience.clone(),
        })
    }

    async fn send_form(
        &self,
        url: &Url,
        form: &[(&str, &str)],
    ) -> Result<reqwest::Response, ClientError> {
        let response = self
            .http
            .post(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| ClientError::Network {
                message: format!("request to {} failed: {}", url, e),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(parsed) => ClientError::Server {
                status: status.as_u16(),
                error: parsed.error,
                description: parsed.error_description,
            },
            Err(_) => ClientError::Server {
                status: status.as_u16(),
                error: status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string(),
                description: (!body.is_empty()).then_some(body),
            },
        })
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        form: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        self.send_form(url, form)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ClientError::InvalidResponse {
                message: format!("failed to decode token response: {}", e),
            })
    }
}

#[async_trait]
impl AuthClient for HttpAuthClient {
    async fn exchange_refresh_token(
        &self,
        refresh_token: &Secret,
        scope: Option<&ScopeSet>,
    ) -> Result<Credentials, ClientError> {
        let requested_scope = scope.map(ScopeSet::to_string);
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token.expose()),
        ];
        if let Some(scope) = requested_scope.as_deref() {
            form.push(("scope", scope));
        }

        tracing::debug!("Exchanging refresh token at {}", self.token_url);
        let issued_at = Utc::now();
        let response: TokenResponse = self.post_json(&self.token_url, &form).await?;

        let granted_scope = match (response.scope.as_deref(), scope) {
            (Some(granted), _) => ScopeSet::parse(granted),
            (None, Some(requested)) => requested.clone(),
            (None, None) => ScopeSet::new(),
        };

        let mut credentials = Credentials::new(
            response.access_token,
            expiry(issued_at, response.expires_in)?,
        )
        .with_token_type(response.token_type)
        .with_issued_at(issued_at)
        .with_scope(granted_scope);
        credentials.refresh_token = response.refresh_token.map(Secret::new);
        credentials.id_token = response.id_token.map(Secret::new);

        Ok(credentials)
    }

    async fn exchange_for_sso(&self, refresh_token: &Secret) -> Result<SsoCredentials, ClientError> {
        let audience = self
            .sso_audience
            .as_deref()
            .ok_or_else(|| ClientError::NotConfigured {
                message: "sso_audience is not set".to_string(),
            })?;
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token.expose()),
            ("audience", audience),
        ];

        tracing::debug!("Exchanging refresh token for SSO credentials at {}", self.token_url);
        let issued_at = Utc::now();
        let response: SsoResponse = self.post_json(&self.token_url, &form).await?;

        Ok(SsoCredentials {
            session_transfer_token: Secret::new(response.access_token),
            issued_token_type: response.issued_token_type,
            expires_at: expiry(issued_at, response.expires_in)?,
            id_token: response.id_token.map(Secret::new),
            refresh_token: response.refresh_token.map(Secret::new),
        })
    }

    async fn revoke_refresh_token(&self, refresh_token: &Secret) -> Result<(), ClientError> {
        let revoke_url = self
            .revoke_url
            .as_ref()
            .ok_or_else(|| ClientError::NotConfigured {
                message: "revoke_url is not set".to_string(),
            })?;
        let form = [
            ("client_id", self.client_id.as_str()),
            ("token", refresh_token.expose()),
            ("token_type_hint", "refresh_token"),
        ];

        tracing::debug!("Revoking refresh token at {}", revoke_url);
        self.send_form(revoke_url, &form).await?;
        Ok(())
    }
}
