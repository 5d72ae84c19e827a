//! Manager configuration handling.
//!
//! Configuration is read from `credentials.toml` in the platform configuration
//! directory (`~/.config/keywarden/` on Linux). A missing file yields defaults.
//!
//! ```toml
//! default_min_ttl = 60
//!
//! [store]
//! service = "keywarden"
//! account = "credentials"
//! prefer_keyring = true
//!
//! [biometrics]
//! title = "Unlock your session"
//!
//! [auth]
//! token_url = "https://login.example.com/oauth/token"
//! revoke_url = "https://login.example.com/oauth/revoke"
//! client_id = "my-client"
//! ```

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::gate::BiometricPrompt;

/// Top-level configuration for a credentials manager.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Where the credential record is persisted.
    pub store: StoreConfig,

    /// minTTL applied by [`CredentialsManager::credentials`](crate::CredentialsManager::credentials).
    pub default_min_ttl: u64,

    /// Enables the biometric gate with this prompt when present.
    pub biometrics: Option<BiometricPrompt>,

    /// Token endpoint settings for the HTTP client.
    pub auth: Option<AuthEndpoints>,

    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: PathBuf,
}

/// Secure store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Keyring service name.
    pub service: String,

    /// Keyring account name holding the record.
    pub account: String,

    /// Use the OS keyring when available; otherwise keep credentials in memory.
    pub prefer_keyring: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            service: "keywarden".to_string(),
            account: "credentials".to_string(),
            prefer_keyring: true,
        }
    }
}

/// Endpoints and client identity used for token exchange and revocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthEndpoints {
    /// OAuth token endpoint (refresh token grant).
    pub token_url: String,

    /// Revocation endpoint.
    #[serde(default)]
    pub revoke_url: Option<String>,

    /// Public client identifier.
    pub client_id: String,

    /// Audience requested when exchanging for SSO credentials.
    #[serde(default)]
    pub sso_audience: Option<String>,
}

impl AuthEndpoints {
    /// Check that every configured URL parses.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.token_url)
            .with_context(|| format!("Invalid token_url {:?}", self.token_url))?;
        if let Some(revoke_url) = &self.revoke_url {
            Url::parse(revoke_url)
                .with_context(|| format!("Invalid revoke_url {:?}", revoke_url))?;
        }
        if self.client_id.trim().is_empty() {
            anyhow::bail!("client_id must not be empty");
        }
        Ok(())
    }
}

/// Load configuration from the default location or create defaults.
pub fn load_config() -> Result<ManagerConfig> {
    let config_path = project_dirs()
        .map(|d| d.config_dir().join("credentials.toml"))
        .unwrap_or_else(|| PathBuf::from("keywarden.toml"));

    load_config_from_path(&config_path)
}

/// Load configuration from an explicit path, falling back to defaults if the file is absent.
pub fn load_config_from_path(path: &Path) -> Result<ManagerConfig> {
    let mut config = if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        toml::from_str::<ManagerConfig>(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", path))?
    } else {
        tracing::debug!("No configuration at {:?}, using defaults", path);
        ManagerConfig::default()
    };

    if let Some(auth) = &config.auth {
        auth.validate()
            .with_context(|| format!("Invalid [auth] section in {:?}", path))?;
    }

    config.config_path = path.to_path_buf();
    Ok(config)
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "raibid-labs", "keywarden")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::BiometricPolicy;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("credentials.toml");

        let config = load_config_from_path(&path).unwrap();
        assert_eq!(config.store.service, "keywarden");
        assert!(config.store.prefer_keyring);
        assert_eq!(config.default_min_ttl, 0);
        assert!(config.biometrics.is_none());
        assert_eq!(config.config_path, path);
    }

    #[test]
    fn test_full_file_parses() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("credentials.toml");
        std::fs::write(
            &path,
            r#"
default_min_ttl = 120

[store]
account = "work"
prefer_keyring = false

[biometrics]
title = "Unlock"
policy = "biometrics_or_passcode"

[auth]
token_url = "https://login.example.com/oauth/token"
client_id = "client-123"
"#,
        )
        .unwrap();

        let config = load_config_from_path(&path).unwrap();
        assert_eq!(config.default_min_ttl, 120);
        assert_eq!(config.store.service, "keywarden");
        assert_eq!(config.store.account, "work");
        assert!(!config.store.prefer_keyring);

        let prompt = config.biometrics.unwrap();
        assert_eq!(prompt.title, "Unlock");
        assert_eq!(prompt.policy, BiometricPolicy::BiometricsOrPasscode);

        let auth = config.auth.unwrap();
        assert_eq!(auth.client_id, "client-123");
        assert!(auth.revoke_url.is_none());
    }

    #[test]
    fn test_invalid_auth_url_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("credentials.toml");
        std::fs::write(
            &path,
            "[auth]\ntoken_url = \"not a url\"\nclient_id = \"client\"\n",
        )
        .unwrap();

        let error = load_config_from_path(&path).unwrap_err();
        assert!(format!("{:#}", error).contains("token_url"));
    }

    #[test]
    fn test_malformed_toml_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("credentials.toml");
        std::fs::write(&path, "default_min_ttl = \"soon\"").unwrap();

        assert!(load_config_from_path(&path).is_err());
    }
}
