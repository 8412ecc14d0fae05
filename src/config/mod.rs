//! Configuration system (layered: defaults < config file < env < CLI flags).

pub mod auth;

pub use auth::AuthConfig;

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::auth::{
    CredentialStore, FileCredentialStore, KeyringCredentialStore, PollPolicy,
};
use crate::error::RduError;

pub const DEFAULT_CLIENT_ID: &str = "renku-cli";
pub const DEFAULT_SCOPE: &str = "offline_access";
pub const DEFAULT_REALM: &str = "Renku";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Where tokens are persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    /// Platform keychain / credential manager / secret service.
    #[default]
    Keyring,
    /// `~/.rdu/credentials.toml`, for hosts without a secret service.
    File,
}

impl FromStr for CredentialBackend {
    type Err = RduError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyring" => Ok(Self::Keyring),
            "file" => Ok(Self::File),
            other => Err(RduError::Configuration(format!(
                "unknown credential backend: {other} (supported: keyring, file)"
            ))),
        }
    }
}

/// User-level settings for rdu.
///
/// # Example
/// ```
/// use rdu::config::RduConfig;
///
/// let config: RduConfig = toml::from_str(r#"
/// namespace = "ci-renku-42"
/// poll_policy = "rfc8628"
/// "#).unwrap();
/// assert_eq!(config.client_id, "renku-cli");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RduConfig {
    pub url: Option<String>,
    pub namespace: Option<String>,
    pub client_id: String,
    pub scope: String,
    pub realm: String,
    pub credential_backend: CredentialBackend,
    pub poll_policy: PollPolicy,
    pub http_timeout_secs: u64,
}

impl Default for RduConfig {
    fn default() -> Self {
        Self {
            url: None,
            namespace: None,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            realm: DEFAULT_REALM.to_string(),
            credential_backend: CredentialBackend::default(),
            poll_policy: PollPolicy::default(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl RduConfig {
    /// `~/.rdu/config.toml`
    pub fn default_path() -> PathBuf {
        default_rdu_dir().join("config.toml")
    }

    /// Defaults, then the default config file, then the process environment.
    pub fn load() -> Result<Self, RduError> {
        let _ = dotenvy::dotenv();
        let mut config = Self::from_path(Self::default_path())?;
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Read a config file. A missing file yields the defaults.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RduError> {
        let path = path.as_ref();
        let raw = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(RduError::Io(err)),
        };
        toml::from_str(&raw)
            .map_err(|e| RduError::Configuration(format!("{}: {e}", path.display())))
    }

    /// Overlay `RDU_*` variables resolved through `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), RduError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(url) = get("RDU_URL") {
            self.url = Some(url);
        }
        if let Some(namespace) = get("RDU_NAMESPACE") {
            self.namespace = Some(namespace);
        }
        if let Some(client_id) = get("RDU_CLIENT_ID") {
            self.client_id = client_id;
        }
        if let Some(scope) = get("RDU_SCOPE") {
            self.scope = scope;
        }
        if let Some(realm) = get("RDU_REALM") {
            self.realm = realm;
        }
        if let Some(backend) = get("RDU_CREDENTIAL_BACKEND") {
            self.credential_backend = backend.parse()?;
        }
        if let Some(policy) = get("RDU_POLL_POLICY") {
            self.poll_policy = policy.parse()?;
        }
        if let Some(timeout) = get("RDU_HTTP_TIMEOUT_SECS") {
            self.http_timeout_secs = timeout.trim().parse().map_err(|_| {
                RduError::Configuration(format!("RDU_HTTP_TIMEOUT_SECS is not a number: {timeout}"))
            })?;
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Build the explicit auth parameters for one deployment.
    pub fn auth_config(&self, base_url: &str) -> Result<AuthConfig, RduError> {
        Ok(AuthConfig::new(base_url)?
            .with_realm(&self.realm)?
            .with_client_id(&self.client_id)
            .with_scope(&self.scope)
            .with_poll_policy(self.poll_policy)
            .with_http_timeout(self.http_timeout()))
    }

    pub fn credential_store(&self) -> Arc<dyn CredentialStore> {
        match self.credential_backend {
            CredentialBackend::Keyring => Arc::new(KeyringCredentialStore::new()),
            CredentialBackend::File => Arc::new(FileCredentialStore::new_default()),
        }
    }
}

/// `~/.rdu`, or `./.rdu` when no home directory is known.
pub fn default_rdu_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".rdu"))
        .unwrap_or_else(|| PathBuf::from(".rdu"))
}
