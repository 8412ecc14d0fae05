//! Explicit parameters for one [`crate::auth::AuthManager`].

use std::time::Duration;

use reqwest::Url;

use crate::auth::{AuthError, PollPolicy, DEFAULT_LEEWAY};

use super::{DEFAULT_CLIENT_ID, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_REALM, DEFAULT_SCOPE};

/// Everything the auth engine needs to know about one deployment.
///
/// # Example
/// ```
/// use rdu::config::AuthConfig;
///
/// let config = AuthConfig::new("https://ci-renku-42.dev.renku.ch/").unwrap();
/// assert_eq!(config.base_key(), "https://ci-renku-42.dev.renku.ch");
/// assert_eq!(
///     config.issuer_url.as_str(),
///     "https://ci-renku-42.dev.renku.ch/auth/realms/Renku"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub base_url: Url,
    pub issuer_url: Url,
    pub client_id: String,
    pub scope: String,
    pub leeway: Duration,
    pub poll_policy: PollPolicy,
    pub http_timeout: Duration,
    base_key: String,
}

impl AuthConfig {
    pub fn new(base_url: &str) -> Result<Self, AuthError> {
        let base_url = Url::parse(base_url.trim())
            .map_err(|e| AuthError::Configuration(format!("invalid URL '{base_url}': {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(AuthError::Configuration(format!(
                "unsupported URL scheme '{}'",
                base_url.scheme()
            )));
        }
        let base_key = normalize_base(&base_url);
        let issuer_url = issuer_for(&base_key, DEFAULT_REALM)?;
        Ok(Self {
            base_url,
            issuer_url,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            leeway: DEFAULT_LEEWAY,
            poll_policy: PollPolicy::default(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            base_key,
        })
    }

    /// Base URL as used in credential keys: a bare `/` path is dropped.
    pub fn base_key(&self) -> &str {
        &self.base_key
    }

    pub fn with_realm(mut self, realm: &str) -> Result<Self, AuthError> {
        self.issuer_url = issuer_for(&self.base_key, realm)?;
        Ok(self)
    }

    /// Point at an issuer that does not live under the deployment.
    pub fn with_issuer_url(mut self, issuer_url: Url) -> Self {
        self.issuer_url = issuer_url;
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn http_client(&self) -> Result<reqwest::Client, AuthError> {
        reqwest::Client::builder()
            .timeout(self.http_timeout)
            .user_agent(concat!("rdu/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuthError::Configuration(format!("could not build HTTP client: {e}")))
    }
}

fn normalize_base(url: &Url) -> String {
    let raw = url.as_str();
    if url.path() == "/" && url.query().is_none() && url.fragment().is_none() {
        raw.trim_end_matches('/').to_string()
    } else {
        raw.to_string()
    }
}

fn issuer_for(base_key: &str, realm: &str) -> Result<Url, AuthError> {
    let realm = realm.trim().trim_matches('/');
    if realm.is_empty() {
        return Err(AuthError::Configuration("realm must not be empty".to_string()));
    }
    let raw = format!("{}/auth/realms/{realm}", base_key.trim_end_matches('/'));
    Url::parse(&raw).map_err(|e| AuthError::Configuration(format!("invalid issuer '{raw}': {e}")))
}
