use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::browser::{open_verification_url, BrowserLauncher, SystemBrowser};
use super::client::OidcClient;
use super::error::AuthError;
use super::poller::TokenPoller;
use super::store::{CredentialKey, CredentialStore, TokenKind};
use super::token::{is_valid_at, TokenPair};
use crate::config::AuthConfig;

/// Result of [`AuthManager::login`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// A valid access token was already cached; no device flow ran.
    AlreadyLoggedIn,
    /// The device flow completed and the new pair was stored.
    LoggedIn,
}

#[derive(Default)]
struct CachedTokens {
    access: Option<String>,
    refresh: Option<String>,
}

/// Single source of bearer tokens for one deployment.
///
/// Resolution order for [`AuthManager::get_access_token`]: in-memory token,
/// stored token, refresh grant. Only [`AuthManager::login`] runs the
/// interactive device flow.
///
/// The in-memory pair sits behind an instance-owned lock held for the whole
/// decision, so a shared `Arc<AuthManager>` never refreshes twice in
/// parallel. Separate processes share the credential store without any
/// locking; the last writer wins.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use rdu::auth::{AuthManager, KeyringCredentialStore};
/// use rdu::config::AuthConfig;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), rdu::auth::AuthError> {
/// let config = AuthConfig::new("https://ci-renku-42.dev.renku.ch")?;
/// let manager = AuthManager::new(config, Arc::new(KeyringCredentialStore::new()))?;
/// let cancel = CancellationToken::new();
/// manager.login(&cancel).await?;
/// let token = manager.get_access_token(&cancel).await?;
/// # let _ = token;
/// # Ok(())
/// # }
/// ```
pub struct AuthManager {
    config: AuthConfig,
    client: OidcClient,
    store: Arc<dyn CredentialStore>,
    browser: Arc<dyn BrowserLauncher>,
    access_key: CredentialKey,
    refresh_key: CredentialKey,
    tokens: Mutex<CachedTokens>,
}

impl std::fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthManager")
            .field("config", &self.config)
            .field("client", &self.client)
            .field("store", &"..")
            .finish()
    }
}

impl AuthManager {
    pub fn new(config: AuthConfig, store: Arc<dyn CredentialStore>) -> Result<Self, AuthError> {
        let http = config.http_client()?;
        Ok(Self::with_http_client(config, store, http))
    }

    pub fn with_http_client(
        config: AuthConfig,
        store: Arc<dyn CredentialStore>,
        http: reqwest::Client,
    ) -> Self {
        let client = OidcClient::new(
            http,
            config.issuer_url.clone(),
            config.client_id.clone(),
            config.scope.clone(),
        );
        let access_key = CredentialKey::new(config.base_key(), TokenKind::AccessToken);
        let refresh_key = CredentialKey::new(config.base_key(), TokenKind::RefreshToken);
        Self {
            config,
            client,
            store,
            browser: Arc::new(SystemBrowser),
            access_key,
            refresh_key,
            tokens: Mutex::new(CachedTokens::default()),
        }
    }

    pub fn with_browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = browser;
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn oidc_client(&self) -> &OidcClient {
        &self.client
    }

    /// Return a live access token, refreshing it if needed.
    ///
    /// Never starts a device flow; fails with [`AuthError::NotLoggedIn`] when
    /// no refresh token is available. A failed refresh leaves every cached
    /// and stored token untouched. When the refreshed pair cannot be
    /// persisted the error is returned, but the new pair stays usable for
    /// the rest of this process.
    pub async fn get_access_token(&self, cancel: &CancellationToken) -> Result<String, AuthError> {
        let mut tokens = self.tokens.lock().await;
        if let Some(token) = self.live_access_token(&mut tokens) {
            return Ok(token);
        }

        let refresh_token = match tokens.refresh.clone() {
            Some(token) => token,
            None => self
                .store
                .get(&self.refresh_key)?
                .ok_or(AuthError::NotLoggedIn)?,
        };

        tracing::debug!(issuer = %self.config.issuer_url, "access token stale, refreshing");
        let pair = self.client.refresh(&refresh_token, cancel).await?;
        tracing::info!(issuer = %self.config.issuer_url, "access token refreshed");
        tokens.access = Some(pair.access_token.clone());
        tokens.refresh = Some(pair.refresh_token.clone());
        self.persist(&pair)?;
        Ok(pair.access_token)
    }

    /// Run the device flow unless a live access token is already at hand.
    ///
    /// Only the in-memory and stored access tokens count here; a refresh is
    /// never attempted. The whole login fails if the new pair cannot be
    /// stored.
    pub async fn login(&self, cancel: &CancellationToken) -> Result<LoginOutcome, AuthError> {
        let mut tokens = self.tokens.lock().await;
        if self.live_access_token(&mut tokens).is_some() {
            tracing::info!(issuer = %self.config.issuer_url, "already logged in");
            return Ok(LoginOutcome::AlreadyLoggedIn);
        }

        let session = self.client.start_device_authorization(cancel).await?;
        open_verification_url(self.browser.as_ref(), &session.verification_uri_complete);

        let pair = TokenPoller::new(&self.client, self.config.poll_policy)
            .poll(&session, cancel)
            .await?;
        tokens.access = Some(pair.access_token.clone());
        tokens.refresh = Some(pair.refresh_token.clone());
        self.persist(&pair)?;
        tracing::info!(issuer = %self.config.issuer_url, "logged in");
        Ok(LoginOutcome::LoggedIn)
    }

    /// Forget both tokens for this deployment.
    ///
    /// Succeeds when at least one of the two stored keys was deleted.
    pub async fn logout(&self) -> Result<(), AuthError> {
        let mut tokens = self.tokens.lock().await;
        *tokens = CachedTokens::default();

        let access = self.store.delete(&self.access_key);
        let refresh = self.store.delete(&self.refresh_key);
        match (access, refresh) {
            (Err(first), Err(second)) => Err(AuthError::Logout {
                first: Box::new(first),
                second: Box::new(second),
            }),
            (Err(e), Ok(())) | (Ok(()), Err(e)) => {
                tracing::warn!(error = %e, "only one of the stored tokens was removed");
                Ok(())
            }
            (Ok(()), Ok(())) => {
                tracing::info!(issuer = %self.config.issuer_url, "logged out");
                Ok(())
            }
        }
    }

    /// Forget every stored login, for every deployment.
    pub async fn logout_all(&self) -> Result<(), AuthError> {
        let mut tokens = self.tokens.lock().await;
        *tokens = CachedTokens::default();
        logout_all(self.store.as_ref())
    }

    /// Steps 1 and 2 of the resolution order: memory, then store.
    fn live_access_token(&self, tokens: &mut CachedTokens) -> Option<String> {
        let now = Utc::now();
        if let Some(token) = tokens.access.as_deref() {
            if is_valid_at(token, now, self.config.leeway) {
                return Some(token.to_string());
            }
        }
        match self.store.get(&self.access_key) {
            Ok(Some(token)) if is_valid_at(&token, now, self.config.leeway) => {
                tracing::debug!(key = %self.access_key, "using stored access token");
                tokens.access = Some(token.clone());
                Some(token)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "could not read stored access token");
                None
            }
        }
    }

    /// Store the access token, then the refresh token.
    ///
    /// There is no transaction across the two keys: if the second write
    /// fails the store keeps a new access token without its refresh token,
    /// and that is reported as an error.
    fn persist(&self, pair: &TokenPair) -> Result<(), AuthError> {
        self.store
            .set(&self.access_key, &pair.access_token)
            .map_err(|e| AuthError::StoreWrite(format!("access token not saved: {e}")))?;
        self.store
            .set(&self.refresh_key, &pair.refresh_token)
            .map_err(|e| {
                AuthError::StoreWrite(format!(
                    "access token saved but refresh token not saved: {e}"
                ))
            })
    }
}

/// Delete every secret rdu stored, across all deployments.
pub fn logout_all(store: &dyn CredentialStore) -> Result<(), AuthError> {
    store.delete_all()?;
    tracing::info!("removed all saved logins");
    Ok(())
}
