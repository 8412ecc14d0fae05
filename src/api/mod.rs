//! REST collaborators of a deployment and the hook that authenticates them.

pub mod users;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthError, AuthManager};
use crate::config::AuthConfig;
use crate::error::RduError;

pub use users::{SelfUserInfo, UsersClient};

/// Mutates an outgoing request before it is sent.
#[async_trait]
pub trait RequestEditor: Send + Sync {
    async fn edit(
        &self,
        request: &mut reqwest::Request,
        cancel: &CancellationToken,
    ) -> Result<(), AuthError>;
}

/// Adds `Authorization: Bearer <token>` unless the request already carries an
/// `Authorization` header.
#[async_trait]
impl RequestEditor for AuthManager {
    async fn edit(
        &self,
        request: &mut reqwest::Request,
        cancel: &CancellationToken,
    ) -> Result<(), AuthError> {
        if request.headers().contains_key(AUTHORIZATION) {
            return Ok(());
        }
        let token = self.get_access_token(cancel).await?;
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| AuthError::InvalidResponse("access token is not a valid header value".to_string()))?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }
}

/// One deployment: its auth manager plus the REST clients that use it.
#[derive(Debug)]
pub struct DeploymentClient {
    auth: Arc<AuthManager>,
    users: UsersClient,
}

impl DeploymentClient {
    pub fn new(auth: Arc<AuthManager>) -> Result<Self, RduError> {
        let config: &AuthConfig = auth.config();
        let http = config.http_client()?;
        let users = UsersClient::new(http, &config.base_url, auth.clone());
        Ok(Self { auth, users })
    }

    pub fn auth(&self) -> &AuthManager {
        &self.auth
    }

    pub fn users(&self) -> &UsersClient {
        &self.users
    }

    /// True when a live access token can be produced without a device flow.
    pub async fn is_logged_in(&self, cancel: &CancellationToken) -> bool {
        self.auth.get_access_token(cancel).await.is_ok()
    }

    pub async fn is_admin(&self, cancel: &CancellationToken) -> bool {
        match self.users.get_user(cancel).await {
            Ok(user) => user.is_admin,
            Err(e) => {
                tracing::debug!(error = %e, "could not fetch user info");
                false
            }
        }
    }
}
