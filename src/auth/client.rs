use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::device_code::{effective_interval, DeviceAuthorizationSession};
use super::discovery::{OidcDiscovery, OidcEndpoints};
use super::error::AuthError;
use super::http::{self, HttpFailure};
use super::token::TokenPair;

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const REFRESH_TOKEN_GRANT: &str = "refresh_token";

/// Public OAuth client for one issuer: device authorization, the device-code
/// grant and the refresh grant.
///
/// # Example
/// ```no_run
/// use reqwest::Url;
/// use rdu::auth::OidcClient;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), rdu::auth::AuthError> {
/// let issuer = Url::parse("https://ci-renku-42.dev.renku.ch/auth/realms/Renku").unwrap();
/// let client = OidcClient::new(reqwest::Client::new(), issuer, "renku-cli", "offline_access");
/// let session = client.start_device_authorization(&CancellationToken::new()).await?;
/// println!("open {}", session.verification_uri_complete);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct OidcClient {
    http: reqwest::Client,
    discovery: OidcDiscovery,
    client_id: String,
    scope: String,
}

impl OidcClient {
    pub fn new(
        http: reqwest::Client,
        issuer_url: reqwest::Url,
        client_id: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            discovery: OidcDiscovery::new(http.clone(), issuer_url),
            http,
            client_id: client_id.into(),
            scope: scope.into(),
        }
    }

    pub fn discovery(&self) -> &OidcDiscovery {
        &self.discovery
    }

    pub async fn endpoints(&self, cancel: &CancellationToken) -> Result<&OidcEndpoints, AuthError> {
        self.discovery.resolve(cancel).await
    }

    /// Start a device-flow session.
    pub async fn start_device_authorization(
        &self,
        cancel: &CancellationToken,
    ) -> Result<DeviceAuthorizationSession, AuthError> {
        let endpoint = self
            .endpoints(cancel)
            .await?
            .device_authorization_endpoint
            .clone();
        let payload: DeviceAuthorizationResponse = http::post_form(
            &self.http,
            endpoint.as_str(),
            &[
                ("client_id", self.client_id.as_str()),
                ("scope", self.scope.as_str()),
            ],
            cancel,
        )
        .await
        .map_err(|e| e.into_auth(AuthError::DeviceAuthorization))?;

        let device_code = required(payload.device_code, "device_code")?;
        let verification_uri_complete =
            required(payload.verification_uri_complete, "verification_uri_complete")?;
        let expires_in = payload.expires_in.unwrap_or_default();
        let expires_at = expiry_after(Utc::now(), expires_in).ok_or_else(|| {
            AuthError::DeviceAuthorization(format!("expires_in out of range: {expires_in}"))
        })?;
        let session = DeviceAuthorizationSession {
            device_code,
            user_code: payload.user_code.unwrap_or_default(),
            verification_uri: payload.verification_uri.unwrap_or_default(),
            verification_uri_complete,
            expires_at,
            poll_interval: effective_interval(payload.interval),
        };
        tracing::info!(
            expires_in,
            interval_secs = session.poll_interval.as_secs(),
            "device authorization started"
        );
        Ok(session)
    }

    /// One attempt at the device-code grant.
    pub(crate) async fn exchange_device_code(
        &self,
        device_code: &str,
        cancel: &CancellationToken,
    ) -> Result<TokenPair, ExchangeFailure> {
        let endpoint = self
            .endpoints(cancel)
            .await
            .map_err(ExchangeFailure::Auth)?
            .token_endpoint
            .clone();
        let payload: TokenResponse = http::post_form(
            &self.http,
            endpoint.as_str(),
            &[
                ("client_id", self.client_id.as_str()),
                ("grant_type", DEVICE_CODE_GRANT),
                ("device_code", device_code),
            ],
            cancel,
        )
        .await
        .map_err(ExchangeFailure::Http)?;
        payload.into_pair(None).map_err(ExchangeFailure::Auth)
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// When the server does not rotate the refresh token the one passed in is
    /// carried over. Nothing is cleared on failure.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        cancel: &CancellationToken,
    ) -> Result<TokenPair, AuthError> {
        let endpoint = self.endpoints(cancel).await?.token_endpoint.clone();
        let payload: TokenResponse = http::post_form(
            &self.http,
            endpoint.as_str(),
            &[
                ("client_id", self.client_id.as_str()),
                ("grant_type", REFRESH_TOKEN_GRANT),
                ("refresh_token", refresh_token),
            ],
            cancel,
        )
        .await
        .map_err(|e| e.into_auth(AuthError::Refresh))?;
        payload
            .into_pair(Some(refresh_token))
            .map_err(|e| AuthError::Refresh(e.to_string()))
    }
}

/// Why one device-code exchange attempt failed.
#[derive(Debug)]
pub(crate) enum ExchangeFailure {
    Http(HttpFailure),
    Auth(AuthError),
}

impl ExchangeFailure {
    pub(crate) fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Http(HttpFailure::Cancelled) | Self::Auth(AuthError::PollCancelled)
        )
    }

    pub(crate) fn oauth_error(&self) -> Option<&str> {
        match self {
            Self::Http(failure) => failure.oauth_error(),
            Self::Auth(_) => None,
        }
    }
}

impl std::fmt::Display for ExchangeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(failure) => write!(f, "{failure}"),
            Self::Auth(err) => write!(f, "{err}"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeviceAuthorizationResponse {
    device_code: Option<String>,
    user_code: Option<String>,
    verification_uri: Option<String>,
    verification_uri_complete: Option<String>,
    expires_in: Option<u64>,
    interval: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    refresh_expires_in: Option<u64>,
    token_type: Option<String>,
    scope: Option<String>,
}

impl TokenResponse {
    fn into_pair(self, previous_refresh: Option<&str>) -> Result<TokenPair, AuthError> {
        let access_token = self
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::InvalidResponse("token response has no access_token".to_string()))?;
        let refresh_token = self
            .refresh_token
            .filter(|t| !t.is_empty())
            .or_else(|| previous_refresh.map(str::to_string))
            .ok_or_else(|| {
                AuthError::InvalidResponse("token response has no refresh_token".to_string())
            })?;
        tracing::debug!(
            expires_in = self.expires_in,
            refresh_expires_in = self.refresh_expires_in,
            token_type = self.token_type.as_deref(),
            scope = self.scope.as_deref(),
            "token response accepted"
        );
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, AuthError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::DeviceAuthorization(format!("response has no {field}")))
}

/// `now + expires_in` seconds, `None` when it leaves chrono's range.
fn expiry_after(now: DateTime<Utc>, expires_in: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(expires_in).ok()?;
    now.checked_add_signed(TimeDelta::try_seconds(secs)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(access: Option<&str>, refresh: Option<&str>) -> TokenResponse {
        TokenResponse {
            access_token: access.map(str::to_string),
            refresh_token: refresh.map(str::to_string),
            expires_in: Some(300),
            refresh_expires_in: Some(1800),
            token_type: Some("Bearer".to_string()),
            scope: Some("offline_access".to_string()),
        }
    }

    #[test]
    fn token_response_requires_both_halves_for_device_grant() {
        assert!(response(Some("a"), None).into_pair(None).is_err());
        assert!(response(None, Some("r")).into_pair(None).is_err());
        assert_eq!(
            response(Some("a"), Some("r")).into_pair(None).unwrap(),
            TokenPair::new("a", "r")
        );
    }

    #[test]
    fn refresh_without_rotation_keeps_previous_refresh_token() {
        let pair = response(Some("a2"), None).into_pair(Some("r1")).unwrap();
        assert_eq!(pair, TokenPair::new("a2", "r1"));
        let rotated = response(Some("a2"), Some("r2")).into_pair(Some("r1")).unwrap();
        assert_eq!(rotated.refresh_token, "r2");
    }

    #[test]
    fn expiry_after_rejects_out_of_range_lifetimes() {
        let now = Utc::now();
        assert_eq!(expiry_after(now, 600), Some(now + TimeDelta::seconds(600)));
        assert_eq!(expiry_after(now, 0), Some(now));
        assert_eq!(expiry_after(now, 10_000_000_000_000_000), None);
        assert_eq!(expiry_after(now, i64::MAX as u64 + 1), None);
        assert_eq!(expiry_after(now, u64::MAX), None);
    }
}
