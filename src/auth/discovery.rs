use reqwest::Url;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use super::error::AuthError;
use super::http;

/// Endpoints advertised by the issuer's discovery document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidcEndpoints {
    pub device_authorization_endpoint: Url,
    pub token_endpoint: Url,
}

/// Resolves and memoizes the issuer's OIDC endpoints.
///
/// The document is fetched at most once per instance; a changed server
/// configuration is only picked up by a new instance.
#[derive(Debug)]
pub struct OidcDiscovery {
    client: reqwest::Client,
    issuer_url: Url,
    endpoints: OnceCell<OidcEndpoints>,
}

impl OidcDiscovery {
    pub fn new(client: reqwest::Client, issuer_url: Url) -> Self {
        Self {
            client,
            issuer_url,
            endpoints: OnceCell::new(),
        }
    }

    pub fn issuer_url(&self) -> &Url {
        &self.issuer_url
    }

    /// `<issuer>/.well-known/openid-configuration`
    pub fn configuration_url(&self) -> String {
        format!(
            "{}/.well-known/openid-configuration",
            self.issuer_url.as_str().trim_end_matches('/')
        )
    }

    /// Endpoints if they were already resolved.
    pub fn cached(&self) -> Option<&OidcEndpoints> {
        self.endpoints.get()
    }

    pub async fn resolve(&self, cancel: &CancellationToken) -> Result<&OidcEndpoints, AuthError> {
        self.endpoints.get_or_try_init(|| self.fetch(cancel)).await
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<OidcEndpoints, AuthError> {
        let url = self.configuration_url();
        let document: DiscoveryDocument = http::get_json(&self.client, &url, cancel)
            .await
            .map_err(|e| e.into_auth(|msg| AuthError::Discovery(format!("{url}: {msg}"))))?;
        let endpoints = OidcEndpoints {
            device_authorization_endpoint: parse_endpoint(
                "device_authorization_endpoint",
                document.device_authorization_endpoint,
            )?,
            token_endpoint: parse_endpoint("token_endpoint", document.token_endpoint)?,
        };
        tracing::debug!(
            issuer = %self.issuer_url,
            token_endpoint = %endpoints.token_endpoint,
            "resolved OIDC endpoints"
        );
        Ok(endpoints)
    }
}

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    device_authorization_endpoint: Option<String>,
    token_endpoint: Option<String>,
}

fn parse_endpoint(field: &str, value: Option<String>) -> Result<Url, AuthError> {
    let raw = value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AuthError::Discovery(format!("discovery document has no {field}")))?;
    Url::parse(&raw).map_err(|e| AuthError::Discovery(format!("{field} '{raw}' is not a URL: {e}")))
}
