//! JSON-over-HTTP helpers shared by discovery, device authorization and the
//! token endpoint.

use std::fmt;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::error::AuthError;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Why a single OIDC round-trip failed.
#[derive(Debug)]
pub(crate) enum HttpFailure {
    Cancelled,
    Transport(String),
    ContentType(String),
    Status {
        status: StatusCode,
        error: Option<String>,
        description: Option<String>,
    },
    Decode(String),
}

impl HttpFailure {
    /// OAuth `error` code from a rejected request, if the server sent one.
    pub(crate) fn oauth_error(&self) -> Option<&str> {
        match self {
            Self::Status { error, .. } => error.as_deref(),
            _ => None,
        }
    }

    /// Map into an [`AuthError`], wrapping everything but cancellation with
    /// the caller's variant.
    pub(crate) fn into_auth(self, wrap: impl FnOnce(String) -> AuthError) -> AuthError {
        match self {
            Self::Cancelled => AuthError::PollCancelled,
            other => wrap(other.to_string()),
        }
    }
}

impl fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "request cancelled"),
            Self::Transport(msg) => write!(f, "{msg}"),
            Self::ContentType(got) => write!(
                f,
                "expected '{JSON_CONTENT_TYPE}' but got response with content type '{got}'"
            ),
            Self::Status {
                status,
                error,
                description,
            } => {
                write!(f, "got non successful response '{status}'")?;
                if let Some(error) = error {
                    write!(f, ": {error}")?;
                }
                if let Some(description) = description {
                    write!(f, " ({description})")?;
                }
                Ok(())
            }
            Self::Decode(msg) => write!(f, "could not decode response: {msg}"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

/// `GET url`, accepting only a JSON body.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    cancel: &CancellationToken,
) -> Result<T, HttpFailure> {
    tracing::debug!(url, "GET");
    let request = client.get(url).header(ACCEPT, JSON_CONTENT_TYPE);
    execute(request, cancel).await
}

/// Form-encoded `POST url`, accepting only a JSON body.
pub(crate) async fn post_form<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    form: &[(&str, &str)],
    cancel: &CancellationToken,
) -> Result<T, HttpFailure> {
    tracing::debug!(url, "POST form");
    let request = client
        .post(url)
        .header(ACCEPT, JSON_CONTENT_TYPE)
        .form(form);
    execute(request, cancel).await
}

async fn execute<T: DeserializeOwned>(
    request: RequestBuilder,
    cancel: &CancellationToken,
) -> Result<T, HttpFailure> {
    if cancel.is_cancelled() {
        return Err(HttpFailure::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(HttpFailure::Cancelled),
        result = round_trip(request) => result,
    }
}

async fn round_trip<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, HttpFailure> {
    let resp = request
        .send()
        .await
        .map_err(|e| HttpFailure::Transport(e.to_string()))?;
    let status = resp.status();
    let content_type = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if !is_json(&content_type) {
        if !status.is_success() {
            return Err(HttpFailure::Status {
                status,
                error: None,
                description: None,
            });
        }
        return Err(HttpFailure::ContentType(content_type));
    }
    let body = resp
        .bytes()
        .await
        .map_err(|e| HttpFailure::Transport(e.to_string()))?;
    tracing::debug!(status = status.as_u16(), "response received");
    if !status.is_success() {
        let parsed: Option<OAuthErrorBody> = serde_json::from_slice(&body).ok();
        let (error, description) = parsed
            .map(|b| (b.error, b.error_description))
            .unwrap_or((None, None));
        return Err(HttpFailure::Status {
            status,
            error,
            description,
        });
    }
    serde_json::from_slice(&body).map_err(|e| HttpFailure::Decode(e.to_string()))
}

fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|essence| essence.trim().eq_ignore_ascii_case(JSON_CONTENT_TYPE))
        .unwrap_or(false)
}
