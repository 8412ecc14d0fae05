use std::sync::Arc;

use reqwest::header::ACCEPT;
use reqwest::Url;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::RequestEditor;
use crate::error::RduError;

const API_PATH: &str = "/api/data";

/// The caller's own account, as reported by the data service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SelfUserInfo {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

/// Client for the `users` endpoints of the data service.
pub struct UsersClient {
    http: reqwest::Client,
    api_url: Url,
    editor: Arc<dyn RequestEditor>,
}

impl std::fmt::Debug for UsersClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsersClient")
            .field("api_url", &self.api_url.as_str())
            .finish()
    }
}

impl UsersClient {
    /// `base_url` may be the deployment root or its `/api/data` prefix.
    pub fn new(http: reqwest::Client, base_url: &Url, editor: Arc<dyn RequestEditor>) -> Self {
        Self {
            http,
            api_url: api_url(base_url),
            editor,
        }
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// `GET /api/data/user`
    pub async fn get_user(&self, cancel: &CancellationToken) -> Result<SelfUserInfo, RduError> {
        let url = format!("{}/user", self.api_url.as_str().trim_end_matches('/'));
        let mut request = self
            .http
            .get(&url)
            .header(ACCEPT, "application/json")
            .build()?;
        self.editor.edit(&mut request, cancel).await?;

        tracing::debug!(%url, "fetching user info");
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RduError::Cancelled),
            response = self.http.execute(request) => response?,
        };
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|b| b.error.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(RduError::api(
                status.as_u16(),
                format!("could not get user info: {message}"),
            ));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

fn api_url(base_url: &Url) -> Url {
    let mut url = base_url.clone();
    if !url.path().trim_end_matches('/').ends_with(API_PATH) {
        let path = format!("{}{API_PATH}", url.path().trim_end_matches('/'));
        url.set_path(&path);
    }
    url
}
