#![allow(dead_code)]

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use rdu::auth::{
    AuthError, AuthManager, CredentialKey, CredentialStore, MemoryCredentialStore,
    RecordingBrowser, TokenKind,
};
use rdu::config::AuthConfig;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const DISCOVERY_PATH: &str = "/auth/realms/Renku/.well-known/openid-configuration";
pub const DEVICE_PATH: &str = "/auth/realms/Renku/protocol/openid-connect/auth/device";
pub const TOKEN_PATH: &str = "/auth/realms/Renku/protocol/openid-connect/token";

/// Unsigned JWT whose `exp` is `secs` from now.
pub fn jwt_expiring_in(secs: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        json!({ "exp": Utc::now().timestamp() + secs, "sub": "user-1" })
            .to_string()
            .as_bytes(),
    );
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

pub fn auth_config(server: &MockServer) -> AuthConfig {
    AuthConfig::new(&server.uri()).unwrap()
}

pub fn key(config: &AuthConfig, kind: TokenKind) -> CredentialKey {
    CredentialKey::new(config.base_key(), kind)
}

pub fn manager_with(
    config: AuthConfig,
    store: Arc<dyn CredentialStore>,
) -> (AuthManager, Arc<RecordingBrowser>) {
    let browser = Arc::new(RecordingBrowser::new());
    let manager = AuthManager::with_http_client(config, store, reqwest::Client::new())
        .with_browser(browser.clone());
    (manager, browser)
}

pub fn manager(
    server: &MockServer,
    store: Arc<dyn CredentialStore>,
) -> (AuthManager, Arc<RecordingBrowser>) {
    manager_with(auth_config(server), store)
}

pub async fn mount_discovery(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": format!("{}/auth/realms/Renku", server.uri()),
            "device_authorization_endpoint": format!("{}{DEVICE_PATH}", server.uri()),
            "token_endpoint": format!("{}{TOKEN_PATH}", server.uri()),
        })))
        .mount(server)
        .await;
}

pub async fn mount_device_authorization(server: &MockServer, expires_in: u64, interval: u64) {
    Mock::given(method("POST"))
        .and(path(DEVICE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_code": "device-code-1",
            "user_code": "ABCD-EFGH",
            "verification_uri": "https://id.example/device",
            "verification_uri_complete": "https://id.example/device?user_code=ABCD-EFGH",
            "expires_in": expires_in,
            "interval": interval,
        })))
        .mount(server)
        .await;
}

pub fn oauth_error(code: &str) -> ResponseTemplate {
    ResponseTemplate::new(400).set_body_json(json!({ "error": code }))
}

pub fn token_response(access_token: &str, refresh_token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": access_token,
        "refresh_token": refresh_token,
        "expires_in": 300,
        "refresh_expires_in": 1800,
        "token_type": "Bearer",
        "scope": "offline_access",
    }))
}

/// Memory store that fails selected operations.
#[derive(Default)]
pub struct FailingStore {
    pub inner: MemoryCredentialStore,
    fail_set: Option<TokenKind>,
    fail_delete: bool,
}

impl FailingStore {
    pub fn failing_set(kind: TokenKind) -> Self {
        Self {
            fail_set: Some(kind),
            ..Self::default()
        }
    }

    pub fn failing_deletes() -> Self {
        Self {
            fail_delete: true,
            ..Self::default()
        }
    }
}

impl CredentialStore for FailingStore {
    fn get(&self, key: &CredentialKey) -> Result<Option<String>, AuthError> {
        self.inner.get(key)
    }

    fn set(&self, key: &CredentialKey, secret: &str) -> Result<(), AuthError> {
        if let Some(kind) = self.fail_set {
            if key.account().ends_with(kind.as_str()) {
                return Err(AuthError::StoreWrite("injected failure".to_string()));
            }
        }
        self.inner.set(key, secret)
    }

    fn delete(&self, key: &CredentialKey) -> Result<(), AuthError> {
        if self.fail_delete {
            return Err(AuthError::StoreWrite("injected failure".to_string()));
        }
        self.inner.delete(key)
    }

    fn delete_all(&self) -> Result<(), AuthError> {
        self.inner.delete_all()
    }
}
