use thiserror::Error;

/// Errors raised by the device-flow client, the token cache and the manager.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("OIDC discovery failed: {0}")]
    Discovery(String),
    #[error("Device authorization failed: {0}")]
    DeviceAuthorization(String),
    #[error("Timed out waiting for the login to be approved")]
    PollTimeout,
    #[error("Login was cancelled")]
    PollCancelled,
    #[error("Login request was denied")]
    AccessDenied,
    #[error("Device code expired before the login was approved")]
    DeviceCodeExpired,
    #[error("Token refresh failed: {0}")]
    Refresh(String),
    #[error("Could not read from credential store: {0}")]
    StoreRead(String),
    #[error("Could not write to credential store: {0}")]
    StoreWrite(String),
    #[error("No credential stored under {0}")]
    CredentialNotFound(String),
    #[error("Could not parse token claims: {0}")]
    TokenParse(String),
    #[error("could not get access token")]
    NotLoggedIn,
    #[error("Logout failed: {first}; {second}")]
    Logout {
        first: Box<AuthError>,
        second: Box<AuthError>,
    },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AuthError {
    /// Whether the user has to run `rdu login` to recover.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            Self::NotLoggedIn | Self::Refresh(_) | Self::CredentialNotFound(_)
        )
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::InvalidResponse(error.to_string())
    }
}

impl From<toml::de::Error> for AuthError {
    fn from(error: toml::de::Error) -> Self {
        Self::StoreRead(error.to_string())
    }
}

impl From<toml::ser::Error> for AuthError {
    fn from(error: toml::ser::Error) -> Self {
        Self::StoreWrite(error.to_string())
    }
}
