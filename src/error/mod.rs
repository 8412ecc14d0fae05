//! Error types for rdu.

use thiserror::Error;

use crate::auth::AuthError;

/// Primary error type for CLI commands and REST collaborators.
#[derive(Error, Debug)]
pub enum RduError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Command `{program}` failed: {message}")]
    Command { program: String, message: String },

    #[error("Operation was cancelled")]
    Cancelled,
}

impl RduError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether the error is fixed by running `rdu login` again.
    pub fn requires_login(&self) -> bool {
        match self {
            Self::Auth(err) => err.requires_login(),
            Self::Api { status, .. } => *status == 401,
            _ => false,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, RduError>;
