//! OAuth 2.0 device authorization against a deployment's OIDC issuer, with
//! persistent token storage and transparent refresh.

pub mod browser;
pub mod client;
pub mod device_code;
pub mod discovery;
pub mod error;
mod http;
pub mod manager;
pub mod poller;
pub mod store;
pub mod token;

pub use browser::{BrowserLauncher, NoBrowser, RecordingBrowser, SystemBrowser};
pub use client::OidcClient;
pub use device_code::{DeviceAuthorizationSession, DEFAULT_POLL_INTERVAL};
pub use discovery::{OidcDiscovery, OidcEndpoints};
pub use error::AuthError;
pub use manager::{logout_all, AuthManager, LoginOutcome};
pub use poller::{PollPolicy, TokenPoller};
pub use store::{
    CredentialKey, CredentialStore, FileCredentialStore, KeyringCredentialStore,
    MemoryCredentialStore, TokenKind, SERVICE_NAME,
};
pub use token::{is_valid, is_valid_at, token_expiry, TokenPair, DEFAULT_LEEWAY};
