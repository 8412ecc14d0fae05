//! rdu: developer utilities for Renku preview deployments.
//!
//! The core is an OAuth 2.0 Device Authorization Grant client that logs a
//! developer into a deployment's OIDC issuer, keeps the tokens in the OS
//! credential store and hands out fresh bearer tokens to REST clients.
//!
//! ```no_run
//! use std::sync::Arc;
//! use rdu::auth::{AuthManager, KeyringCredentialStore};
//! use rdu::config::RduConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> rdu::error::Result<()> {
//! let config = RduConfig::load()?;
//! let auth = config.auth_config("https://ci-renku-42.dev.renku.ch")?;
//! let manager = AuthManager::new(auth, Arc::new(KeyringCredentialStore::new()))?;
//! let token = manager.get_access_token(&CancellationToken::new()).await?;
//! # let _ = token;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod deployment;
pub mod error;
