//! Token pair and client-side expiry inspection.
//!
//! Claims are decoded WITHOUT verifying the signature. The server stays the
//! authority on whether a token is accepted; the expiry read here is only a
//! liveness hint used to avoid sending an obviously stale token. Never use it
//! to make an authorization decision.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::error::AuthError;

/// Safety margin subtracted from a token's `exp` claim.
pub const DEFAULT_LEEWAY: Duration = Duration::from_secs(10);

/// Access/refresh token pair issued by the token endpoint.
///
/// # Example
/// ```
/// use rdu::auth::TokenPair;
///
/// let pair = TokenPair::new("access", "refresh");
/// assert_eq!(pair.access_token, "access");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"..")
            .field("refresh_token", &"..")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    exp: Option<serde_json::Value>,
}

/// Read the `exp` claim of a JWT without verifying it.
pub fn token_expiry(token: &str) -> Result<DateTime<Utc>, AuthError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::TokenParse(
            "token is not a three-part JWT".to_string(),
        ));
    };
    let raw = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::TokenParse(format!("payload is not base64url: {e}")))?;
    let claims: ExpiryClaims = serde_json::from_slice(&raw)
        .map_err(|e| AuthError::TokenParse(format!("payload is not a JSON object: {e}")))?;
    let exp = claims
        .exp
        .ok_or_else(|| AuthError::TokenParse("missing exp claim".to_string()))?;
    let secs = match exp {
        serde_json::Value::Number(num) => num
            .as_i64()
            .or_else(|| num.as_f64().map(|f| f.trunc() as i64)),
        _ => None,
    }
    .ok_or_else(|| AuthError::TokenParse("exp claim is not numeric".to_string()))?;
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| AuthError::TokenParse(format!("exp claim out of range: {secs}")))
}

/// `true` when `token` expires more than `leeway` after `now`.
///
/// Unparsable tokens and tokens without `exp` are never valid.
pub fn is_valid_at(token: &str, now: DateTime<Utc>, leeway: Duration) -> bool {
    let Ok(expires_at) = token_expiry(token) else {
        return false;
    };
    let Ok(leeway) = chrono::Duration::from_std(leeway) else {
        return false;
    };
    expires_at
        .checked_sub_signed(leeway)
        .is_some_and(|limit| now < limit)
}

/// [`is_valid_at`] against the current clock and the default leeway.
pub fn is_valid(token: &str) -> bool {
    is_valid_at(token, Utc::now(), DEFAULT_LEEWAY)
}
