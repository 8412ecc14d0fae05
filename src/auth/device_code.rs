use std::time::Duration;

use chrono::{DateTime, Utc};

/// Interval used when the server omits `interval` or sends zero.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// One device-flow login attempt. Never persisted.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use chrono::Utc;
/// use rdu::auth::DeviceAuthorizationSession;
///
/// let session = DeviceAuthorizationSession {
///     device_code: "device-code".to_string(),
///     user_code: "ABCD-EFGH".to_string(),
///     verification_uri: "https://id.example/device".to_string(),
///     verification_uri_complete: "https://id.example/device?user_code=ABCD-EFGH".to_string(),
///     expires_at: Utc::now() + chrono::Duration::minutes(10),
///     poll_interval: Duration::from_secs(5),
/// };
/// assert!(session.remaining() > Duration::ZERO);
/// ```
#[derive(Debug, Clone)]
pub struct DeviceAuthorizationSession {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: String,
    pub expires_at: DateTime<Utc>,
    pub poll_interval: Duration,
}

impl DeviceAuthorizationSession {
    /// Time left before the device code expires, zero once it has.
    pub fn remaining(&self) -> Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }

    /// How long polling may run: the code lifetime plus one interval of grace
    /// so a final tick still lands.
    pub fn poll_budget(&self) -> Duration {
        self.remaining().saturating_add(self.interval())
    }

    /// Delay between token requests, with a zero interval replaced by the
    /// default.
    pub fn interval(&self) -> Duration {
        if self.poll_interval.is_zero() {
            DEFAULT_POLL_INTERVAL
        } else {
            self.poll_interval
        }
    }
}

/// Normalize the server's `interval`, treating absent or zero as the default.
pub fn effective_interval(interval_secs: Option<u64>) -> Duration {
    match interval_secs {
        Some(secs) if secs > 0 => Duration::from_secs(secs),
        _ => DEFAULT_POLL_INTERVAL,
    }
}
