use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use super::client::OidcClient;
use super::device_code::DeviceAuthorizationSession;
use super::error::AuthError;
use super::token::TokenPair;

/// Extra wait applied on `slow_down` under [`PollPolicy::Rfc8628`].
pub const SLOW_DOWN_INCREMENT: Duration = Duration::from_secs(5);

const MAX_WAIT: Duration = Duration::from_secs(86_400 * 365 * 30);

/// How the poller reacts to a failed token exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PollPolicy {
    /// Retry every failure on the next tick until the deadline.
    #[default]
    RetryUntilDeadline,
    /// Honor the RFC 8628 error codes: back off on `slow_down`, stop on
    /// `access_denied` and `expired_token`.
    Rfc8628,
}

impl FromStr for PollPolicy {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retry-until-deadline" | "retry" => Ok(Self::RetryUntilDeadline),
            "rfc8628" | "rfc-8628" => Ok(Self::Rfc8628),
            other => Err(AuthError::Configuration(format!(
                "unknown poll policy: {other} (supported: retry-until-deadline, rfc8628)"
            ))),
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, PartialEq, Eq)]
enum Next {
    Retry,
    SlowDown,
    Fail(Outcome),
}

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Denied,
    Expired,
}

fn classify(policy: PollPolicy, oauth_error: Option<&str>) -> Next {
    if policy == PollPolicy::RetryUntilDeadline {
        return Next::Retry;
    }
    match oauth_error {
        Some("slow_down") => Next::SlowDown,
        Some("access_denied") => Next::Fail(Outcome::Denied),
        Some("expired_token") => Next::Fail(Outcome::Expired),
        _ => Next::Retry,
    }
}

/// Polls the token endpoint for one device-flow session.
///
/// A tick fires every `poll_interval` (the first one after a full interval).
/// The loop ends on the first successful exchange, when the session's poll
/// budget runs out (`PollTimeout`), or when `cancel` fires (`PollCancelled`).
#[derive(Debug)]
pub struct TokenPoller<'a> {
    client: &'a OidcClient,
    policy: PollPolicy,
}

impl<'a> TokenPoller<'a> {
    pub fn new(client: &'a OidcClient, policy: PollPolicy) -> Self {
        Self { client, policy }
    }

    pub async fn poll(
        &self,
        session: &DeviceAuthorizationSession,
        cancel: &CancellationToken,
    ) -> Result<TokenPair, AuthError> {
        let deadline = after(Instant::now(), session.poll_budget());
        let deadline_sleep = sleep_until(deadline);
        tokio::pin!(deadline_sleep);

        let mut interval = session.interval();
        let mut next_tick = after(Instant::now(), interval);
        let mut attempts: u32 = 0;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AuthError::PollCancelled),
                _ = &mut deadline_sleep => return Err(AuthError::PollTimeout),
                _ = sleep_until(next_tick) => {}
            }

            attempts += 1;
            let attempt = tokio::select! {
                biased;
                _ = &mut deadline_sleep => return Err(AuthError::PollTimeout),
                result = self.client.exchange_device_code(&session.device_code, cancel) => result,
            };

            let failure = match attempt {
                Ok(pair) => {
                    tracing::info!(attempts, "device authorization approved");
                    return Ok(pair);
                }
                Err(failure) if failure.is_cancelled() => return Err(AuthError::PollCancelled),
                Err(failure) => failure,
            };
            tracing::debug!(attempts, error = %failure, "token exchange not ready");

            match classify(self.policy, failure.oauth_error()) {
                Next::Retry => {}
                Next::SlowDown => {
                    interval = interval.saturating_add(SLOW_DOWN_INCREMENT);
                    tracing::debug!(interval_secs = interval.as_secs(), "slowing down");
                }
                Next::Fail(Outcome::Denied) => return Err(AuthError::AccessDenied),
                Next::Fail(Outcome::Expired) => return Err(AuthError::DeviceCodeExpired),
            }
            next_tick = Instant::now().max(after(next_tick, interval));
        }
    }
}

/// `base + wait`, with waits past [`MAX_WAIT`] clamped so the addition
/// cannot overflow.
fn after(base: Instant, wait: Duration) -> Instant {
    base + wait.min(MAX_WAIT)
}
