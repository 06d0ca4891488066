use std::time::Duration;

use crate::error::ApiError;

/// Exponential backoff schedule for callers that choose to reconnect.
///
/// The stream client never reconnects on its own; a dropped connection is
/// reported as `Disconnected` and the caller decides whether to consult this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (zero-based), or `None` once the
    /// attempts are used up.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = 2u32.saturating_pow(attempt.min(30));
        Some(self.base.saturating_mul(factor).min(self.max))
    }

    /// Auth failures need new credentials, not another attempt.
    pub fn should_retry(&self, error: &ApiError, attempt: u32) -> bool {
        if error.is_auth() || attempt >= self.max_attempts {
            return false;
        }
        match error.status() {
            Some(status) => status.is_server_error() || status.as_u16() == 429,
            None => error.is_transport(),
        }
    }
}
