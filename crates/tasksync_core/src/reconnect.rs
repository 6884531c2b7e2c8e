use std::time::Duration;

/// Close code for a normal, caller-initiated close. Any other code is abnormal.
pub const NORMAL_CLOSE: u16 = 1000;

/// Linear backoff with a hard attempt bound.
///
/// Attempts are numbered from 1; attempt `n` waits `base_delay * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(3000),
        }
    }
}

impl ReconnectPolicy {
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt >= 1 && attempt <= self.max_attempts
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    pub fn is_abnormal_close(code: u16) -> bool {
        code != NORMAL_CLOSE
    }
}
