//! Reconnect backoff schedule

use rand::Rng;
use std::time::Duration;

/// Exponential backoff with jitter and an optional attempt budget
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay after the first failure
    pub initial: Duration,
    /// Upper bound for any delay
    pub max: Duration,
    /// Consecutive failures tolerated before giving up (0 = never give up)
    pub max_attempts: u32,
    /// Random spread applied to each delay, as a fraction (0.0..=1.0)
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(10),
            max_attempts: 10,
            jitter: 0.1,
        }
    }
}

impl ReconnectPolicy {
    /// Delay after `attempt` consecutive failures, before jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(31);
        self.initial
            .checked_mul(1u32 << doublings)
            .unwrap_or(self.max)
            .min(self.max)
    }

    /// Delay after `attempt` consecutive failures, with jitter applied
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || base.is_zero() {
            return base;
        }

        let factor = rand::rng().random_range(1.0 - jitter..=1.0 + jitter);
        base.mul_f64(factor).min(self.max)
    }

    /// Whether `attempt` consecutive failures use up the budget
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        self.max_attempts != 0 && attempt >= self.max_attempts
    }
}
