//! Exponential reconnection delay with jitter.
//!
//! Delay for attempt `n` is `min(delay * 2^n, delay_max)`, then shifted by up
//! to `randomization * delay` in either direction and clamped to `delay_max`.

use std::time::Duration;

use rand::Rng;

use crate::config::ReconnectPolicy;

const FACTOR: u32 = 2;

#[derive(Clone, Debug)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempts: 0 }
    }

    /// Attempts handed out since the last [`Backoff::reset`].
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the attempt budget is spent.
    #[must_use]
    pub fn exhausted(&self) -> bool {
        !self.policy.enabled || self.attempts >= self.policy.attempts
    }

    /// Delay before the next attempt; counts the attempt.
    pub fn next_delay(&mut self, rng: &mut impl Rng) -> Duration {
        let base = self.base_delay();
        self.attempts = self.attempts.saturating_add(1);

        let jitter = self.policy.randomization.clamp(0.0, 1.0);
        if jitter <= 0.0 {
            return base;
        }
        let deviation = base.mul_f64(rng.random::<f64>() * jitter);
        let delay = if rng.random::<bool>() {
            base.saturating_add(deviation)
        } else {
            base.saturating_sub(deviation)
        };
        delay.min(self.policy.delay_max)
    }

    /// Start over after a successful connection.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    fn base_delay(&self) -> Duration {
        let multiplier = FACTOR.checked_pow(self.attempts).unwrap_or(u32::MAX);
        self.policy
            .delay
            .checked_mul(multiplier)
            .unwrap_or(self.policy.delay_max)
            .min(self.policy.delay_max)
    }
}

#[cfg(test)]
#[path = "backoff_test.rs"]
mod tests;
