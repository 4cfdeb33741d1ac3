//! Reconnection delay schedule.

use std::time::Duration;

use rand::Rng;

use crate::models::ConnectionOptions;

/// Exponential backoff with symmetric random jitter.
///
/// Attempt 1 waits `base`, each further attempt doubles the wait, capped at
/// `max`. Jitter spreads each delay by up to `±jitter * delay` and never
/// pushes it above `max`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Backoff {
    base: Duration,
    max: Duration,
    jitter: f64,
}

impl Backoff {
    pub(crate) fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter: if jitter.is_finite() { jitter.clamp(0.0, 1.0) } else { 0.0 },
        }
    }

    pub(crate) fn from_options(options: &ConnectionOptions) -> Self {
        Self::new(
            options.reconnect_delay(),
            options.max_reconnect_delay(),
            options.reconnect_jitter,
        )
    }

    /// Delay before attempt number `attempt` (1-based), without jitter.
    pub(crate) fn nominal_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let base_ms = self.base.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        Duration::from_millis(base_ms.saturating_mul(1u64 << exponent).min(max_ms))
    }

    /// Delay before attempt number `attempt` (1-based), jittered.
    pub(crate) fn delay_for(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_delay(attempt);
        if self.jitter == 0.0 || nominal.is_zero() {
            return nominal;
        }
        let nominal_ms = nominal.as_millis() as f64;
        let spread = nominal_ms * self.jitter;
        let offset = rand::rng().random_range(-spread..=spread);
        let max_ms = self.max.as_millis() as f64;
        Duration::from_millis((nominal_ms + offset).clamp(0.0, max_ms) as u64)
    }
}
