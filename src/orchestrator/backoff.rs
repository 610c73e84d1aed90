//! Exponential backoff with jitter for phase retries.

use std::time::Duration;

use rand::Rng;

use crate::config::BackoffSettings;

/// Computes retry delays from [`BackoffSettings`].
///
/// Delay grows as `base * multiplier^(attempt - 1)`, capped at the configured
/// maximum. When jitter is enabled a random fraction of the delay (up to
/// `max_jitter`) is added so that phases retried in the same tick do not
/// thunder back in lockstep.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    settings: BackoffSettings,
}

impl BackoffPolicy {
    pub fn new(settings: BackoffSettings) -> Self {
        Self { settings }
    }

    /// Delay before retry `attempt` (1-based; attempt 1 is the first retry).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = self.settings.multiplier.max(1.0).powi(exponent as i32);
        let base = self.settings.base_delay_ms as f64;
        let capped = (base * factor).min(self.settings.max_delay_ms as f64);

        let with_jitter = if self.settings.jitter_enabled && self.settings.max_jitter > 0.0 {
            let jitter = rand::thread_rng().gen_range(0.0..=self.settings.max_jitter);
            capped * (1.0 + jitter)
        } else {
            capped
        };

        Duration::from_millis(with_jitter.round() as u64)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(BackoffSettings::default())
    }
}
