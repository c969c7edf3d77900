//! Retry backoff: exponential growth with jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::SyncConfig;

/// `delay = min(max, base * 2^attempt) ± random(0, base)`.
///
/// Jitter keeps a fleet of devices from hammering a recovering uplink in
/// lockstep.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            base: Duration::from_millis(config.backoff_base_ms),
            max: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// Delay before the retry following `attempt` prior failures.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.base.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;

        let exp = attempt.min(32);
        let raw = base_ms.saturating_mul(1u64 << exp).min(max_ms);

        let mut rng = rand::rng();
        let jitter = if base_ms == 0 {
            0
        } else {
            rng.random_range(0..=base_ms)
        };
        let jittered = if rng.random_bool(0.5) {
            raw.saturating_add(jitter)
        } else {
            raw.saturating_sub(jitter)
        };

        Duration::from_millis(jittered.min(max_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(100),
            max: Duration::from_millis(2_000),
        }
    }

    #[test]
    fn delay_stays_within_jitter_band() {
        let policy = policy();
        for attempt in 0..4u32 {
            let raw = 100u64 * (1 << attempt);
            for _ in 0..50 {
                let delay = policy.delay_for_attempt(attempt).as_millis() as u64;
                assert!(delay <= (raw + 100).min(2_000), "attempt {attempt}: {delay}");
                assert!(delay + 100 >= raw.min(2_000), "attempt {attempt}: {delay}");
            }
        }
    }

    #[test]
    fn delay_is_capped_at_max() {
        let policy = policy();
        for _ in 0..50 {
            assert!(policy.delay_for_attempt(30) <= Duration::from_millis(2_000));
        }
    }

    #[test]
    fn huge_attempt_counts_do_not_overflow() {
        let policy = policy();
        assert!(policy.delay_for_attempt(u32::MAX) <= Duration::from_millis(2_000));
    }
}
