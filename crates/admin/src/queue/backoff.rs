//! Exponential backoff with jitter between job attempts.
//!
//! Attempt `n` (1-based) waits `base * 2^(n-1)`, capped at `max`, then
//! spread by ±`jitter` so failed jobs don't retry in lockstep.

use std::time::Duration;

use rand::Rng;

/// Backoff policy for failed jobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    /// Fraction of the delay to randomise (0.2 = ±20%).
    pub jitter: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60 * 60),
            jitter: 0.2,
        }
    }
}

impl Backoff {
    #[must_use]
    pub const fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self { base, max, jitter }
    }

    /// Delay before retrying after failed attempt `attempt`, without jitter.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1_u32 << exponent;
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Delay before retrying after failed attempt `attempt`, with jitter.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay(attempt).as_secs_f64() * 1000.0;
        let spread = base_ms * self.jitter.clamp(0.0, 1.0);
        let min = (base_ms - spread).max(0.0);
        let max = base_ms + spread;

        let jittered = if max > min {
            rand::rng().random_range(min..=max)
        } else {
            base_ms
        };
        Duration::from_secs_f64(jittered / 1000.0).min(self.max)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn policy() -> Backoff {
        Backoff::new(Duration::from_millis(100), Duration::from_secs(5), 0.2)
    }

    #[test]
    fn test_base_delay_doubles() {
        let b = policy();
        assert_eq!(b.base_delay(1), Duration::from_millis(100));
        assert_eq!(b.base_delay(2), Duration::from_millis(200));
        assert_eq!(b.base_delay(3), Duration::from_millis(400));
        assert_eq!(b.base_delay(0), Duration::from_millis(100));
    }

    #[test]
    fn test_base_delay_caps() {
        let b = policy();
        assert_eq!(b.base_delay(10), Duration::from_secs(5));
        assert_eq!(b.base_delay(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let b = policy();
        for _ in 0..200 {
            let d = b.delay(3);
            assert!(d >= Duration::from_millis(319), "{d:?}");
            assert!(d <= Duration::from_millis(481), "{d:?}");
        }
    }

    #[test]
    fn test_jitter_never_exceeds_cap() {
        let b = policy();
        for _ in 0..200 {
            assert!(b.delay(20) <= Duration::from_secs(5));
        }
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let b = Backoff::new(Duration::from_millis(250), Duration::from_secs(60), 0.0);
        assert_eq!(b.delay(2), Duration::from_millis(500));
    }
}
