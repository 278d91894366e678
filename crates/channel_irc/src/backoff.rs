use std::{ops::Range, time::Duration};

use rand::Rng;

/// Growth factor range applied on every escalation, drawn uniformly.
pub const GROWTH: Range<f64> = 1.5..2.5;

pub const DEFAULT_SEED: Duration = Duration::from_secs(3);
pub const DEFAULT_MAX: Duration = Duration::from_secs(10 * 60);

/// Randomized, capped, multiplicative reconnect delay.
///
/// The random factor keeps several relays from reconnecting in lockstep
/// after a server restart.
#[derive(Debug, Clone)]
pub struct Backoff {
    seed: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(seed: Duration, max: Duration) -> Self {
        let seed = seed.min(max);
        Self { seed, max, current: seed }
    }

    /// Delay to sleep before the next connection attempt.
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn seed(&self) -> Duration {
        self.seed
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Grow the delay by a random factor from [`GROWTH`], capped at `max`.
    pub fn grow(&mut self) -> Duration {
        let factor = rand::rng().random_range(GROWTH);
        self.grow_by(factor)
    }

    /// Grow by an explicit factor. Factors below 1 are treated as 1 so the
    /// delay never shrinks outside of [`Backoff::reset`].
    pub fn grow_by(&mut self, factor: f64) -> Duration {
        let factor = if factor.is_finite() { factor.max(1.0) } else { 1.0 };
        let max_secs = self.max.as_secs_f64();
        let next = (self.current.as_secs_f64() * factor).min(max_secs);
        self.current = Duration::from_secs_f64(next).min(self.max);
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.seed;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::new(DEFAULT_SEED, DEFAULT_MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_seed() {
        let b = Backoff::default();
        assert_eq!(b.current(), Duration::from_secs(3));
    }

    #[test]
    fn grows_monotonically_until_ceiling() {
        let mut b = Backoff::default();
        let mut last = b.current();
        for _ in 0..40 {
            let next = b.grow();
            assert!(next >= last, "{next:?} < {last:?}");
            assert!(next <= DEFAULT_MAX);
            last = next;
        }
        assert_eq!(b.current(), DEFAULT_MAX);
    }

    #[test]
    fn growth_stays_inside_factor_range() {
        for _ in 0..200 {
            let mut b = Backoff::new(Duration::from_secs(4), DEFAULT_MAX);
            let next = b.grow().as_secs_f64();
            assert!((6.0..10.0).contains(&next), "unexpected delay {next}");
        }
    }

    #[test]
    fn reset_returns_to_seed() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));
        b.grow_by(2.0);
        b.grow_by(2.0);
        assert_eq!(b.current(), Duration::from_secs(4));
        b.reset();
        assert_eq!(b.current(), Duration::from_secs(1));
    }

    #[test]
    fn silly_factors_never_shrink() {
        let mut b = Backoff::new(Duration::from_secs(2), Duration::from_secs(60));
        assert_eq!(b.grow_by(0.1), Duration::from_secs(2));
        assert_eq!(b.grow_by(f64::NAN), Duration::from_secs(2));
    }
}
