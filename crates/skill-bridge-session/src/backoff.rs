//! Linear reconnect backoff with jitter.

use std::time::Duration;

use rand::{Rng, SeedableRng, rngs::StdRng};
use skill_bridge_core::BackoffConfig;

/// Delay that, when drawn on a successful open, resets the backoff.
///
/// Only an exact match resets. With jitter enabled this is rare; the narrow
/// condition is kept as deployed.
pub const RESET_THRESHOLD: Duration = Duration::from_millis(4000);

/// Linear backoff: each draw returns the current delay (jittered) and then
/// advances it by one step, up to the maximum.
#[derive(Debug, Clone)]
pub struct LinearBackoff<R = StdRng> {
    config: BackoffConfig,
    current_ms: u64,
    rng: R,
}

impl LinearBackoff<StdRng> {
    /// Create a backoff seeded from the OS.
    #[must_use]
    pub fn new(config: BackoffConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }
}

impl<R: Rng> LinearBackoff<R> {
    /// Create a backoff with a caller-supplied random source.
    pub fn with_rng(config: BackoffConfig, rng: R) -> Self {
        Self {
            current_ms: config.min_ms,
            config,
            rng,
        }
    }

    /// Current delay before jitter.
    #[must_use]
    pub const fn nominal(&self) -> Duration {
        Duration::from_millis(self.current_ms)
    }

    /// Draw the next delay and advance.
    pub fn next_delay(&mut self) -> Duration {
        let nominal = self.current_ms;
        self.current_ms = nominal
            .saturating_add(self.config.step_ms)
            .min(self.config.max_ms.max(self.config.min_ms));
        Duration::from_millis(self.jittered(nominal))
    }

    /// Return to the minimum delay.
    pub fn reset(&mut self) {
        self.current_ms = self.config.min_ms;
    }

    /// Account for a successful open.
    ///
    /// Draws a delay like a failure would, and resets when it equals
    /// [`RESET_THRESHOLD`].
    pub fn on_connected(&mut self) -> Duration {
        let drawn = self.next_delay();
        if drawn == RESET_THRESHOLD {
            self.reset();
        }
        drawn
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn jittered(&mut self, nominal: u64) -> u64 {
        let jitter = self.config.jitter.clamp(0.0, 1.0);
        if jitter <= 0.0 {
            return nominal;
        }
        let spread: f64 = self.rng.gen_range(-1.0..=1.0);
        (nominal as f64 * jitter.mul_add(spread, 1.0)).round().max(0.0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact() -> LinearBackoff {
        LinearBackoff::new(BackoffConfig {
            jitter: 0.0,
            ..BackoffConfig::default()
        })
    }

    #[test]
    fn test_linear_steps_clamp_at_max() {
        let mut backoff = exact();
        let delays: Vec<u64> = (0..20)
            .map(|_| u64::try_from(backoff.next_delay().as_millis()).unwrap())
            .collect();

        assert_eq!(&delays[..4], &[2000, 2250, 2500, 2750]);
        assert_eq!(delays[16], 6000);
        assert!(delays[16..].iter().all(|&d| d == 6000));
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_reset() {
        let mut backoff = exact();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(2000));
    }

    #[test]
    fn test_on_connected_resets_only_at_threshold() {
        let mut backoff = exact();
        for _ in 0..8 {
            backoff.next_delay();
        }
        assert_eq!(backoff.nominal(), RESET_THRESHOLD);
        assert_eq!(backoff.on_connected(), RESET_THRESHOLD);
        assert_eq!(backoff.nominal(), Duration::from_millis(2000));

        // Any other value just advances.
        assert_eq!(backoff.on_connected(), Duration::from_millis(2000));
        assert_eq!(backoff.nominal(), Duration::from_millis(2250));
    }

    #[test]
    fn test_jitter_stays_within_ratio() {
        let config = BackoffConfig::default();
        let mut backoff = LinearBackoff::with_rng(config, StdRng::seed_from_u64(7));

        for _ in 0..50 {
            let nominal = backoff.nominal().as_secs_f64() * 1000.0;
            let drawn = backoff.next_delay().as_secs_f64() * 1000.0;
            assert!(drawn >= (nominal * (1.0 - config.jitter)).floor());
            assert!(drawn <= (nominal * (1.0 + config.jitter)).ceil());
        }
    }

    #[test]
    fn test_three_failures_non_decreasing_nominal() {
        let mut backoff = LinearBackoff::with_rng(BackoffConfig::default(), StdRng::seed_from_u64(1));
        let mut nominals = Vec::new();
        for _ in 0..3 {
            nominals.push(backoff.nominal());
            let drawn = backoff.next_delay();
            assert!(drawn <= Duration::from_millis(6000 * 2));
        }
        assert_eq!(
            nominals,
            vec![
                Duration::from_millis(2000),
                Duration::from_millis(2250),
                Duration::from_millis(2500)
            ]
        );
    }
}
