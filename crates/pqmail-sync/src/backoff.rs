//! Backoff delays for SSE reconnects and polling.
//!
//! Both functions apply jitter on top of the capped delay, so a delay lies in
//! `[capped, capped * (1 + jitter))`. A jitter of zero is exactly
//! deterministic.

use std::time::Duration;

use rand::Rng;

/// Exponential delay for reconnect attempt `attempt` (1-based).
///
/// `min(base * 2^(attempt - 1), base * max_multiplier)` plus jitter.
/// Attempt 0 is treated as attempt 1.
pub fn exponential(base: Duration, attempt: u32, max_multiplier: u32, jitter: f64) -> Duration {
    let exponent = attempt.max(1) - 1;
    let multiplier = 1u32
        .checked_shl(exponent)
        .unwrap_or(u32::MAX)
        .min(max_multiplier.max(1));
    with_jitter(base.saturating_mul(multiplier), jitter)
}

/// Grow `current` by `multiplier`, capped at `max`, plus jitter.
pub fn linear(current: Duration, multiplier: f64, max: Duration, jitter: f64) -> Duration {
    let grown = Duration::try_from_secs_f64(current.as_secs_f64() * multiplier)
        .unwrap_or(max)
        .min(max);
    with_jitter(grown, jitter)
}

fn with_jitter(delay: Duration, jitter: f64) -> Duration {
    if jitter.is_nan() || jitter <= 0.0 || delay.is_zero() {
        return delay;
    }
    let factor = rand::thread_rng().gen_range(0.0..jitter);
    delay.saturating_add(delay.mul_f64(factor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SECOND: Duration = Duration::from_millis(1000);

    #[test]
    fn test_exponential_first_attempt_is_base() {
        assert_eq!(exponential(SECOND, 1, 32, 0.0), SECOND);
    }

    #[test]
    fn test_exponential_doubles() {
        assert_eq!(exponential(SECOND, 2, 100, 0.0), Duration::from_millis(2000));
        assert_eq!(exponential(SECOND, 3, 100, 0.0), Duration::from_millis(4000));
        assert_eq!(exponential(SECOND, 6, 100, 0.0), Duration::from_millis(32000));
    }

    #[test]
    fn test_exponential_zero_attempt_is_first() {
        assert_eq!(exponential(SECOND, 0, 32, 0.0), SECOND);
    }

    #[test]
    fn test_exponential_capped() {
        assert_eq!(exponential(SECOND, 10, 32, 0.0), Duration::from_secs(32));
        assert_eq!(exponential(SECOND, 200, 32, 0.0), Duration::from_secs(32));
    }

    #[test]
    fn test_linear_grows_and_caps() {
        let max = Duration::from_secs(30);
        assert_eq!(linear(Duration::from_secs(2), 1.5, max, 0.0), Duration::from_secs(3));
        assert_eq!(linear(Duration::from_secs(25), 1.5, max, 0.0), max);
    }

    #[test]
    fn test_linear_nonsense_multiplier_caps() {
        let max = Duration::from_secs(30);
        assert_eq!(linear(Duration::from_secs(2), f64::INFINITY, max, 0.0), max);
        assert_eq!(linear(Duration::from_secs(2), -1.0, max, 0.0), max);
    }

    #[test]
    fn test_jitter_bounds() {
        for _ in 0..100 {
            let delay = exponential(SECOND, 1, 32, 0.3);
            assert!(delay >= SECOND);
            assert!(delay <= Duration::from_millis(1300));
        }
    }

    proptest! {
        #[test]
        fn prop_exponential_within_bounds(
            base_ms in 1u64..10_000,
            attempt in 0u32..64,
            max_multiplier in 1u32..64,
            jitter in 0.0f64..1.0,
        ) {
            let base = Duration::from_millis(base_ms);
            let floor = exponential(base, attempt, max_multiplier, 0.0);
            let delay = exponential(base, attempt, max_multiplier, jitter);

            prop_assert!(floor >= base);
            prop_assert!(floor <= base * max_multiplier);
            prop_assert!(delay >= floor);
            prop_assert!(delay.as_secs_f64() <= floor.as_secs_f64() * (1.0 + jitter) + 1e-6);
        }

        #[test]
        fn prop_linear_never_exceeds_jittered_cap(
            current_ms in 0u64..60_000,
            multiplier in 1.0f64..3.0,
            jitter in 0.0f64..1.0,
        ) {
            let max = Duration::from_secs(30);
            let delay = linear(Duration::from_millis(current_ms), multiplier, max, jitter);
            prop_assert!(delay.as_secs_f64() <= max.as_secs_f64() * (1.0 + jitter) + 1e-6);
        }
    }
}
