//! Adaptive batch sizing for bulk resolution.
//!
//! A plain proportional rule on the last step's wall time:
//! - at or above 90% of the budget: halve the batch (multiplicative decrease)
//! - at or below 50% of the budget: grow it by one (additive increase)
//!
//! Failed steps back off harder: half the batch and twice the delay.

use std::time::Duration;

use crate::config::{
    BATCH_GROW_RATIO, BATCH_SHRINK_RATIO, DEFAULT_RESOLVE_ALL_DELAY, MAX_RESOLVE_ALL_BATCH_SIZE,
    MAX_RESOLVE_ALL_DELAY, MIN_RESOLVE_ALL_BATCH_SIZE,
};

/// Batch size to use for the next step, or `None` to keep the current one.
pub fn next_batch_hint(batch: usize, last_step: Duration, budget: Duration) -> Option<usize> {
    let last = last_step.as_secs_f64();
    let budget = budget.as_secs_f64();

    if last >= BATCH_SHRINK_RATIO * budget && batch > MIN_RESOLVE_ALL_BATCH_SIZE {
        Some((batch / 2).max(MIN_RESOLVE_ALL_BATCH_SIZE))
    } else if last > 0.0 && last <= BATCH_GROW_RATIO * budget && batch < MAX_RESOLVE_ALL_BATCH_SIZE
    {
        Some((batch + 1).min(MAX_RESOLVE_ALL_BATCH_SIZE))
    } else {
        None
    }
}

/// Batch and delay after a failed step. A zero delay backs off from twice the
/// default instead of staying at zero.
pub fn backoff(batch: usize, delay: Duration) -> (usize, Duration) {
    let doubled = if delay.is_zero() {
        DEFAULT_RESOLVE_ALL_DELAY * 2
    } else {
        delay * 2
    };
    (
        (batch / 2).max(MIN_RESOLVE_ALL_BATCH_SIZE),
        doubled.min(MAX_RESOLVE_ALL_DELAY),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUDGET: Duration = Duration::from_secs(12);

    #[test]
    fn test_slow_step_halves_batch() {
        assert_eq!(next_batch_hint(8, Duration::from_millis(10_800), BUDGET), Some(4));
        assert_eq!(next_batch_hint(3, Duration::from_secs(13), BUDGET), Some(1));
        assert_eq!(next_batch_hint(1, Duration::from_secs(13), BUDGET), None);
    }

    #[test]
    fn test_fast_step_grows_by_one_up_to_cap() {
        assert_eq!(next_batch_hint(8, Duration::from_secs(6), BUDGET), Some(9));
        assert_eq!(next_batch_hint(50, Duration::from_secs(1), BUDGET), None);
    }

    #[test]
    fn test_middle_band_and_zero_duration_keep_batch() {
        assert_eq!(next_batch_hint(8, Duration::from_secs(9), BUDGET), None);
        assert_eq!(next_batch_hint(8, Duration::ZERO, BUDGET), None);
    }

    #[test]
    fn test_overrun_strictly_decreases_until_floor() {
        let mut batch = 50;
        let mut seen = vec![batch];
        while let Some(next) = next_batch_hint(batch, Duration::from_secs(11), BUDGET) {
            assert!(next < batch);
            batch = next;
            seen.push(batch);
        }
        assert_eq!(batch, 1);
        assert_eq!(seen, vec![50, 25, 12, 6, 3, 1]);
    }

    #[test]
    fn test_backoff_caps_delay() {
        assert_eq!(
            backoff(8, Duration::from_millis(600)),
            (4, Duration::from_millis(1200))
        );
        assert_eq!(
            backoff(1, Duration::from_millis(4000)),
            (1, Duration::from_millis(5000))
        );
    }

    #[test]
    fn test_backoff_from_zero_delay_uses_default() {
        assert_eq!(backoff(4, Duration::ZERO), (2, Duration::from_millis(1200)));
    }
}
