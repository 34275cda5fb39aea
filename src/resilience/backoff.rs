//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Delay to wait before retry number `attempt` (1-based).
///
/// The delay doubles per attempt from `base_ms`, is capped at `max_ms`, and
/// receives up to 10% additive jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponential = 2u64.saturating_pow(attempt - 1);
    let capped = base_ms.saturating_mul(exponential).min(max_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}

/// Upper bound of [`calculate_backoff`] for the same inputs, jitter included.
pub fn max_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let capped = base_ms.saturating_mul(2u64.saturating_pow(attempt - 1)).min(max_ms);
    Duration::from_millis(capped + capped / 10)
}
