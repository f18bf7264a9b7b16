//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Delay before the attempt following `attempt` (1-based), without jitter.
///
/// `min(max_delay, base · multiplier^(attempt − 1))`
pub fn base_delay(attempt: u32, config: &RetryConfig) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
    let delay_ms = config.base_delay_ms as f64 * config.backoff_multiplier.powi(exponent);
    let capped = delay_ms.min(config.max_delay_ms as f64).max(0.0);
    Duration::from_millis(capped as u64)
}

/// Calculate exponential backoff delay with up to 10% random jitter.
pub fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let capped = base_delay(attempt, config);
    let jitter_range = capped.as_millis() as u64 / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..=jitter_range)
    } else {
        0
    };
    capped + Duration::from_millis(jitter)
}
