//! Exponential backoff arithmetic.

use std::time::Duration;

/// Upper bound of the uniform jitter added to every retry delay, in seconds.
pub const MAX_JITTER_SECS: f64 = 2.0;

/// Delay before the retry that follows failed attempt `attempt` (0-indexed):
/// `base * 2^attempt + jitter`, with jitter clamped to `[0, MAX_JITTER_SECS]`.
pub fn retry_delay(base: Duration, attempt: u32, jitter_secs: f64) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    let jitter = if jitter_secs.is_finite() {
        jitter_secs.clamp(0.0, MAX_JITTER_SECS)
    } else {
        0.0
    };
    base.saturating_mul(factor) + Duration::from_secs_f64(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_per_attempt() {
        let base = Duration::from_secs(2);
        assert_eq!(retry_delay(base, 0, 0.0), Duration::from_secs(2));
        assert_eq!(retry_delay(base, 1, 0.0), Duration::from_secs(4));
        assert_eq!(retry_delay(base, 2, 0.0), Duration::from_secs(8));
    }

    #[test]
    fn jitter_is_clamped() {
        let base = Duration::from_secs(1);
        assert_eq!(retry_delay(base, 0, 5.0), Duration::from_secs(3));
        assert_eq!(retry_delay(base, 0, -1.0), Duration::from_secs(1));
        assert_eq!(retry_delay(base, 0, f64::NAN), Duration::from_secs(1));
    }

    #[test]
    fn huge_attempt_counts_saturate() {
        let delay = retry_delay(Duration::from_secs(2), 64, 0.0);
        assert!(delay >= Duration::from_secs(u64::from(u32::MAX)));
    }
}
