//! Backoff executor: the single retry primitive for network-facing attempts.

use std::fmt::Display;
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::backoff::{MAX_JITTER_SECS, retry_delay};
use crate::pacing::Pacer;

/// Retry policy: `max_attempts` tries, sleeping `base * 2^i + U(0, 2)` seconds
/// after failed attempt `i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Backoff {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Run `operation` until it succeeds or the attempts are exhausted, then
    /// return the last error. Every error is retried; callers express terminal
    /// outcomes as `Ok` values. At least one attempt is always made.
    pub fn execute<T, E, F>(&self, pacer: &Pacer, mut operation: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Result<T, E>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match operation() {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempt = attempt + 1, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if attempt + 1 < attempts => {
                    let delay =
                        retry_delay(self.base_delay, attempt, pacer.jitter(MAX_JITTER_SECS));
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        delay_secs = delay.as_secs_f64(),
                        error = %err,
                        "attempt failed, retrying"
                    );
                    pacer.sleep(delay);
                    attempt += 1;
                }
                Err(err) => {
                    warn!(attempts, error = %err, "all attempts failed");
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::core::error::AutomationError;
    use crate::test_support::RecordingSleeper;

    fn pacer() -> (Pacer, RecordingSleeper) {
        let sleeper = RecordingSleeper::default();
        (Pacer::new(Arc::new(sleeper.clone())), sleeper)
    }

    /// Verifies an always-failing operation runs exactly `max_attempts` times,
    /// re-raises the last error, and sleeps between 6s and 10s in total.
    #[test]
    fn exhausts_attempts_within_backoff_bounds() {
        let (pacer, sleeper) = pacer();
        let backoff = Backoff::new(3, Duration::from_secs(2));
        let mut calls = 0;

        let result: Result<(), AutomationError> = backoff.execute(&pacer, || {
            calls += 1;
            Err(AutomationError::LoginFailed(format!("attempt {calls}")))
        });

        assert_eq!(calls, 3);
        assert_eq!(
            result,
            Err(AutomationError::LoginFailed("attempt 3".to_string()))
        );
        let delays = sleeper.durations();
        assert_eq!(delays.len(), 2);
        assert!(delays[0] >= Duration::from_secs(2) && delays[0] <= Duration::from_secs(4));
        assert!(delays[1] >= Duration::from_secs(4) && delays[1] <= Duration::from_secs(6));
        let total = sleeper.total();
        assert!(total >= Duration::from_secs(6) && total <= Duration::from_secs(10));
    }

    #[test]
    fn returns_first_success_without_sleeping_further() {
        let (pacer, sleeper) = pacer();
        let backoff = Backoff::new(3, Duration::from_secs(2));
        let mut calls = 0;

        let result: Result<u32, String> = backoff.execute(&pacer, || {
            calls += 1;
            if calls == 2 { Ok(calls) } else { Err("flaky".to_string()) }
        });

        assert_eq!(result, Ok(2));
        assert_eq!(sleeper.calls(), 1);
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        let (pacer, sleeper) = pacer();
        let mut calls = 0;

        let result: Result<(), String> = Backoff::new(0, Duration::from_secs(2)).execute(&pacer, || {
            calls += 1;
            Err("nope".to_string())
        });

        assert!(result.is_err());
        assert_eq!(calls, 1);
        assert_eq!(sleeper.calls(), 0);
    }
}
