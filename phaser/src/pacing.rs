//! Randomized, human-like pauses.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::trace;

use crate::io::clock::Sleeper;
use crate::io::config::secs;

/// Draws pause lengths and sleeps through the configured [`Sleeper`].
#[derive(Clone)]
pub struct Pacer {
    sleeper: Arc<dyn Sleeper>,
}

impl Pacer {
    pub fn new(sleeper: Arc<dyn Sleeper>) -> Self {
        Self { sleeper }
    }

    pub fn sleep(&self, duration: Duration) {
        trace!(secs = duration.as_secs_f64(), "sleep");
        self.sleeper.sleep(duration);
    }

    /// Sleep a uniformly random duration in `[min, max]` seconds and return it.
    pub fn pause(&self, min: f64, max: f64) -> Duration {
        let duration = secs(uniform(min, max));
        self.sleep(duration);
        duration
    }

    /// Uniform jitter in `[0, max]` seconds, without sleeping.
    pub fn jitter(&self, max: f64) -> f64 {
        uniform(0.0, max)
    }
}

fn uniform(min: f64, max: f64) -> f64 {
    if !(min.is_finite() && max.is_finite()) || max <= min {
        return min.max(0.0);
    }
    rand::thread_rng().gen_range(min..=max)
}
