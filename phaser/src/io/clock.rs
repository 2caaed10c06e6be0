//! Sleeping behind a trait so timing is observable in tests, plus the
//! cooperative stop flag that ends a run early.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Granularity at which an interruptible sleep re-checks its stop flag.
const STOP_POLL: Duration = Duration::from_millis(200);

/// Blocks the current thread. Every timed wait in the crate goes through this.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Stop request shared between an interrupt handler and a running session.
///
/// Raising it never aborts a task midway: the orchestrator stops before the
/// next task and interruptible sleeps return early.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Real wall-clock sleeps.
#[derive(Debug, Clone, Default)]
pub struct ThreadSleeper {
    stop: Option<StopSignal>,
}

impl ThreadSleeper {
    /// Sleeps that end early once `stop` is raised.
    pub fn interruptible(stop: StopSignal) -> Self {
        Self { stop: Some(stop) }
    }
}

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        let Some(stop) = &self.stop else {
            if !duration.is_zero() {
                std::thread::sleep(duration);
            }
            return;
        };
        let deadline = Instant::now() + duration;
        while !stop.is_raised() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(STOP_POLL));
        }
    }
}
