//! Fixed per-call pacing.

use std::future::Future;
use std::time::Duration;

/// Source of delays. Implemented with `worker::Delay` in the worker and by a recorder in tests.
pub trait Sleeper: Clone {
    /// Wait for `duration`.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()>;
}

/// Waits a fixed delay after each unit of upstream work.
///
/// This is not a token bucket. The delay must be sized conservatively against the upstream's
/// published quota; idle headroom is accepted in exchange for having no shared counter.
#[derive(Debug, Clone)]
pub struct RateGate<Sl> {
    delay: Duration,
    sleeper: Sl,
}

impl<Sl: Sleeper> RateGate<Sl> {
    /// Gate waiting `delay` each time.
    pub fn new(delay: Duration, sleeper: Sl) -> Self {
        Self { delay, sleeper }
    }

    /// The configured delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait the configured delay.
    pub async fn wait(&self) {
        if !self.delay.is_zero() {
            self.sleeper.sleep(self.delay).await;
        }
    }
}
