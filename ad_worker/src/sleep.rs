//! Timer-backed [`Sleeper`].

use std::future::Future;
use std::time::Duration;

use apexdata::rate_gate::Sleeper;
use worker::Delay;

/// Sleeps on the worker runtime's timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerSleeper;

impl Sleeper for WorkerSleeper {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> {
        Delay::from(duration)
    }
}
