//! # Time Keeping
//!
//! All scheduling in the runtime uses a single monotonic clock expressed as
//! seconds since the runtime started, as an `f64`. The manager mints one
//! [`TimeKeeper`] at startup and hands copies to every worker thread, so every
//! process observes the same time base regardless of which thread services it.

use std::time::Instant;

/// Monotonic clock anchored at runtime start.
#[derive(Debug, Clone, Copy)]
pub struct TimeKeeper {
    start: Instant,
}

impl TimeKeeper {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Seconds elapsed since the runtime started.
    pub fn current_time(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for TimeKeeper {
    fn default() -> Self {
        Self::new()
    }
}
