//! Deadline tracking for blocking reactor runs.

use std::time::{Duration, Instant};

/// Measures time spent against an optional budget.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
    budget: Option<Duration>,
}

impl Stopwatch {
    /// Starts the clock. `None` means no deadline.
    pub fn new(budget: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the deadline, `None` without one. Never negative:
    /// once the budget is spent this stays at zero.
    pub fn time_remaining(&self) -> Option<Duration> {
        self.budget
            .map(|budget| budget.saturating_sub(self.elapsed()))
    }

    pub fn expired(&self) -> bool {
        self.time_remaining() == Some(Duration::ZERO)
    }
}
