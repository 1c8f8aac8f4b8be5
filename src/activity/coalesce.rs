//! Trailing-edge coalescing of activity signals.
//!
//! A burst of signals arms a single deadline that moves with every new
//! signal. Once the burst has been quiet for the window, the timestamp of
//! the burst's last signal is released exactly once.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Coalescer {
    window: Duration,
    pending: Option<Instant>,
    deadline: Option<Instant>,
}

impl Coalescer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
            deadline: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a signal observed at `at`, re-arming the deadline.
    pub fn record(&mut self, at: Instant) {
        let latest = match self.pending {
            Some(prev) if prev > at => prev,
            _ => at,
        };
        self.pending = Some(latest);
        self.deadline = Some(latest + self.window);
    }

    /// When the armed timer should fire, if anything is pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Release the pending timestamp if the window has elapsed at `now`.
    pub fn flush_due(&mut self, now: Instant) -> Option<Instant> {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                self.pending.take()
            }
            _ => None,
        }
    }

    /// Drop whatever is pending without releasing it.
    pub fn discard(&mut self) {
        self.pending = None;
        self.deadline = None;
    }
}
