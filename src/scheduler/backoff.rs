//! Per-worker idle backoff counter.

use crate::scheduler::task::Progress;

/// Counts consecutive Idle steps seen by one worker.
#[derive(Debug, Clone)]
pub struct IdleBackoff {
    threshold: usize,
    consecutive_idle: usize,
}

impl IdleBackoff {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            consecutive_idle: 0,
        }
    }

    /// Records one step result and returns true when the worker should sleep.
    ///
    /// Busy resets the counter. Idle increments it; the worker sleeps once
    /// the counter exceeds the threshold.
    pub fn record(&mut self, progress: Progress) -> bool {
        match progress {
            Progress::Busy => {
                self.consecutive_idle = 0;
                false
            }
            Progress::Idle => {
                self.consecutive_idle = self.consecutive_idle.saturating_add(1);
                self.consecutive_idle > self.threshold
            }
        }
    }

    pub fn consecutive_idle(&self) -> usize {
        self.consecutive_idle
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}
