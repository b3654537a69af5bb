//! Consecutive-failure budget for poll ticks
//!
//! Fixed interval, no backoff: a failed tick is retried at the next regular
//! tick. Reaching the threshold is fatal for the session.

/// Consecutive failures tolerated before monitoring stops
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryVerdict {
    /// Keep polling
    Retry { consecutive: u32 },
    /// Budget exhausted, stop the session
    Exhausted { consecutive: u32 },
}

#[derive(Debug, Clone)]
pub struct RetryBudget {
    threshold: u32,
    consecutive_failures: u32,
}

impl RetryBudget {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive_failures: 0,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Reset after a good tick; returns the streak that just ended
    pub fn record_success(&mut self) -> u32 {
        std::mem::take(&mut self.consecutive_failures)
    }

    pub fn record_failure(&mut self) -> RetryVerdict {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let consecutive = self.consecutive_failures;
        if consecutive >= self.threshold {
            RetryVerdict::Exhausted { consecutive }
        } else {
            RetryVerdict::Retry { consecutive }
        }
    }

    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD)
    }
}
