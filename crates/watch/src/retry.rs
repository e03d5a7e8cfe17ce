//! Bounded-retry and total-timeout contract
//!
//! One policy object carries the three knobs the payment-wait and
//! status-polling loops need: how many consecutive transient failures to
//! absorb inside a tick, how long to back off between attempts, and the hard
//! wall-clock ceiling for the whole stage.

use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// The stage wall-clock ceiling was breached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("stage exceeded its {}s wall-clock ceiling", budget.as_secs())]
pub struct StageTimeout {
    pub budget: Duration,
}

/// Retry contract for a polling stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive transient failures absorbed before escalation.
    pub max_consecutive_failures: u32,
    /// Minimum delay between attempts; prevents busy-looping on immediate
    /// failures.
    pub retry_delay: Duration,
    /// Hard wall-clock ceiling for the stage, independent of how many
    /// retries have occurred.
    pub total_timeout: Duration,
}

impl RetryPolicy {
    pub fn new(
        max_consecutive_failures: u32,
        retry_delay: Duration,
        total_timeout: Duration,
    ) -> Self {
        Self {
            max_consecutive_failures,
            retry_delay,
            total_timeout,
        }
    }

    /// Start the stage clock. Uses the tokio clock so paused-time tests see
    /// the same time the polling loops do.
    pub fn start(&self) -> StageClock {
        StageClock {
            started: Instant::now(),
            budget: self.total_timeout,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 3,
            retry_delay: Duration::from_secs(3),
            total_timeout: Duration::from_secs(600),
        }
    }
}

/// Tracks elapsed wall-clock time against a stage budget.
#[derive(Debug, Clone, Copy)]
pub struct StageClock {
    started: Instant,
    budget: Duration,
}

impl StageClock {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }

    /// Distinguishable timeout outcome on ceiling breach.
    pub fn check(&self) -> Result<(), StageTimeout> {
        if self.elapsed() >= self.budget {
            Err(StageTimeout {
                budget: self.budget,
            })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_clock_expires_exactly_at_budget() {
        let policy = RetryPolicy::new(3, Duration::from_secs(3), Duration::from_secs(300));
        let clock = policy.start();
        assert!(clock.check().is_ok());

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(clock.check().is_ok());

        tokio::time::advance(Duration::from_secs(1)).await;
        let err = clock.check().unwrap_err();
        assert_eq!(err.budget, Duration::from_secs(300));
        assert_eq!(clock.remaining(), Duration::ZERO);
    }
}
