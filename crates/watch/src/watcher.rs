//! Payment-confirmation watcher

use bdtp_types::{ChainAddress, TransferRequirement, TxRef};
use std::sync::Arc;
use tokio::time::sleep;

use crate::ledger::{LedgerError, LedgerQuery};
use crate::retry::RetryPolicy;

/// Result of a single idempotent poll.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// A matching confirmed transfer exists.
    Found(TxRef),
    /// No matching transfer yet.
    NotFound,
    /// The ledger query failed; transient by default.
    Error(LedgerError),
}

/// Result of one scheduled tick after the retry window has been applied.
#[derive(Debug, Clone)]
pub enum TickOutcome {
    Found(TxRef),
    NotFound,
    /// Consecutive failures exhausted the retry window. The caller logs and
    /// keeps polling on the next scheduled tick; the session is not aborted.
    Escalated { consecutive_failures: u32 },
}

/// Watches the ledger for a payment satisfying a transfer requirement.
#[derive(Clone)]
pub struct TransferWatcher {
    ledger: Arc<dyn LedgerQuery>,
}

impl TransferWatcher {
    pub fn new(ledger: Arc<dyn LedgerQuery>) -> Self {
        Self { ledger }
    }

    /// One independent, idempotent poll. Safe to repeat.
    pub async fn poll(
        &self,
        requirement: &TransferRequirement,
        initiator: &ChainAddress,
    ) -> PollOutcome {
        match self.ledger.find_transfer(requirement, initiator).await {
            Ok(Some(tx)) => PollOutcome::Found(tx),
            Ok(None) => PollOutcome::NotFound,
            Err(e) => PollOutcome::Error(e),
        }
    }

    /// One scheduled tick: poll, and on transient errors retry after
    /// `policy.retry_delay` up to `policy.max_consecutive_failures` times
    /// before escalating. A success mid-window resets nothing beyond this
    /// tick; each tick starts with a clean failure count.
    pub async fn poll_tick(
        &self,
        requirement: &TransferRequirement,
        initiator: &ChainAddress,
        policy: &RetryPolicy,
    ) -> TickOutcome {
        let mut failures = 0u32;
        loop {
            match self.poll(requirement, initiator).await {
                PollOutcome::Found(tx) => return TickOutcome::Found(tx),
                PollOutcome::NotFound => return TickOutcome::NotFound,
                PollOutcome::Error(e) => {
                    failures += 1;
                    if failures >= policy.max_consecutive_failures {
                        tracing::warn!(
                            error = %e,
                            failures,
                            "transfer poll failed repeatedly, waiting for next tick"
                        );
                        return TickOutcome::Escalated {
                            consecutive_failures: failures,
                        };
                    }
                    tracing::debug!(error = %e, attempt = failures, "transfer poll failed, retrying");
                    sleep(policy.retry_delay).await;
                }
            }
        }
    }
}
