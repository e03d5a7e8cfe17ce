//! BDTP transfer watcher
//!
//! Polls a ledger-query collaborator for a payment matching a session's
//! transfer requirement. Each poll is independent and idempotent; transient
//! query failures are absorbed by an explicit, tunable retry contract rather
//! than an implicit fallback.

#![deny(unsafe_code)]

mod ledger;
mod retry;
mod watcher;

pub use ledger::{InMemoryLedger, LedgerError, LedgerQuery, RecordedTransfer};
pub use retry::{RetryPolicy, StageClock, StageTimeout};
pub use watcher::{PollOutcome, TickOutcome, TransferWatcher};
