//! Ledger-query collaborator contract

use async_trait::async_trait;
use bdtp_types::{ChainAddress, TransferRequirement, TxRef};
use std::sync::RwLock;
use thiserror::Error;

/// Errors from the ledger collaborator. All of these are transient from the
/// watcher's viewpoint: the next poll may succeed.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("ledger query failed: {0}")]
    Query(String),
}

/// Read-only view of on-chain transfers.
///
/// Implementations are stateless from the orchestrator's viewpoint and may
/// be invoked concurrently by multiple sessions.
#[async_trait]
pub trait LedgerQuery: Send + Sync {
    /// Look for a confirmed transfer from `from` satisfying `requirement`
    /// (same destination, amount at least the required amount). Covers both
    /// a recent-history window and anything newer, so a payment made before
    /// the watch started is still found.
    async fn find_transfer(
        &self,
        requirement: &TransferRequirement,
        from: &ChainAddress,
    ) -> Result<Option<TxRef>, LedgerError>;
}

/// One transfer as recorded by the in-memory ledger.
#[derive(Debug, Clone)]
pub struct RecordedTransfer {
    pub from: ChainAddress,
    pub to: ChainAddress,
    pub amount_minor: i64,
    pub tx: TxRef,
}

/// In-memory ledger used in tests and local wiring.
///
/// Records transfers in arrival order and assigns block numbers from a
/// monotonic counter.
#[derive(Default)]
pub struct InMemoryLedger {
    transfers: RwLock<Vec<RecordedTransfer>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a transfer as confirmed on chain.
    pub fn record_transfer(&self, from: ChainAddress, to: ChainAddress, amount_minor: i64) -> TxRef {
        let mut transfers = self.transfers.write().expect("ledger lock poisoned");
        let block = transfers.len() as u64 + 1;
        let tx = TxRef::in_block(format!("0xtx{block:08x}"), block);
        transfers.push(RecordedTransfer {
            from,
            to,
            amount_minor,
            tx: tx.clone(),
        });
        tx
    }
}

#[async_trait]
impl LedgerQuery for InMemoryLedger {
    async fn find_transfer(
        &self,
        requirement: &TransferRequirement,
        from: &ChainAddress,
    ) -> Result<Option<TxRef>, LedgerError> {
        let transfers = self
            .transfers
            .read()
            .map_err(|_| LedgerError::Query("ledger lock poisoned".into()))?;

        Ok(transfers
            .iter()
            .find(|t| {
                t.from == *from
                    && t.to == requirement.to_address
                    && t.amount_minor >= requirement.amount.minor()
            })
            .map(|t| t.tx.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bdtp_types::AssetAmount;

    fn addr(last: char) -> ChainAddress {
        ChainAddress::parse(&format!("0x{}", last.to_string().repeat(40))).unwrap()
    }

    fn requirement(to: ChainAddress, amount: &str) -> TransferRequirement {
        TransferRequirement::new(to, AssetAmount::parse(amount).unwrap())
    }

    #[tokio::test]
    async fn test_finds_matching_transfer() {
        let ledger = InMemoryLedger::new();
        let req = requirement(addr('a'), "3");
        ledger.record_transfer(addr('b'), addr('a'), 3_000);

        let found = ledger.find_transfer(&req, &addr('b')).await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_overpayment_satisfies() {
        let ledger = InMemoryLedger::new();
        let req = requirement(addr('a'), "3");
        ledger.record_transfer(addr('b'), addr('a'), 5_000);

        assert!(ledger.find_transfer(&req, &addr('b')).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_ignores_wrong_sender_and_short_amount() {
        let ledger = InMemoryLedger::new();
        let req = requirement(addr('a'), "3");
        ledger.record_transfer(addr('c'), addr('a'), 3_000);
        ledger.record_transfer(addr('b'), addr('a'), 2_999);

        assert!(ledger.find_transfer(&req, &addr('b')).await.unwrap().is_none());
    }
}
