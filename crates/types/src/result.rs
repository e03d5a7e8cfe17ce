//! Result payloads and the session audit trail

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::ChainAddress;
use crate::requirement::AssetAmount;

/// Reference to a confirmed on-chain transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRef {
    /// Transaction hash as reported by the ledger.
    pub hash: String,
    /// Block the transaction was observed in, if the ledger reports one.
    pub block: Option<u64>,
}

impl TxRef {
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            block: None,
        }
    }

    pub fn in_block(hash: impl Into<String>, block: u64) -> Self {
        Self {
            hash: hash.into(),
            block: Some(block),
        }
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hash)
    }
}

/// A CID encrypted to a specific recipient key.
///
/// Produced exactly once per confirmed purchase; consumed by the holder of
/// the matching private key. Never synthesized on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPointer {
    /// Base64-encoded RSA-OAEP(SHA-256) ciphertext of the UTF-8 CID.
    pub ciphertext: String,
    /// SHA-256 fingerprint of the recipient's SPKI public key.
    pub target_key_fingerprint: String,
}

/// Outcome of a provenance precheck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecheckResult {
    /// True when the subject must not proceed to payment.
    pub veto: bool,
    /// Human-readable grounds for a veto, propagated verbatim.
    pub reason: Option<String>,
    /// Pointer to detection evidence, when the detector produced any.
    pub evidence_ref: Option<String>,
    /// The detector itself failed. With `veto == false` the flow still
    /// proceeds, but the degradation is recorded in the audit trail.
    pub error_occurred: bool,
}

impl PrecheckResult {
    pub fn clear() -> Self {
        Self {
            veto: false,
            reason: None,
            evidence_ref: None,
            error_occurred: false,
        }
    }

    pub fn veto(reason: impl Into<String>) -> Self {
        Self {
            veto: true,
            reason: Some(reason.into()),
            evidence_ref: None,
            error_occurred: false,
        }
    }

    pub fn degraded(reason: impl Into<String>) -> Self {
        Self {
            veto: false,
            reason: Some(reason.into()),
            evidence_ref: None,
            error_occurred: true,
        }
    }

    pub fn with_evidence(mut self, evidence_ref: impl Into<String>) -> Self {
        self.evidence_ref = Some(evidence_ref.into());
        self
    }
}

/// Verdict of a resale adjudication.
///
/// Both verdicts are valid business outcomes; neither is a system error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportVerdict {
    /// Resale confirmed: deposit returned plus reward.
    Proven,
    /// No resale detected: deposit forfeited.
    Rejected,
}

impl fmt::Display for ReportVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportVerdict::Proven => write!(f, "proven"),
            ReportVerdict::Rejected => write!(f, "rejected"),
        }
    }
}

/// Terminal SUCCESS payload, tagged by flow type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Registration completed: the dataset was minted.
    Registered {
        token_id: String,
        owner: ChainAddress,
        tx_hash: String,
    },
    /// Purchase completed: the pointer was revealed to the buyer's key.
    Revealed { encrypted_pointer: EncryptedPointer },
    /// Report adjudicated, either way a completed session.
    Adjudicated {
        verdict: ReportVerdict,
        /// Amount returned (proven) or forfeited (rejected).
        incentive: AssetAmount,
        details: String,
    },
}

/// One entry in a session's audit trail.
///
/// The trail records everything a caller needs to judge a terminal state:
/// degraded prechecks, escalated transient errors, the matched transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    PrecheckPassed,
    /// Detector unavailable; the flow proceeded without a verdict.
    PrecheckDegraded { reason: String },
    PaymentRequested { amount: AssetAmount },
    /// Transient poll failures exhausted the retry window for one tick.
    WatcherEscalated { consecutive_failures: u32 },
    TransferConfirmed { tx: TxRef },
    ProcessingStarted,
    Cancelled,
}

/// Timestamped audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: AuditEvent,
}

impl AuditRecord {
    pub fn now(event: AuditEvent) -> Self {
        Self {
            at: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_is_tagged_by_kind() {
        let outcome = SessionOutcome::Adjudicated {
            verdict: ReportVerdict::Rejected,
            incentive: AssetAmount::parse("2").unwrap(),
            details: "no resale detected".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["kind"], "adjudicated");
        assert_eq!(json["verdict"], "rejected");
    }

    #[test]
    fn test_degraded_precheck_still_proceeds() {
        let result = PrecheckResult::degraded("detector unreachable");
        assert!(!result.veto);
        assert!(result.error_occurred);
    }
}
