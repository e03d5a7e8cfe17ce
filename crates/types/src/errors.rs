//! Error taxonomy for the workflow engine
//!
//! `FailureReason` is the machine-readable code attached to a terminal ERROR
//! state; `EngineError` covers request validation and orchestration faults.
//! Only transient infrastructure errors are ever retried; everything else
//! surfaces to the caller exactly once.

use serde::{Deserialize, Serialize};

use crate::result::TxRef;
use crate::state::{FlowType, SessionState};

/// Why a session reached the terminal ERROR state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum FailureReason {
    /// The subject failed the provenance veto check; never retried.
    #[error("precheck veto: {reason}")]
    PrecheckVeto { reason: String },

    /// No matching payment inside the wait ceiling. The caller may reopen a
    /// session to try again; this session never re-enters payment-wait.
    #[error("no matching transfer observed within {ceiling_secs}s")]
    TransferTimeout { ceiling_secs: u64 },

    /// OAEP validation failed during decrypt: wrong key or corrupt
    /// ciphertext. Never masked as a different CID.
    #[error("key mismatch: ciphertext not decryptable with the supplied key")]
    KeyMismatch,

    /// Payment was confirmed but the downstream action failed. `tx` proves
    /// the payment so the caller is not asked to pay twice.
    #[error("processing failed after payment: {detail}")]
    ProcessingFailure { detail: String, tx: Option<TxRef> },

    /// Caller-initiated cancellation.
    #[error("cancelled by caller")]
    UserCancelled,
}

/// Faults raised by the orchestrator API surface.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("invalid chain address: {0}")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("session not found: {0}")]
    SessionNotFound(crate::ids::SessionId),

    #[error("{flow} flow requires {expected} subject id(s), got {got}")]
    SubjectCount {
        flow: FlowType,
        expected: usize,
        got: usize,
    },

    #[error("purchase requires the buyer's public key at session open")]
    MissingBuyerKey,

    #[error("item is not listed for sale: {0}")]
    NotListed(String),

    #[error("transfer requirement already set for this session")]
    RequirementAlreadySet,

    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("malformed recipient public key: {0}")]
    MalformedKey(String),

    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
