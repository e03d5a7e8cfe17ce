//! BDTP domain types
//!
//! Shared vocabulary for the transfer-gated workflow protocol: strongly-typed
//! identifiers, the session data model, transfer requirements, result
//! payloads, and the error taxonomy.

#![deny(unsafe_code)]

mod errors;
mod ids;
mod requirement;
mod result;
mod state;

pub use errors::{EngineError, EngineResult, FailureReason};
pub use ids::{ChainAddress, SessionId, SubjectId};
pub use requirement::{AssetAmount, TransferRequirement, NATIVE_CURRENCY};
pub use result::{
    AuditEvent, AuditRecord, EncryptedPointer, PrecheckResult, ReportVerdict, SessionOutcome, TxRef,
};
pub use state::{FlowType, SessionState};
