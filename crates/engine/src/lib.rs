//! BDTP workflow orchestrator
//!
//! The state machine that sequences each gated workflow:
//! INIT → PRECHECK → AWAITING_PAYMENT → PROCESSING → {SUCCESS | ERROR}.
//!
//! One driver task per session with its own polling timer and cancellation
//! signal; sessions are independent, collaborators (ledger, detector,
//! catalog, minter, adjudicator) are shared trait objects.

#![deny(unsafe_code)]

mod config;
mod driver;
mod flows;
mod orchestrator;
mod pricing;
mod session;

pub use config::EngineConfig;
pub use flows::{
    AdjudicationJob, AdjudicationStatus, InMemoryAdjudicator, InMemoryMinter, MintReceipt, Minter,
    ProcessingError,
};
pub use orchestrator::{Collaborators, OpenRequest, SessionStatus, WorkflowOrchestrator};
pub use pricing::{CatalogError, InMemoryCatalog, Listing, ListingCatalog};
pub use session::WorkflowSession;
