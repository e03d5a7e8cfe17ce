//! BDTP daemon library
//!
//! Core components of the workflow daemon:
//! - REST API over the orchestrator
//! - Local collaborator wiring (ledger, catalog, minter, adjudicator)
//! - Server lifecycle management

pub mod api;
pub mod config;
pub mod error;
pub mod server;

pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError, DaemonResult};
pub use server::Server;
