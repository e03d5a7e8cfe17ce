//! Application state for API handlers

use bdtp_engine::{InMemoryCatalog, WorkflowOrchestrator};
use bdtp_watch::InMemoryLedger;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Workflow orchestrator
    pub orchestrator: Arc<WorkflowOrchestrator>,

    /// Purchase listing catalog
    pub catalog: Arc<InMemoryCatalog>,

    /// Local ledger, driven through the dev transfer endpoint
    pub ledger: Arc<InMemoryLedger>,

    /// Daemon version
    pub version: String,

    /// Daemon start time
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<WorkflowOrchestrator>,
        catalog: Arc<InMemoryCatalog>,
        ledger: Arc<InMemoryLedger>,
    ) -> Self {
        Self {
            orchestrator,
            catalog,
            ledger,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Uptime as a human-readable string.
    pub fn uptime(&self) -> String {
        let duration = chrono::Utc::now() - self.started_at;
        let secs = duration.num_seconds();

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else if secs < 86400 {
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        } else {
            format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
        }
    }
}
