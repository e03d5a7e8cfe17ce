//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};
use bdtp_engine::{
    Collaborators, InMemoryAdjudicator, InMemoryCatalog, InMemoryMinter, WorkflowOrchestrator,
};
use bdtp_precheck::AlwaysClear;
use bdtp_types::ReportVerdict;
use bdtp_watch::InMemoryLedger;
use std::sync::Arc;
use tokio::net::TcpListener;

/// BDTP daemon server.
///
/// Wires the orchestrator to local in-process collaborators: an in-memory
/// ledger and catalog driven through the dev API, a counting minter, and a
/// fixed-verdict adjudicator. Chain-backed collaborators slot in through the
/// same traits.
pub struct Server {
    config: DaemonConfig,
    state: AppState,
}

impl Server {
    /// Create a new server with the given configuration.
    pub fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let ledger = Arc::new(InMemoryLedger::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let minter = Arc::new(InMemoryMinter::new());
        let adjudicator = Arc::new(InMemoryAdjudicator::new(
            ReportVerdict::Proven,
            "similarity threshold exceeded",
            2,
        ));

        let collabs = Collaborators::new(
            &config.engine,
            ledger.clone(),
            Arc::new(AlwaysClear),
            catalog.clone(),
            minter,
            adjudicator,
        );
        let orchestrator = Arc::new(WorkflowOrchestrator::new(config.engine.clone(), collabs));

        let state = AppState::new(orchestrator, catalog, ledger);
        Ok(Self { config, state })
    }

    /// Run the server until a shutdown signal arrives.
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let app = create_router(self.state, self.config.server.enable_cors);

        let listener = TcpListener::bind(addr).await?;
        tracing::info!("BDTP daemon listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("BDTP daemon shutting down");
        Ok(())
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
