//! Session registry and the orchestrator API surface

use bdtp_precheck::{PrecheckService, ProvenanceDetector};
use bdtp_types::{
    AssetAmount, AuditEvent, AuditRecord, ChainAddress, EngineError, EngineResult, FailureReason,
    FlowType, SessionId, SessionOutcome, SessionState, SubjectId,
};
use bdtp_watch::{LedgerQuery, TransferWatcher};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{watch, Mutex};

use crate::config::EngineConfig;
use crate::driver::Driver;
use crate::flows::{AdjudicationJob, Minter};
use crate::pricing::ListingCatalog;
use crate::session::{SessionKey, WorkflowSession};

/// The external collaborators every flow is built from.
///
/// All of them are stateless from the orchestrator's viewpoint and shared
/// across sessions without extra locking.
pub struct Collaborators {
    pub watcher: TransferWatcher,
    pub precheck: PrecheckService,
    pub catalog: Arc<dyn ListingCatalog>,
    pub minter: Arc<dyn Minter>,
    pub adjudicator: Arc<dyn AdjudicationJob>,
}

impl Collaborators {
    pub fn new(
        config: &EngineConfig,
        ledger: Arc<dyn LedgerQuery>,
        detector: Arc<dyn ProvenanceDetector>,
        catalog: Arc<dyn ListingCatalog>,
        minter: Arc<dyn Minter>,
        adjudicator: Arc<dyn AdjudicationJob>,
    ) -> Self {
        Self {
            watcher: TransferWatcher::new(ledger),
            precheck: PrecheckService::with_timeout(detector, config.precheck_timeout()),
            catalog,
            minter,
            adjudicator,
        }
    }
}

/// Request to open a workflow session.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub flow_type: FlowType,
    pub subject_ids: Vec<SubjectId>,
    pub initiator: ChainAddress,
    /// Required for purchase: SPKI public key PEM the pointer will be
    /// encrypted to.
    pub buyer_public_key: Option<String>,
}

/// Caller-facing view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: SessionId,
    pub flow_type: FlowType,
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_amount: Option<AssetAmount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pay_to_address: Option<ChainAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SessionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_polled_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub audit: Vec<AuditRecord>,
}

struct SessionHandle {
    session: Arc<Mutex<WorkflowSession>>,
    cancel_tx: watch::Sender<bool>,
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<SessionId, Arc<SessionHandle>>,
    by_key: HashMap<SessionKey, SessionId>,
}

/// The workflow orchestrator: owns every session for its lifetime.
pub struct WorkflowOrchestrator {
    config: Arc<EngineConfig>,
    collabs: Arc<Collaborators>,
    registry: RwLock<Registry>,
}

impl WorkflowOrchestrator {
    pub fn new(config: EngineConfig, collabs: Collaborators) -> Self {
        Self {
            config: Arc::new(config),
            collabs: Arc::new(collabs),
            registry: RwLock::new(Registry::default()),
        }
    }

    /// Open a session, or return the live one for the same
    /// (flow, subjects, initiator) tuple.
    pub async fn open_session(
        &self,
        request: OpenRequest,
    ) -> EngineResult<(SessionId, SessionState)> {
        let expected = request.flow_type.expected_subjects();
        if request.subject_ids.len() != expected {
            return Err(EngineError::SubjectCount {
                flow: request.flow_type,
                expected,
                got: request.subject_ids.len(),
            });
        }

        if request.flow_type == FlowType::Purchase {
            let key = request
                .buyer_public_key
                .as_deref()
                .ok_or(EngineError::MissingBuyerKey)?;
            // Reject malformed keys now, so processing can never fail on a
            // key the caller could have fixed before paying.
            bdtp_cipher::key_fingerprint(key)
                .map_err(|e| EngineError::MalformedKey(e.to_string()))?;

            let subject = &request.subject_ids[0];
            let listing = self
                .collabs
                .catalog
                .listing(subject)
                .await
                .map_err(|e| EngineError::Unavailable(e.to_string()))?;
            if listing.is_none() {
                return Err(EngineError::NotListed(subject.to_string()));
            }
        }

        let key = SessionKey {
            flow_type: request.flow_type,
            subject_ids: request.subject_ids.clone(),
            initiator: request.initiator.clone(),
        };

        loop {
            let existing = {
                let registry = self.registry.read().expect("registry lock poisoned");
                registry
                    .by_key
                    .get(&key)
                    .and_then(|id| registry.sessions.get(id))
                    .cloned()
            };

            if let Some(handle) = existing {
                // Await the real state, never a guess: drivers never hold the
                // session lock across an await, so this resolves immediately.
                let (id, state, terminal) = {
                    let s = handle.session.lock().await;
                    (s.id, s.state, s.is_terminal())
                };
                if !terminal {
                    tracing::debug!(session_id = %id, "duplicate open returns live session");
                    return Ok((id, state));
                }

                // Terminal sessions never leave a terminal state, so the
                // archived entry can be replaced, unless a concurrent open
                // already did.
                let mut registry = self.registry.write().expect("registry lock poisoned");
                if registry.by_key.get(&key) == Some(&id) {
                    return Ok(self.spawn_session(&mut registry, &key, &request));
                }
                continue;
            }

            let mut registry = self.registry.write().expect("registry lock poisoned");
            if registry.by_key.contains_key(&key) {
                // A concurrent open won the race; re-read its state.
                continue;
            }
            return Ok(self.spawn_session(&mut registry, &key, &request));
        }
    }

    /// Insert a fresh session under the caller's write lock and start its
    /// driver. The caller has already deduped against `key`.
    fn spawn_session(
        &self,
        registry: &mut Registry,
        key: &SessionKey,
        request: &OpenRequest,
    ) -> (SessionId, SessionState) {
        let session = WorkflowSession::new(
            key.flow_type,
            key.subject_ids.clone(),
            key.initiator.clone(),
            request.buyer_public_key.clone(),
        );
        let id = session.id;
        tracing::info!(session_id = %id, flow = %session.flow_type, "session opened");

        let session = Arc::new(Mutex::new(session));
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        registry.by_key.insert(key.clone(), id);
        registry.sessions.insert(
            id,
            Arc::new(SessionHandle {
                session: session.clone(),
                cancel_tx,
            }),
        );

        let driver = Driver {
            session,
            collabs: self.collabs.clone(),
            config: self.config.clone(),
        };
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel_rx.changed() => {
                    // Cancellation marks the session terminal before
                    // signalling; dropping the driver here tears down its
                    // timer with it.
                }
                _ = driver.run() => {}
            }
        });

        (id, SessionState::Init)
    }

    /// Current state and result payload of a session.
    pub async fn get_session_status(&self, id: SessionId) -> EngineResult<SessionStatus> {
        let handle = self.handle(id)?;
        let s = handle.session.lock().await;
        Ok(SessionStatus {
            session_id: s.id,
            flow_type: s.flow_type,
            state: s.state,
            required_amount: s.transfer_requirement.as_ref().map(|r| r.amount),
            pay_to_address: s.transfer_requirement.as_ref().map(|r| r.to_address.clone()),
            result: s.result.clone(),
            error: s.failure.clone(),
            last_polled_at: s.last_polled_at,
            retry_count: s.retry_count,
            audit: s.audit.clone(),
        })
    }

    /// Cancel a non-terminal session and stop its polling timer.
    ///
    /// Returns the session's state after cancellation; a session that was
    /// already terminal is left as it is.
    pub async fn cancel_session(&self, id: SessionId) -> EngineResult<SessionState> {
        let handle = self.handle(id)?;

        let state = {
            let mut s = handle.session.lock().await;
            if !s.is_terminal() {
                s.record(AuditEvent::Cancelled);
                s.fail(FailureReason::UserCancelled)?;
            }
            s.state
        };
        // Terminal state is already visible; now tear the driver down.
        let _ = handle.cancel_tx.send(true);
        Ok(state)
    }

    fn handle(&self, id: SessionId) -> EngineResult<Arc<SessionHandle>> {
        self.registry
            .read()
            .expect("registry lock poisoned")
            .sessions
            .get(&id)
            .cloned()
            .ok_or(EngineError::SessionNotFound(id))
    }
}
