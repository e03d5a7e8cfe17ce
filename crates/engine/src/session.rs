//! The per-session record and its transition rules

use bdtp_types::{
    AuditEvent, AuditRecord, ChainAddress, EngineError, EngineResult, FailureReason, FlowType,
    SessionId, SessionOutcome, SessionState, SubjectId, TransferRequirement,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Dedupe key: at most one live session per (flow, subjects, initiator).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct SessionKey {
    pub flow_type: FlowType,
    pub subject_ids: Vec<SubjectId>,
    pub initiator: ChainAddress,
}

/// One instance of a gated workflow for a specific subject and initiator.
///
/// Owned exclusively by the orchestrator; all mutation goes through the
/// per-session mutex, and `advance` enforces the monotonic state order.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowSession {
    pub id: SessionId,
    pub flow_type: FlowType,
    pub subject_ids: Vec<SubjectId>,
    pub initiator: ChainAddress,
    /// SPKI public key PEM the purchase pointer will be encrypted to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_public_key: Option<String>,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_polled_at: Option<DateTime<Utc>>,
    /// Ticks on which the transient-failure window was exhausted.
    pub retry_count: u32,
    pub transfer_requirement: Option<TransferRequirement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SessionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
    pub audit: Vec<AuditRecord>,
}

impl WorkflowSession {
    pub(crate) fn new(
        flow_type: FlowType,
        subject_ids: Vec<SubjectId>,
        initiator: ChainAddress,
        buyer_public_key: Option<String>,
    ) -> Self {
        Self {
            id: SessionId::generate(),
            flow_type,
            subject_ids,
            initiator,
            buyer_public_key,
            state: SessionState::Init,
            created_at: Utc::now(),
            last_polled_at: None,
            retry_count: 0,
            transfer_requirement: None,
            result: None,
            failure: None,
            audit: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Move to a later stage. Rejects regressions and writes after a
    /// terminal state; the driver treats that rejection as "session was
    /// terminated externally" and stops.
    pub(crate) fn advance(&mut self, next: SessionState) -> EngineResult<()> {
        if !self.state.can_advance_to(next) {
            return Err(EngineError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(session_id = %self.id, from = %self.state, to = %next, "state transition");
        self.state = next;
        Ok(())
    }

    /// Set the transfer requirement. Set at most once, before payment-wait.
    pub(crate) fn set_requirement(
        &mut self,
        requirement: TransferRequirement,
    ) -> EngineResult<()> {
        if self.transfer_requirement.is_some() {
            return Err(EngineError::RequirementAlreadySet);
        }
        self.transfer_requirement = Some(requirement);
        Ok(())
    }

    pub(crate) fn record(&mut self, event: AuditEvent) {
        self.audit.push(AuditRecord::now(event));
    }

    /// Terminal SUCCESS with a structured result.
    pub(crate) fn succeed(&mut self, outcome: SessionOutcome) -> EngineResult<()> {
        self.advance(SessionState::Success)?;
        self.result = Some(outcome);
        Ok(())
    }

    /// Terminal ERROR with a machine-readable reason.
    pub(crate) fn fail(&mut self, reason: FailureReason) -> EngineResult<()> {
        self.advance(SessionState::Error)?;
        tracing::info!(session_id = %self.id, reason = %reason, "session failed");
        self.failure = Some(reason);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bdtp_types::AssetAmount;

    fn session() -> WorkflowSession {
        WorkflowSession::new(
            FlowType::Register,
            vec![SubjectId::new("ipfs://meta-1")],
            ChainAddress::parse("0x70997970C51812dc3A010C7d01b50e0d17dc79C8").unwrap(),
            None,
        )
    }

    fn requirement() -> TransferRequirement {
        TransferRequirement::new(
            ChainAddress::parse("0x70997970C51812dc3A010C7d01b50e0d17dc79C8").unwrap(),
            AssetAmount::parse("3").unwrap(),
        )
    }

    #[test]
    fn test_requirement_set_once() {
        let mut s = session();
        s.set_requirement(requirement()).unwrap();
        assert!(matches!(
            s.set_requirement(requirement()),
            Err(EngineError::RequirementAlreadySet)
        ));
    }

    #[test]
    fn test_terminal_rejects_further_transitions() {
        let mut s = session();
        s.advance(SessionState::AwaitingPayment).unwrap();
        s.fail(FailureReason::UserCancelled).unwrap();
        assert!(s.advance(SessionState::Processing).is_err());
        assert!(s.succeed(SessionOutcome::Registered {
            token_id: "1".into(),
            owner: s.initiator.clone(),
            tx_hash: "0xabc".into(),
        })
        .is_err());
    }

    #[test]
    fn test_no_state_regression() {
        let mut s = session();
        s.advance(SessionState::Processing).unwrap();
        assert!(s.advance(SessionState::AwaitingPayment).is_err());
    }
}
