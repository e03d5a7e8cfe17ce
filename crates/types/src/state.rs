//! Flow types and the session state machine vocabulary

use serde::{Deserialize, Serialize};
use std::fmt;

/// The three gated workflows the platform runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    /// Register a dataset: watermark precheck, fixed fee, then mint.
    Register,
    /// Buy a listed item: item price, then reveal the encrypted pointer.
    Purchase,
    /// Report an alleged resale: fixed deposit, then adjudication.
    Report,
}

impl FlowType {
    /// Whether this flow runs a veto precheck before payment is requested.
    ///
    /// Only registration defines a veto rule (provenance marker detection);
    /// purchase and report go straight to payment-wait.
    pub fn has_precheck(&self) -> bool {
        matches!(self, FlowType::Register)
    }

    /// How many subject ids the flow requires.
    pub fn expected_subjects(&self) -> usize {
        match self {
            FlowType::Register | FlowType::Purchase => 1,
            FlowType::Report => 2,
        }
    }
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowType::Register => write!(f, "register"),
            FlowType::Purchase => write!(f, "purchase"),
            FlowType::Report => write!(f, "report"),
        }
    }
}

/// Lifecycle state of a workflow session.
///
/// Transitions are monotonic: a session only ever moves to a state with a
/// strictly greater stage rank, and the two terminal states share the top
/// rank so neither can replace the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Init,
    Precheck,
    AwaitingPayment,
    Processing,
    Success,
    Error,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Success | SessionState::Error)
    }

    /// Stage rank used to enforce monotonic transitions.
    pub fn rank(&self) -> u8 {
        match self {
            SessionState::Init => 0,
            SessionState::Precheck => 1,
            SessionState::AwaitingPayment => 2,
            SessionState::Processing => 3,
            SessionState::Success | SessionState::Error => 4,
        }
    }

    /// Whether a transition from `self` to `next` is allowed.
    ///
    /// Terminal states accept nothing; every other state accepts only a
    /// strictly later stage. PRECHECK may be skipped entirely (INIT straight
    /// to AWAITING_PAYMENT), which the rank ordering already permits.
    pub fn can_advance_to(&self, next: SessionState) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Init => "INIT",
            SessionState::Precheck => "PRECHECK",
            SessionState::AwaitingPayment => "AWAITING_PAYMENT",
            SessionState::Processing => "PROCESSING",
            SessionState::Success => "SUCCESS",
            SessionState::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranks_are_monotonic() {
        assert!(SessionState::Init.can_advance_to(SessionState::Precheck));
        assert!(SessionState::Init.can_advance_to(SessionState::AwaitingPayment));
        assert!(SessionState::Precheck.can_advance_to(SessionState::Error));
        assert!(SessionState::AwaitingPayment.can_advance_to(SessionState::Processing));
        assert!(SessionState::Processing.can_advance_to(SessionState::Success));
    }

    #[test]
    fn test_no_regressions() {
        assert!(!SessionState::Processing.can_advance_to(SessionState::AwaitingPayment));
        assert!(!SessionState::AwaitingPayment.can_advance_to(SessionState::Precheck));
        assert!(!SessionState::Success.can_advance_to(SessionState::Error));
        assert!(!SessionState::Error.can_advance_to(SessionState::Success));
    }

    #[test]
    fn test_precheck_only_for_register() {
        assert!(FlowType::Register.has_precheck());
        assert!(!FlowType::Purchase.has_precheck());
        assert!(!FlowType::Report.has_precheck());
    }

    #[test]
    fn test_report_needs_two_subjects() {
        assert_eq!(FlowType::Report.expected_subjects(), 2);
        assert_eq!(FlowType::Purchase.expected_subjects(), 1);
    }
}
