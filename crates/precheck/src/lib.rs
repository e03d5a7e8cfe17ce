//! BDTP precheck service
//!
//! Runs the veto check (provenance/watermark detection) a flow may require
//! before payment is ever requested. Detection is a long external call, so
//! the service applies its own timeout, and detector unavailability is not
//! grounds for blocking a sale: the flow proceeds degraded, with the
//! degradation recorded for the audit trail.

#![deny(unsafe_code)]

use async_trait::async_trait;
use bdtp_types::{PrecheckResult, SubjectId};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Detector-side failures. These never veto on their own; the service turns
/// them into a degraded-proceed result.
#[derive(Debug, Clone, Error)]
pub enum DetectorError {
    #[error("detector unavailable: {0}")]
    Unavailable(String),

    #[error("detection failed: {0}")]
    Detection(String),
}

/// External provenance detector.
///
/// Implementations may take minutes (they can download and analyze the
/// subject), which is why the service wraps every call in a timeout.
#[async_trait]
pub trait ProvenanceDetector: Send + Sync {
    async fn detect(&self, subjects: &[SubjectId]) -> Result<PrecheckResult, DetectorError>;
}

/// Detector that clears every subject. Default wiring for flows whose veto
/// infrastructure is not deployed.
pub struct AlwaysClear;

#[async_trait]
impl ProvenanceDetector for AlwaysClear {
    async fn detect(&self, _subjects: &[SubjectId]) -> Result<PrecheckResult, DetectorError> {
        Ok(PrecheckResult::clear())
    }
}

/// Applies the precheck contract: run the detector with a deadline and map
/// failures to a degraded-proceed result.
#[derive(Clone)]
pub struct PrecheckService {
    detector: Arc<dyn ProvenanceDetector>,
    call_timeout: Duration,
}

impl PrecheckService {
    /// Default long-call deadline for external detection.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

    pub fn new(detector: Arc<dyn ProvenanceDetector>) -> Self {
        Self::with_timeout(detector, Self::DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(detector: Arc<dyn ProvenanceDetector>, call_timeout: Duration) -> Self {
        Self {
            detector,
            call_timeout,
        }
    }

    /// Run the veto check for a session's subjects.
    ///
    /// A veto is returned as-is. A detector error or timeout comes back as
    /// `veto == false, error_occurred == true` so the flow can proceed while
    /// the audit trail shows detection never ran.
    pub async fn check(&self, subjects: &[SubjectId]) -> PrecheckResult {
        match tokio::time::timeout(self.call_timeout, self.detector.detect(subjects)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "provenance detector failed, proceeding degraded");
                PrecheckResult::degraded(e.to_string())
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.call_timeout.as_secs(),
                    "provenance detection timed out, proceeding degraded"
                );
                PrecheckResult::degraded(format!(
                    "detection timed out after {}s",
                    self.call_timeout.as_secs()
                ))
            }
        }
    }
}
