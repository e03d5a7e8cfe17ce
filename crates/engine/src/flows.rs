//! Flow-specific processing: mint, reveal, adjudicate
//!
//! Processing only runs after a confirmed transfer. Every failure here is
//! terminal and carries the payment proof, so a caller is never asked to pay
//! twice; no path produces a substitute result.

use async_trait::async_trait;
use bdtp_types::{
    ChainAddress, EncryptedPointer, ReportVerdict, SessionOutcome, SubjectId, TxRef,
};
use bdtp_watch::RetryPolicy;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::RwLock;
use thiserror::Error;
use tokio::time::{interval, timeout};

use crate::config::EngineConfig;
use crate::orchestrator::Collaborators;
use crate::session::WorkflowSession;

/// Why the post-payment step failed.
#[derive(Debug, Clone, Error)]
pub enum ProcessingError {
    #[error("minting failed: {0}")]
    Mint(String),

    #[error("listing disappeared before reveal: {0}")]
    ListingGone(String),

    #[error("pointer encryption failed: {0}")]
    Encryption(String),

    #[error("adjudication failed: {0}")]
    Adjudication(String),

    #[error("adjudication did not complete within {0}s")]
    AdjudicationTimeout(u64),
}

/// Receipt from a confirmed mint.
#[derive(Debug, Clone)]
pub struct MintReceipt {
    pub token_id: String,
    pub tx_hash: String,
}

/// Contract-invocation collaborator for registration.
#[async_trait]
pub trait Minter: Send + Sync {
    async fn mint(
        &self,
        subject: &SubjectId,
        owner: &ChainAddress,
    ) -> Result<MintReceipt, ProcessingError>;
}

/// Progress of an external adjudication job.
#[derive(Debug, Clone)]
pub enum AdjudicationStatus {
    Running { progress: String },
    Completed { verdict: ReportVerdict, details: String },
    Failed { detail: String },
}

/// The external similarity-comparison job a report session waits on.
///
/// Submission starts a long-running analysis; the engine observes it purely
/// through status polling.
#[async_trait]
pub trait AdjudicationJob: Send + Sync {
    async fn submit(
        &self,
        subject_a: &SubjectId,
        subject_b: &SubjectId,
        reporter: &ChainAddress,
    ) -> Result<String, ProcessingError>;

    async fn status(&self, job_id: &str) -> Result<AdjudicationStatus, ProcessingError>;
}

/// Run the flow's post-payment step and produce the terminal result.
pub(crate) async fn run_processing(
    collabs: &Collaborators,
    config: &EngineConfig,
    session: &WorkflowSession,
    tx: &TxRef,
) -> Result<SessionOutcome, ProcessingError> {
    match session.flow_type {
        bdtp_types::FlowType::Register => {
            let receipt = collabs
                .minter
                .mint(&session.subject_ids[0], &session.initiator)
                .await?;
            tracing::info!(
                session_id = %session.id,
                token_id = %receipt.token_id,
                "mint confirmed"
            );
            Ok(SessionOutcome::Registered {
                token_id: receipt.token_id,
                owner: session.initiator.clone(),
                tx_hash: receipt.tx_hash,
            })
        }

        bdtp_types::FlowType::Purchase => {
            let subject = &session.subject_ids[0];
            let listing = collabs
                .catalog
                .listing(subject)
                .await
                .map_err(|e| ProcessingError::ListingGone(e.to_string()))?
                .ok_or_else(|| ProcessingError::ListingGone(subject.to_string()))?;

            // Validated at session open, so present here.
            let buyer_key = session
                .buyer_public_key
                .as_deref()
                .ok_or_else(|| ProcessingError::Encryption("buyer key missing".into()))?;

            let ciphertext = bdtp_cipher::encrypt_cid(&listing.cid, buyer_key)
                .map_err(|e| ProcessingError::Encryption(e.to_string()))?;
            let fingerprint = bdtp_cipher::key_fingerprint(buyer_key)
                .map_err(|e| ProcessingError::Encryption(e.to_string()))?;

            Ok(SessionOutcome::Revealed {
                encrypted_pointer: EncryptedPointer {
                    ciphertext,
                    target_key_fingerprint: fingerprint,
                },
            })
        }

        bdtp_types::FlowType::Report => {
            let job_id = collabs
                .adjudicator
                .submit(
                    &session.subject_ids[0],
                    &session.subject_ids[1],
                    &session.initiator,
                )
                .await?;
            tracing::info!(session_id = %session.id, job_id = %job_id, tx = %tx, "adjudication submitted");

            await_verdict(collabs, config, session, &job_id).await
        }
    }
}

/// Poll the adjudication job until a verdict, a hard failure, or the
/// wall-clock budget runs out. Transient status errors are absorbed by the
/// same retry contract the payment-wait loop uses.
async fn await_verdict(
    collabs: &Collaborators,
    config: &EngineConfig,
    session: &WorkflowSession,
    job_id: &str,
) -> Result<SessionOutcome, ProcessingError> {
    let policy = RetryPolicy::new(
        config.max_consecutive_failures,
        config.retry_delay(),
        config.adjudication_wait(),
    );
    let clock = policy.start();
    let mut ticker = interval(config.poll_interval());
    let mut failures = 0u32;

    loop {
        ticker.tick().await;

        if clock.check().is_err() {
            return Err(ProcessingError::AdjudicationTimeout(
                config.adjudication_wait_secs,
            ));
        }

        // A status call that never returns must not wedge the session; a
        // deadline overrun counts as one transient failure.
        let status = match timeout(
            config.status_poll_timeout(),
            collabs.adjudicator.status(job_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProcessingError::Adjudication(format!(
                "status poll exceeded {}s",
                config.status_poll_timeout_secs
            ))),
        };

        match status {
            Ok(AdjudicationStatus::Completed { verdict, details }) => {
                let incentive = config.report_deposit;
                return Ok(SessionOutcome::Adjudicated {
                    verdict,
                    incentive,
                    details,
                });
            }
            Ok(AdjudicationStatus::Failed { detail }) => {
                return Err(ProcessingError::Adjudication(detail));
            }
            Ok(AdjudicationStatus::Running { progress }) => {
                failures = 0;
                tracing::debug!(session_id = %session.id, %progress, "adjudication running");
            }
            Err(e) => {
                failures += 1;
                if failures >= policy.max_consecutive_failures {
                    tracing::warn!(
                        session_id = %session.id,
                        error = %e,
                        failures,
                        "adjudication status poll failing, waiting for next tick"
                    );
                    failures = 0;
                } else {
                    tokio::time::sleep(policy.retry_delay).await;
                }
            }
        }
    }
}

/// In-memory minter for tests and local wiring: sequential token ids.
#[derive(Default)]
pub struct InMemoryMinter {
    next_token: AtomicU64,
    /// When set, every mint fails with this detail.
    failure: RwLock<Option<String>>,
}

impl InMemoryMinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, detail: impl Into<String>) {
        *self.failure.write().expect("minter lock poisoned") = Some(detail.into());
    }
}

#[async_trait]
impl Minter for InMemoryMinter {
    async fn mint(
        &self,
        _subject: &SubjectId,
        _owner: &ChainAddress,
    ) -> Result<MintReceipt, ProcessingError> {
        if let Some(detail) = self.failure.read().expect("minter lock poisoned").clone() {
            return Err(ProcessingError::Mint(detail));
        }
        let token = self.next_token.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MintReceipt {
            token_id: token.to_string(),
            tx_hash: format!("0xmint{token:08x}"),
        })
    }
}

/// In-memory adjudicator: reports `Running` for a fixed number of status
/// polls, then the configured verdict.
pub struct InMemoryAdjudicator {
    verdict: ReportVerdict,
    details: String,
    ready_after: u32,
    polls: AtomicU32,
}

impl InMemoryAdjudicator {
    pub fn new(verdict: ReportVerdict, details: impl Into<String>, ready_after: u32) -> Self {
        Self {
            verdict,
            details: details.into(),
            ready_after,
            polls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl AdjudicationJob for InMemoryAdjudicator {
    async fn submit(
        &self,
        subject_a: &SubjectId,
        subject_b: &SubjectId,
        _reporter: &ChainAddress,
    ) -> Result<String, ProcessingError> {
        Ok(format!("xrid:{subject_a}:{subject_b}"))
    }

    async fn status(&self, _job_id: &str) -> Result<AdjudicationStatus, ProcessingError> {
        let seen = self.polls.fetch_add(1, Ordering::SeqCst);
        if seen < self.ready_after {
            Ok(AdjudicationStatus::Running {
                progress: "comparing dataset similarity".into(),
            })
        } else {
            Ok(AdjudicationStatus::Completed {
                verdict: self.verdict,
                details: self.details.clone(),
            })
        }
    }
}
