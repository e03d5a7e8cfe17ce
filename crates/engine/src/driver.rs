//! Per-session driver task
//!
//! Each session is driven by one spawned task that owns its polling timer.
//! The task observes external termination (cancel) through failed
//! transitions: once a session is terminal, every further advance is
//! rejected and the driver stops quietly.

use bdtp_types::{AuditEvent, FailureReason, SessionState, TransferRequirement, TxRef};
use bdtp_watch::{RetryPolicy, TickOutcome};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::interval;

use crate::config::EngineConfig;
use crate::flows;
use crate::orchestrator::Collaborators;
use crate::pricing;
use crate::session::WorkflowSession;

pub(crate) struct Driver {
    pub session: Arc<Mutex<WorkflowSession>>,
    pub collabs: Arc<Collaborators>,
    pub config: Arc<EngineConfig>,
}

impl Driver {
    /// Run the session to a terminal state.
    pub(crate) async fn run(self) {
        if let Err(stopped) = self.advance_to_terminal().await {
            // Externally terminated (cancel); nothing left to do.
            tracing::debug!("driver stopped: {stopped}");
        }
    }

    async fn advance_to_terminal(&self) -> Result<(), String> {
        let (flow, subjects, initiator) = {
            let s = self.session.lock().await;
            (s.flow_type, s.subject_ids.clone(), s.initiator.clone())
        };

        // Precheck, for flows that define a veto rule. A veto is terminal
        // and blocks payment-wait from ever starting.
        if flow.has_precheck() {
            {
                let mut s = self.session.lock().await;
                s.advance(SessionState::Precheck).map_err(stopped)?;
            }
            let result = self.collabs.precheck.check(&subjects).await;
            let mut s = self.session.lock().await;
            if result.veto {
                let reason = result
                    .reason
                    .unwrap_or_else(|| "provenance marker detected".to_string());
                s.fail(FailureReason::PrecheckVeto { reason }).map_err(stopped)?;
                return Ok(());
            }
            if result.error_occurred {
                s.record(AuditEvent::PrecheckDegraded {
                    reason: result.reason.unwrap_or_else(|| "detector failed".to_string()),
                });
            } else {
                s.record(AuditEvent::PrecheckPassed);
            }
        }

        // Compute the transfer requirement from the flow's pricing rule.
        let requirement = match self.requirement_for(flow, &subjects).await {
            Ok(req) => req,
            Err(detail) => {
                let mut s = self.session.lock().await;
                s.fail(FailureReason::ProcessingFailure { detail, tx: None })
                    .map_err(stopped)?;
                return Ok(());
            }
        };

        {
            let mut s = self.session.lock().await;
            s.set_requirement(requirement.clone()).map_err(stopped)?;
            s.advance(SessionState::AwaitingPayment).map_err(stopped)?;
            s.record(AuditEvent::PaymentRequested {
                amount: requirement.amount,
            });
            tracing::info!(
                session_id = %s.id,
                amount = %requirement.amount,
                to = %requirement.to_address,
                "awaiting payment"
            );
        }

        // Payment-wait loop: poll every tick until a match or the ceiling.
        let policy = RetryPolicy::new(
            self.config.max_consecutive_failures,
            self.config.retry_delay(),
            self.config.wait_ceiling(flow),
        );
        let clock = policy.start();
        let mut ticker = interval(self.config.poll_interval());

        let tx: TxRef = loop {
            ticker.tick().await;

            {
                let s = self.session.lock().await;
                if s.is_terminal() {
                    return Err("session terminated during payment-wait".into());
                }
            }

            if let Err(timeout) = clock.check() {
                let mut s = self.session.lock().await;
                s.fail(FailureReason::TransferTimeout {
                    ceiling_secs: timeout.budget.as_secs(),
                })
                .map_err(stopped)?;
                return Ok(());
            }

            let outcome = self
                .collabs
                .watcher
                .poll_tick(&requirement, &initiator, &policy)
                .await;

            let mut s = self.session.lock().await;
            s.last_polled_at = Some(Utc::now());
            match outcome {
                TickOutcome::Found(tx) => {
                    s.record(AuditEvent::TransferConfirmed { tx: tx.clone() });
                    s.advance(SessionState::Processing).map_err(stopped)?;
                    s.record(AuditEvent::ProcessingStarted);
                    break tx;
                }
                TickOutcome::NotFound => {}
                TickOutcome::Escalated {
                    consecutive_failures,
                } => {
                    s.retry_count += 1;
                    s.record(AuditEvent::WatcherEscalated {
                        consecutive_failures,
                    });
                }
            }
        };

        // Post-payment processing on a snapshot; the lock is not held across
        // the (possibly long) external calls.
        let snapshot = self.session.lock().await.clone();
        let processed = flows::run_processing(&self.collabs, &self.config, &snapshot, &tx).await;

        let mut s = self.session.lock().await;
        match processed {
            Ok(outcome) => s.succeed(outcome).map_err(stopped)?,
            Err(e) => s
                .fail(FailureReason::ProcessingFailure {
                    detail: e.to_string(),
                    tx: Some(tx),
                })
                .map_err(stopped)?,
        }
        Ok(())
    }

    async fn requirement_for(
        &self,
        flow: bdtp_types::FlowType,
        subjects: &[bdtp_types::SubjectId],
    ) -> Result<TransferRequirement, String> {
        match flow {
            bdtp_types::FlowType::Register => Ok(pricing::fixed_requirement(
                &self.config,
                self.config.register_fee,
            )),
            bdtp_types::FlowType::Report => Ok(pricing::fixed_requirement(
                &self.config,
                self.config.report_deposit,
            )),
            bdtp_types::FlowType::Purchase => {
                let listing = self
                    .collabs
                    .catalog
                    .listing(&subjects[0])
                    .await
                    .map_err(|e| e.to_string())?
                    .ok_or_else(|| format!("listing gone: {}", subjects[0]))?;
                Ok(TransferRequirement::new(
                    self.config.treasury_address.clone(),
                    listing.price,
                ))
            }
        }
    }
}

fn stopped(e: bdtp_types::EngineError) -> String {
    e.to_string()
}
