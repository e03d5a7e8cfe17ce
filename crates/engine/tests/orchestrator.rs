//! End-to-end orchestrator behavior over mock collaborators.
//!
//! All timing runs on the paused tokio clock: time only moves when a test
//! advances it, so ceilings and tick schedules are exact.

use async_trait::async_trait;
use bdtp_engine::{
    AdjudicationJob, AdjudicationStatus, Collaborators, EngineConfig, InMemoryAdjudicator,
    InMemoryCatalog, InMemoryMinter, Listing, OpenRequest, ProcessingError, WorkflowOrchestrator,
};
use bdtp_precheck::{AlwaysClear, DetectorError, ProvenanceDetector};
use bdtp_types::{
    AssetAmount, AuditEvent, ChainAddress, EngineError, FailureReason, FlowType, PrecheckResult,
    ReportVerdict, SessionOutcome, SessionState, SubjectId,
};
use bdtp_watch::{InMemoryLedger, LedgerError, LedgerQuery};
use bdtp_types::{TransferRequirement, TxRef};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

const CID: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";

fn addr(last: char) -> ChainAddress {
    ChainAddress::parse(&format!("0x{}", last.to_string().repeat(40))).unwrap()
}

fn treasury() -> ChainAddress {
    EngineConfig::default().treasury_address
}

/// Counts ledger queries; optionally fails the first `fail_first` of them.
struct CountingLedger {
    inner: InMemoryLedger,
    fail_first: u32,
    calls: AtomicU32,
}

impl CountingLedger {
    fn new(fail_first: u32) -> Self {
        Self {
            inner: InMemoryLedger::new(),
            fail_first,
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerQuery for CountingLedger {
    async fn find_transfer(
        &self,
        requirement: &TransferRequirement,
        from: &ChainAddress,
    ) -> Result<Option<TxRef>, LedgerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(LedgerError::Unavailable("rpc down".into()));
        }
        self.inner.find_transfer(requirement, from).await
    }
}

struct VetoingDetector;

#[async_trait]
impl ProvenanceDetector for VetoingDetector {
    async fn detect(&self, _: &[SubjectId]) -> Result<PrecheckResult, DetectorError> {
        Ok(PrecheckResult::veto("provenance marker detected"))
    }
}

struct PrecheckProbe {
    calls: AtomicU32,
}

#[async_trait]
impl ProvenanceDetector for PrecheckProbe {
    async fn detect(&self, _: &[SubjectId]) -> Result<PrecheckResult, DetectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PrecheckResult::clear())
    }
}

struct Fixture {
    orchestrator: WorkflowOrchestrator,
    ledger: Arc<CountingLedger>,
    catalog: Arc<InMemoryCatalog>,
    minter: Arc<InMemoryMinter>,
}

fn fixture_with(
    detector: Arc<dyn ProvenanceDetector>,
    verdict: ReportVerdict,
    fail_first: u32,
) -> Fixture {
    let config = EngineConfig::default();
    let ledger = Arc::new(CountingLedger::new(fail_first));
    let catalog = Arc::new(InMemoryCatalog::new());
    let minter = Arc::new(InMemoryMinter::new());
    let adjudicator = Arc::new(InMemoryAdjudicator::new(verdict, "similarity verdict", 2));

    catalog.list(
        SubjectId::new("token-42"),
        Listing {
            price: AssetAmount::parse("1.5").unwrap(),
            cid: CID.into(),
            seller: addr('5'),
        },
    );

    let collabs = Collaborators::new(
        &config,
        ledger.clone(),
        detector,
        catalog.clone(),
        minter.clone(),
        adjudicator,
    );
    Fixture {
        orchestrator: WorkflowOrchestrator::new(config, collabs),
        ledger,
        catalog,
        minter,
    }
}

fn fixture() -> Fixture {
    fixture_with(Arc::new(AlwaysClear), ReportVerdict::Proven, 0)
}

fn fixture_with_adjudicator(adjudicator: Arc<dyn AdjudicationJob>) -> Fixture {
    let config = EngineConfig::default();
    let ledger = Arc::new(CountingLedger::new(0));
    let catalog = Arc::new(InMemoryCatalog::new());
    let minter = Arc::new(InMemoryMinter::new());

    let collabs = Collaborators::new(
        &config,
        ledger.clone(),
        Arc::new(AlwaysClear),
        catalog.clone(),
        minter.clone(),
        adjudicator,
    );
    Fixture {
        orchestrator: WorkflowOrchestrator::new(config, collabs),
        ledger,
        catalog,
        minter,
    }
}

/// Let spawned drivers run without moving the clock.
async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

/// Advance the clock one second at a time so every intermediate timer
/// (ticks, retry backoffs) fires in order.
async fn advance_secs(secs: u64) {
    for _ in 0..secs {
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
    }
}

fn purchase_request(buyer_key: &str) -> OpenRequest {
    OpenRequest {
        flow_type: FlowType::Purchase,
        subject_ids: vec![SubjectId::new("token-42")],
        initiator: addr('b'),
        buyer_public_key: Some(buyer_key.to_string()),
    }
}

fn register_request() -> OpenRequest {
    OpenRequest {
        flow_type: FlowType::Register,
        subject_ids: vec![SubjectId::new("ipfs://meta-1")],
        initiator: addr('a'),
        buyer_public_key: None,
    }
}

fn report_request() -> OpenRequest {
    OpenRequest {
        flow_type: FlowType::Report,
        subject_ids: vec![SubjectId::new("token-42"), SubjectId::new("token-43")],
        initiator: addr('c'),
        buyer_public_key: None,
    }
}

#[tokio::test(start_paused = true)]
async fn veto_blocks_payment_wait_entirely() {
    let f = fixture_with(Arc::new(VetoingDetector), ReportVerdict::Proven, 0);
    let (id, _) = f.orchestrator.open_session(register_request()).await.unwrap();
    settle().await;

    let status = f.orchestrator.get_session_status(id).await.unwrap();
    assert_eq!(status.state, SessionState::Error);
    assert!(matches!(
        status.error,
        Some(FailureReason::PrecheckVeto { ref reason }) if reason == "provenance marker detected"
    ));
    // No requirement was ever issued to the vetoed subject.
    assert!(status.required_amount.is_none());
    assert!(status.pay_to_address.is_none());
    assert_eq!(f.ledger.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn purchase_times_out_exactly_at_ceiling() {
    let keys = bdtp_cipher::generate_keypair().unwrap();
    let f = fixture();
    let (id, _) = f
        .orchestrator
        .open_session(purchase_request(&keys.public_pem))
        .await
        .unwrap();
    settle().await;

    let status = f.orchestrator.get_session_status(id).await.unwrap();
    assert_eq!(status.state, SessionState::AwaitingPayment);
    assert_eq!(status.required_amount, Some(AssetAmount::parse("1.5").unwrap()));

    // One second short of the 300s ceiling: still waiting.
    advance_secs(299).await;
    let status = f.orchestrator.get_session_status(id).await.unwrap();
    assert_eq!(status.state, SessionState::AwaitingPayment);

    // The tick at the ceiling flips it to a reopenable timeout error.
    advance_secs(2).await;
    let status = f.orchestrator.get_session_status(id).await.unwrap();
    assert_eq!(status.state, SessionState::Error);
    assert!(matches!(
        status.error,
        Some(FailureReason::TransferTimeout { ceiling_secs: 300 })
    ));
}

#[tokio::test(start_paused = true)]
async fn found_after_transient_errors_proceeds_without_second_payment() {
    let keys = bdtp_cipher::generate_keypair().unwrap();
    // First two polls fail; within the 3-failure retry window.
    let f = fixture_with(Arc::new(AlwaysClear), ReportVerdict::Proven, 2);
    f.ledger
        .inner
        .record_transfer(addr('b'), treasury(), 1_500);

    let (id, _) = f
        .orchestrator
        .open_session(purchase_request(&keys.public_pem))
        .await
        .unwrap();
    // Two in-tick retries at 3s apart, then the poll that finds the payment.
    advance_secs(8).await;

    let status = f.orchestrator.get_session_status(id).await.unwrap();
    assert_eq!(status.state, SessionState::Success);
    let confirmations = status
        .audit
        .iter()
        .filter(|r| matches!(r.event, AuditEvent::TransferConfirmed { .. }))
        .count();
    let requests = status
        .audit
        .iter()
        .filter(|r| matches!(r.event, AuditEvent::PaymentRequested { .. }))
        .count();
    assert_eq!(confirmations, 1);
    assert_eq!(requests, 1, "payment must never be re-requested");
}

#[tokio::test(start_paused = true)]
async fn duplicate_open_returns_live_session() {
    let f = fixture();
    let (first, _) = f.orchestrator.open_session(register_request()).await.unwrap();
    settle().await;

    let (second, state) = f.orchestrator.open_session(register_request()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(state, SessionState::AwaitingPayment);

    // A different initiator gets a fresh session.
    let mut other = register_request();
    other.initiator = addr('d');
    let (third, _) = f.orchestrator.open_session(other).await.unwrap();
    assert_ne!(first, third);
}

#[tokio::test(start_paused = true)]
async fn reopen_after_terminal_creates_new_session() {
    let f = fixture_with(Arc::new(AlwaysClear), ReportVerdict::Proven, 0);
    let (first, _) = f.orchestrator.open_session(register_request()).await.unwrap();
    settle().await;
    f.orchestrator.cancel_session(first).await.unwrap();

    let (second, _) = f.orchestrator.open_session(register_request()).await.unwrap();
    assert_ne!(first, second);
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_polling() {
    let keys = bdtp_cipher::generate_keypair().unwrap();
    let f = fixture();
    let (id, _) = f
        .orchestrator
        .open_session(purchase_request(&keys.public_pem))
        .await
        .unwrap();
    advance_secs(30).await;

    let state = f.orchestrator.cancel_session(id).await.unwrap();
    assert_eq!(state, SessionState::Error);

    let polls_at_cancel = f.ledger.calls();
    advance_secs(120).await;
    assert_eq!(
        f.ledger.calls(),
        polls_at_cancel,
        "no watcher calls after cancellation"
    );

    let status = f.orchestrator.get_session_status(id).await.unwrap();
    assert!(matches!(status.error, Some(FailureReason::UserCancelled)));
    assert!(status
        .audit
        .iter()
        .any(|r| matches!(r.event, AuditEvent::Cancelled)));
}

#[tokio::test(start_paused = true)]
async fn purchase_end_to_end_reveals_decryptable_pointer() {
    let buyer = bdtp_cipher::generate_keypair().unwrap();
    let stranger = bdtp_cipher::generate_keypair().unwrap();
    let f = fixture();

    let (id, _) = f
        .orchestrator
        .open_session(purchase_request(&buyer.public_pem))
        .await
        .unwrap();
    settle().await;

    let status = f.orchestrator.get_session_status(id).await.unwrap();
    assert_eq!(status.state, SessionState::AwaitingPayment);
    assert_eq!(status.required_amount, Some(AssetAmount::parse("1.5").unwrap()));
    assert_eq!(status.pay_to_address, Some(treasury()));

    // Pay on the third scheduled poll.
    advance_secs(10).await;
    f.ledger
        .inner
        .record_transfer(addr('b'), treasury(), 1_500);
    advance_secs(10).await;

    let status = f.orchestrator.get_session_status(id).await.unwrap();
    assert_eq!(status.state, SessionState::Success);
    let pointer = match status.result {
        Some(SessionOutcome::Revealed { encrypted_pointer }) => encrypted_pointer,
        other => panic!("expected revealed pointer, got {other:?}"),
    };

    assert_eq!(
        pointer.target_key_fingerprint,
        bdtp_cipher::key_fingerprint(&buyer.public_pem).unwrap()
    );
    assert_eq!(
        bdtp_cipher::decrypt_cid(&pointer.ciphertext, &buyer.private_pem).unwrap(),
        CID
    );
    assert!(matches!(
        bdtp_cipher::decrypt_cid(&pointer.ciphertext, &stranger.private_pem),
        Err(bdtp_cipher::CipherError::KeyMismatch)
    ));
}

#[tokio::test(start_paused = true)]
async fn register_end_to_end_mints() {
    let f = fixture();
    f.ledger
        .inner
        .record_transfer(addr('a'), treasury(), 3_000);
    let (id, _) = f.orchestrator.open_session(register_request()).await.unwrap();
    settle().await;

    let status = f.orchestrator.get_session_status(id).await.unwrap();
    assert_eq!(status.state, SessionState::Success);
    match status.result {
        Some(SessionOutcome::Registered {
            token_id,
            owner,
            tx_hash,
        }) => {
            assert_eq!(token_id, "1");
            assert_eq!(owner, addr('a'));
            assert!(tx_hash.starts_with("0x"));
        }
        other => panic!("expected registered outcome, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn mint_failure_surfaces_payment_proof() {
    let f = fixture();
    f.minter.fail_with("mint reverted");
    f.ledger
        .inner
        .record_transfer(addr('a'), treasury(), 3_000);
    let (id, _) = f.orchestrator.open_session(register_request()).await.unwrap();
    settle().await;

    let status = f.orchestrator.get_session_status(id).await.unwrap();
    assert_eq!(status.state, SessionState::Error);
    match status.error {
        Some(FailureReason::ProcessingFailure { detail, tx }) => {
            assert!(detail.contains("mint reverted"));
            assert!(tx.is_some(), "caller must see the payment succeeded");
        }
        other => panic!("expected processing failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn report_rejected_is_success_with_result_code() {
    let f = fixture_with(Arc::new(AlwaysClear), ReportVerdict::Rejected, 0);
    f.ledger
        .inner
        .record_transfer(addr('c'), treasury(), 2_000);
    let (id, _) = f.orchestrator.open_session(report_request()).await.unwrap();
    // Deposit found immediately; adjudication completes after two status
    // polls at the 10s interval.
    advance_secs(30).await;

    let status = f.orchestrator.get_session_status(id).await.unwrap();
    assert_eq!(status.state, SessionState::Success);
    match status.result {
        Some(SessionOutcome::Adjudicated {
            verdict, incentive, ..
        }) => {
            assert_eq!(verdict, ReportVerdict::Rejected);
            assert_eq!(incentive, AssetAmount::parse("2").unwrap());
        }
        other => panic!("expected adjudicated outcome, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn report_requires_two_subjects() {
    let f = fixture();
    let err = f
        .orchestrator
        .open_session(OpenRequest {
            flow_type: FlowType::Report,
            subject_ids: vec![SubjectId::new("token-42")],
            initiator: addr('c'),
            buyer_public_key: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SubjectCount { expected: 2, got: 1, .. }));
}

#[tokio::test(start_paused = true)]
async fn purchase_rejects_unlisted_and_missing_key() {
    let keys = bdtp_cipher::generate_keypair().unwrap();
    let f = fixture();
    f.catalog.unlist(&SubjectId::new("token-42"));

    let err = f
        .orchestrator
        .open_session(purchase_request(&keys.public_pem))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotListed(_)));

    let err = f
        .orchestrator
        .open_session(OpenRequest {
            flow_type: FlowType::Purchase,
            subject_ids: vec![SubjectId::new("token-42")],
            initiator: addr('b'),
            buyer_public_key: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MissingBuyerKey));
}

#[tokio::test(start_paused = true)]
async fn purchase_rejects_malformed_buyer_key_before_payment() {
    let f = fixture();
    let err = f
        .orchestrator
        .open_session(purchase_request("-----BEGIN PUBLIC KEY-----\nnope\n-----END PUBLIC KEY-----"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MalformedKey(_)));
}

#[tokio::test(start_paused = true)]
async fn degraded_precheck_is_visible_in_audit() {
    struct BrokenDetector;

    #[async_trait]
    impl ProvenanceDetector for BrokenDetector {
        async fn detect(&self, _: &[SubjectId]) -> Result<PrecheckResult, DetectorError> {
            Err(DetectorError::Unavailable("detector offline".into()))
        }
    }

    let f = fixture_with(Arc::new(BrokenDetector), ReportVerdict::Proven, 0);
    f.ledger
        .inner
        .record_transfer(addr('a'), treasury(), 3_000);
    let (id, _) = f.orchestrator.open_session(register_request()).await.unwrap();
    settle().await;

    let status = f.orchestrator.get_session_status(id).await.unwrap();
    assert_eq!(status.state, SessionState::Success);
    assert!(status
        .audit
        .iter()
        .any(|r| matches!(r.event, AuditEvent::PrecheckDegraded { .. })));
}

#[tokio::test(start_paused = true)]
async fn precheck_runs_once_before_payment() {
    let probe = Arc::new(PrecheckProbe {
        calls: AtomicU32::new(0),
    });
    let f = fixture_with(probe.clone(), ReportVerdict::Proven, 0);
    let (id, _) = f.orchestrator.open_session(register_request()).await.unwrap();
    advance_secs(60).await;

    assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    let status = f.orchestrator.get_session_status(id).await.unwrap();
    assert_eq!(status.state, SessionState::AwaitingPayment);
    assert!(status
        .audit
        .iter()
        .any(|r| matches!(r.event, AuditEvent::PrecheckPassed)));
}

#[tokio::test(start_paused = true)]
async fn purchase_rejects_undersized_buyer_key() {
    use rsa::pkcs8::{EncodePublicKey, LineEnding};

    let mut rng = rand::thread_rng();
    let private = rsa::RsaPrivateKey::new(&mut rng, 512).unwrap();
    let public_pem = rsa::RsaPublicKey::from(&private)
        .to_public_key_pem(LineEnding::LF)
        .unwrap();

    let f = fixture();
    let err = f
        .orchestrator
        .open_session(purchase_request(&public_pem))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MalformedKey(_)));
    assert_eq!(f.ledger.calls(), 0, "no payment wait for an unusable key");
}

#[tokio::test(start_paused = true)]
async fn concurrent_duplicate_opens_agree_on_one_session() {
    let f = fixture();
    let (a, b, c, d) = tokio::join!(
        f.orchestrator.open_session(register_request()),
        f.orchestrator.open_session(register_request()),
        f.orchestrator.open_session(register_request()),
        f.orchestrator.open_session(register_request()),
    );
    let results = [a.unwrap(), b.unwrap(), c.unwrap(), d.unwrap()];

    let id = results[0].0;
    for (other, state) in &results {
        assert_eq!(*other, id, "all callers must share one session");
        // No caller may learn a state the session never reached; before a
        // confirmed payment that rules out PROCESSING in particular.
        assert_ne!(*state, SessionState::Processing);
    }

    settle().await;
    let status = f.orchestrator.get_session_status(id).await.unwrap();
    assert_eq!(status.state, SessionState::AwaitingPayment);
    let (again, state) = f.orchestrator.open_session(register_request()).await.unwrap();
    assert_eq!(again, id);
    assert_eq!(state, SessionState::AwaitingPayment);
}

#[tokio::test(start_paused = true)]
async fn hanging_adjudication_status_cannot_wedge_the_session() {
    /// Accepts the job, then never answers a status poll.
    struct StalledAdjudicator;

    #[async_trait]
    impl AdjudicationJob for StalledAdjudicator {
        async fn submit(
            &self,
            subject_a: &SubjectId,
            subject_b: &SubjectId,
            _reporter: &ChainAddress,
        ) -> Result<String, ProcessingError> {
            Ok(format!("xrid:{subject_a}:{subject_b}"))
        }

        async fn status(&self, _job_id: &str) -> Result<AdjudicationStatus, ProcessingError> {
            std::future::pending().await
        }
    }

    let f = fixture_with_adjudicator(Arc::new(StalledAdjudicator));
    f.ledger
        .inner
        .record_transfer(addr('c'), treasury(), 2_000);
    let (id, _) = f.orchestrator.open_session(report_request()).await.unwrap();
    settle().await;

    // Every status call is cut off at its 30s deadline and retried, so the
    // 600s adjudication budget ends the session instead of never elapsing.
    advance_secs(700).await;

    let status = f.orchestrator.get_session_status(id).await.unwrap();
    assert_eq!(status.state, SessionState::Error);
    match status.error {
        Some(FailureReason::ProcessingFailure { detail, tx }) => {
            assert!(detail.contains("did not complete"), "got detail {detail:?}");
            assert!(tx.is_some(), "caller must still see the deposit landed");
        }
        other => panic!("expected processing failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn escalated_transient_errors_keep_the_session_alive() {
    let keys = bdtp_cipher::generate_keypair().unwrap();
    // Fails far beyond one retry window: the first tick escalates, the
    // session stays in payment-wait, and a later tick can still find.
    let f = fixture_with(Arc::new(AlwaysClear), ReportVerdict::Proven, 5);
    let (id, _) = f
        .orchestrator
        .open_session(purchase_request(&keys.public_pem))
        .await
        .unwrap();
    advance_secs(9).await;

    let status = f.orchestrator.get_session_status(id).await.unwrap();
    assert_eq!(status.state, SessionState::AwaitingPayment);
    assert!(status.retry_count >= 1);
    assert!(status
        .audit
        .iter()
        .any(|r| matches!(r.event, AuditEvent::WatcherEscalated { .. })));

    f.ledger
        .inner
        .record_transfer(addr('b'), treasury(), 1_500);
    advance_secs(30).await;
    let status = f.orchestrator.get_session_status(id).await.unwrap();
    assert_eq!(status.state, SessionState::Success);
}
