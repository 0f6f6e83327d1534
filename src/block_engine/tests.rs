//! Scripted ledger, relay and instruction source for landing-engine tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    system_instruction,
    transaction::Transaction,
};
use solana_transaction_status::TransactionConfirmationStatus;
use tokio_util::sync::CancellationToken;

use super::*;

pub(crate) fn state(
    confirmation_status: Option<TransactionConfirmationStatus>,
    error: Option<String>,
) -> SignatureState {
    SignatureState {
        confirmation_status,
        error,
    }
}

fn confirmed() -> Option<SignatureState> {
    Some(state(Some(TransactionConfirmationStatus::Confirmed), None))
}

/// Ledger whose heights, statuses and anchors are scripted queues. The last
/// height is repeated once the queue runs dry.
#[derive(Default)]
pub(crate) struct MockLedger {
    heights: Mutex<VecDeque<u64>>,
    fail_heights: AtomicBool,
    statuses: Mutex<VecDeque<Option<SignatureState>>>,
    default_status: Mutex<Option<SignatureState>>,
    status_calls: AtomicUsize,
    anchors: Mutex<VecDeque<u64>>,
    sent: Mutex<Vec<Transaction>>,
}

impl MockLedger {
    pub(crate) fn with_heights(heights: Vec<u64>) -> Self {
        Self {
            heights: Mutex::new(heights.into()),
            ..Self::default()
        }
    }

    pub(crate) fn fail_heights(&self, fail: bool) {
        self.fail_heights.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn push_statuses(&self, statuses: Vec<Option<SignatureState>>) {
        self.statuses.lock().unwrap().extend(statuses);
    }

    pub(crate) fn set_default_status(&self, status: Option<SignatureState>) {
        *self.default_status.lock().unwrap() = status;
    }

    /// Last valid block heights handed out by `latest_anchor`, in order.
    pub(crate) fn push_anchors(&self, last_valid_block_heights: Vec<u64>) {
        self.anchors.lock().unwrap().extend(last_valid_block_heights);
    }

    pub(crate) fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn block_height(&self, _commitment: CommitmentConfig) -> TxResult<u64> {
        if self.fail_heights.load(Ordering::SeqCst) {
            return Err(TxError::NetworkUnavailable("height unavailable".to_string()));
        }
        let mut heights = self.heights.lock().unwrap();
        if heights.len() > 1 {
            return Ok(heights.pop_front().unwrap_or_default());
        }
        heights
            .front()
            .copied()
            .ok_or_else(|| TxError::NetworkUnavailable("no height scripted".to_string()))
    }

    async fn signature_status(&self, _signature: &Signature) -> TxResult<Option<SignatureState>> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.statuses.lock().unwrap().pop_front() {
            return Ok(status);
        }
        Ok(self.default_status.lock().unwrap().clone())
    }

    async fn send_transaction(
        &self,
        transaction: &Transaction,
        _config: RpcSendTransactionConfig,
    ) -> TxResult<Signature> {
        self.sent.lock().unwrap().push(transaction.clone());
        Ok(transaction.signatures[0])
    }

    async fn latest_anchor(&self) -> TxResult<TransactionAnchor> {
        let last_valid_block_height = self.anchors.lock().unwrap().pop_front().unwrap_or(1_000);
        Ok(TransactionAnchor {
            blockhash: Hash::new_unique(),
            last_valid_block_height,
        })
    }
}

type EventLog = Arc<Mutex<Vec<&'static str>>>;

fn events(log: &EventLog) -> Vec<&'static str> {
    log.lock().unwrap().clone()
}

struct MockSource {
    payer: Pubkey,
    log: EventLog,
    co_signer: Option<Pubkey>,
}

#[async_trait]
impl InstructionSource for MockSource {
    async fn instructions(&self) -> TxResult<Vec<Instruction>> {
        self.log.lock().unwrap().push("build");
        let mut instructions = vec![system_instruction::transfer(
            &self.payer,
            &Pubkey::new_unique(),
            1,
        )];
        if let Some(co_signer) = self.co_signer {
            instructions.push(Instruction::new_with_bytes(
                Pubkey::new_unique(),
                &[0],
                vec![AccountMeta::new_readonly(co_signer, true)],
            ));
        }
        Ok(instructions)
    }

    fn describe(&self) -> String {
        "mock transfer".to_string()
    }
}

enum Step {
    Accept,
    NotAccepted,
    Error(TxError),
}

struct MockStrategy {
    log: EventLog,
    steps: Mutex<VecDeque<Step>>,
    submitted: Mutex<Vec<SignedPayload>>,
}

impl MockStrategy {
    fn new(log: EventLog, steps: Vec<Step>) -> Self {
        Self {
            log,
            steps: Mutex::new(steps.into()),
            submitted: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SubmissionStrategy for MockStrategy {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn decorate(&self, instructions: Vec<Instruction>, _payer: &Pubkey) -> Vec<Instruction> {
        instructions
    }

    async fn submit(&self, payload: &SignedPayload) -> TxResult<SubmissionResult> {
        self.log.lock().unwrap().push("submit");
        self.submitted.lock().unwrap().push(payload.clone());
        match self.steps.lock().unwrap().pop_front().unwrap_or(Step::Accept) {
            Step::Accept => Ok(SubmissionResult::accepted(payload.signature)),
            Step::NotAccepted => Ok(SubmissionResult::rejected()),
            Step::Error(e) => Err(e),
        }
    }
}

enum RelayStep {
    Ack,
    Hang,
    Reject,
}

/// Relay that lands the payload on the mock ledger when it acks.
struct MockRelay {
    ledger: Arc<MockLedger>,
    log: EventLog,
    steps: Mutex<VecDeque<RelayStep>>,
}

#[async_trait]
impl RelayTransport for MockRelay {
    async fn send(&self, payload: &SignedPayload) -> TxResult<Signature> {
        self.log.lock().unwrap().push("submit");
        let step = self.steps.lock().unwrap().pop_front().unwrap_or(RelayStep::Ack);
        match step {
            RelayStep::Ack => {
                self.ledger.set_default_status(confirmed());
                Ok(payload.signature)
            }
            RelayStep::Hang => std::future::pending().await,
            RelayStep::Reject => Err(TxError::Rejected("bundle dropped".to_string())),
        }
    }
}

fn orchestrator(
    ledger: Arc<MockLedger>,
    payer: Arc<Keypair>,
    policy: RetryPolicy,
    cancel: CancellationToken,
) -> RetryOrchestrator {
    let poller = ConfirmationPoller::new(ledger.clone(), DEFAULT_POLL_INTERVAL);
    RetryOrchestrator::new(ledger, poller, payer, policy, cancel)
}

fn source(payer: &Keypair, log: &EventLog) -> MockSource {
    MockSource {
        payer: payer.pubkey(),
        log: log.clone(),
        co_signer: None,
    }
}

fn relay_strategy(ledger: Arc<MockLedger>, relay: MockRelay) -> PriorityRelaySubmission {
    PriorityRelaySubmission::new(Arc::new(relay), ledger, 10_000, vec![Pubkey::new_unique()])
        .with_ack_timeout(Duration::from_secs(2))
        .with_watch_interval(Duration::from_millis(200))
}

#[tokio::test(start_paused = true)]
async fn relay_timeout_rebuilds_once_before_next_submit() {
    let ledger = Arc::new(MockLedger::with_heights(vec![100]));
    let payer = Arc::new(Keypair::new());
    let log = EventLog::default();
    let relay = MockRelay {
        ledger: ledger.clone(),
        log: log.clone(),
        steps: Mutex::new(VecDeque::from([RelayStep::Hang, RelayStep::Ack])),
    };
    let strategy = relay_strategy(ledger.clone(), relay);

    let outcome = orchestrator(ledger, payer.clone(), RetryPolicy::default(), CancellationToken::new())
        .execute_with_retry(&source(&payer, &log), &strategy)
        .await
        .unwrap();

    assert_eq!(events(&log), vec!["build", "submit", "build", "submit"]);
    assert_eq!(outcome.attempts, 2);
    assert!(outcome.status.is_success());
}

#[tokio::test(start_paused = true)]
async fn signature_mismatch_fails_without_rebuild() {
    let ledger = Arc::new(MockLedger::with_heights(vec![100]));
    let payer = Arc::new(Keypair::new());
    let log = EventLog::default();
    let source = MockSource {
        co_signer: Some(Pubkey::new_unique()),
        ..source(&payer, &log)
    };
    let strategy = MockStrategy::new(log.clone(), vec![]);

    let err = orchestrator(ledger.clone(), payer, RetryPolicy::default(), CancellationToken::new())
        .execute_with_retry(&source, &strategy)
        .await
        .unwrap_err();

    assert!(matches!(err, TxError::SignatureMismatch(_)));
    assert_eq!(events(&log), vec!["build"]);
    assert_eq!(ledger.sent_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn fatal_submission_error_is_not_retried() {
    let ledger = Arc::new(MockLedger::with_heights(vec![100]));
    let payer = Arc::new(Keypair::new());
    let log = EventLog::default();
    let strategy = MockStrategy::new(
        log.clone(),
        vec![Step::Error(TxError::SignatureMismatch("node disagrees".to_string()))],
    );

    let err = orchestrator(ledger, payer.clone(), RetryPolicy::default(), CancellationToken::new())
        .execute_with_retry(&source(&payer, &log), &strategy)
        .await
        .unwrap_err();

    assert!(matches!(err, TxError::SignatureMismatch(_)));
    assert_eq!(events(&log), vec!["build", "submit"]);
}

#[tokio::test(start_paused = true)]
async fn expired_anchor_is_never_submitted() {
    let ledger = Arc::new(MockLedger::with_heights(vec![900]));
    ledger.push_anchors(vec![1_000, 2_000]);
    ledger.set_default_status(confirmed());
    let payer = Arc::new(Keypair::new());
    let log = EventLog::default();
    let strategy = MockStrategy::new(log.clone(), vec![]);

    let outcome = orchestrator(ledger, payer.clone(), RetryPolicy::default(), CancellationToken::new())
        .execute_with_retry(&source(&payer, &log), &strategy)
        .await
        .unwrap();

    assert_eq!(events(&log), vec!["build", "build", "submit"]);
    let submitted = strategy.submitted.lock().unwrap();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].anchor.last_valid_block_height, 2_000);
    assert_eq!(outcome.attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn gives_up_when_attempts_are_spent() {
    let ledger = Arc::new(MockLedger::with_heights(vec![100]));
    let payer = Arc::new(Keypair::new());
    let log = EventLog::default();
    let strategy = MockStrategy::new(
        log.clone(),
        vec![Step::NotAccepted, Step::NotAccepted, Step::NotAccepted, Step::NotAccepted],
    );
    let policy = RetryPolicy {
        max_attempts: Some(3),
        ..RetryPolicy::default()
    };

    let err = orchestrator(ledger, payer.clone(), policy, CancellationToken::new())
        .execute_with_retry(&source(&payer, &log), &strategy)
        .await
        .unwrap_err();

    match err {
        TxError::RetriesExhausted {
            attempts,
            last_error,
            last_signature,
        } => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("mock"));
            assert_eq!(last_signature, Some(strategy.submitted.lock().unwrap()[2].signature));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(events(&log).iter().filter(|e| **e == "build").count(), 3);
}

#[tokio::test(start_paused = true)]
async fn gives_up_when_time_is_spent() {
    // each rejected attempt costs one 10 s backoff
    let ledger = Arc::new(MockLedger::with_heights(vec![100]));
    let payer = Arc::new(Keypair::new());
    let log = EventLog::default();
    let strategy = MockStrategy::new(
        log.clone(),
        (0..100).map(|_| Step::NotAccepted).collect(),
    );
    let policy = RetryPolicy {
        max_attempts: None,
        max_elapsed: Some(Duration::from_secs(30)),
        backoff: Duration::from_secs(10),
    };

    let err = orchestrator(ledger, payer.clone(), policy, CancellationToken::new())
        .execute_with_retry(&source(&payer, &log), &strategy)
        .await
        .unwrap_err();

    match err {
        TxError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn cancelled_before_start_builds_nothing() {
    let ledger = Arc::new(MockLedger::with_heights(vec![100]));
    let payer = Arc::new(Keypair::new());
    let log = EventLog::default();
    let strategy = MockStrategy::new(log.clone(), vec![]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = orchestrator(ledger, payer.clone(), RetryPolicy::default(), cancel)
        .execute_with_retry(&source(&payer, &log), &strategy)
        .await
        .unwrap_err();

    assert!(matches!(err, TxError::Cancelled { signature: None }));
    assert!(events(&log).is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancellation_while_polling_reports_in_flight_signature() {
    let ledger = Arc::new(MockLedger::with_heights(vec![100]));
    let payer = Arc::new(Keypair::new());
    let log = EventLog::default();
    let strategy = MockStrategy::new(log.clone(), vec![]);
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        canceller.cancel();
    });

    let err = orchestrator(ledger, payer.clone(), RetryPolicy::default(), cancel)
        .execute_with_retry(&source(&payer, &log), &strategy)
        .await
        .unwrap_err();

    let submitted = strategy.submitted.lock().unwrap();
    match err {
        TxError::Cancelled { signature: Some(signature) } => {
            assert_eq!(signature, submitted[0].signature)
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn execution_failure_is_terminal() {
    let ledger = Arc::new(MockLedger::with_heights(vec![100]));
    ledger.set_default_status(Some(state(
        Some(TransactionConfirmationStatus::Confirmed),
        Some("custom program error: 0x1e".to_string()),
    )));
    let payer = Arc::new(Keypair::new());
    let log = EventLog::default();
    let strategy = MockStrategy::new(log.clone(), vec![]);

    let err = orchestrator(ledger, payer.clone(), RetryPolicy::default(), CancellationToken::new())
        .execute_with_retry(&source(&payer, &log), &strategy)
        .await
        .unwrap_err();

    match err {
        TxError::ExecutionFailed { reason, .. } => assert!(reason.contains("0x1e")),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(events(&log), vec!["build", "submit"]);
}

#[tokio::test(start_paused = true)]
async fn late_landing_of_previous_attempt_is_not_rebuilt() {
    // pre-submit check, poll start, expiry check
    let ledger = Arc::new(MockLedger::with_heights(vec![100, 100, 900]));
    ledger.push_statuses(vec![None]);
    ledger.set_default_status(confirmed());
    let payer = Arc::new(Keypair::new());
    let log = EventLog::default();
    let strategy = MockStrategy::new(log.clone(), vec![]);

    let outcome = orchestrator(ledger, payer.clone(), RetryPolicy::default(), CancellationToken::new())
        .execute_with_retry(&source(&payer, &log), &strategy)
        .await
        .unwrap();

    assert_eq!(events(&log), vec!["build", "submit"]);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.signature, strategy.submitted.lock().unwrap()[0].signature);
}

#[test]
fn retry_future_can_cross_threads() {
    fn assert_send<T: Send>(_: &T) {}

    let ledger = Arc::new(MockLedger::with_heights(vec![100]));
    let payer = Arc::new(Keypair::new());
    let log = EventLog::default();
    let strategy = MockStrategy::new(log.clone(), vec![]);
    let retry = orchestrator(ledger, payer.clone(), RetryPolicy::default(), CancellationToken::new());
    let instructions = source(&payer, &log);

    let future = retry.execute_with_retry(&instructions, &strategy);
    assert_send(&future);
}

#[tokio::test(start_paused = true)]
async fn late_landing_on_the_last_allowed_attempt_still_succeeds() {
    let ledger = Arc::new(MockLedger::with_heights(vec![100, 100, 900]));
    ledger.push_statuses(vec![None]);
    ledger.set_default_status(confirmed());
    let payer = Arc::new(Keypair::new());
    let log = EventLog::default();
    let strategy = MockStrategy::new(log.clone(), vec![]);
    let policy = RetryPolicy {
        max_attempts: Some(1),
        ..RetryPolicy::default()
    };

    let outcome = orchestrator(ledger, payer.clone(), policy, CancellationToken::new())
        .execute_with_retry(&source(&payer, &log), &strategy)
        .await
        .unwrap();

    assert_eq!(events(&log), vec!["build", "submit"]);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.signature, strategy.submitted.lock().unwrap()[0].signature);
}

#[tokio::test(start_paused = true)]
async fn relay_accepts_when_signature_shows_up_on_ledger() {
    let ledger = Arc::new(MockLedger::with_heights(vec![100]));
    ledger.set_default_status(Some(state(Some(TransactionConfirmationStatus::Processed), None)));
    let payer = Keypair::new();
    let log = EventLog::default();
    let relay = MockRelay {
        ledger: ledger.clone(),
        log,
        steps: Mutex::new(VecDeque::from([RelayStep::Hang])),
    };
    let strategy = relay_strategy(ledger, relay);
    let instructions = strategy.decorate(
        vec![system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1)],
        &payer.pubkey(),
    );
    let anchor = TransactionAnchor {
        blockhash: Hash::new_unique(),
        last_valid_block_height: 1_000,
    };
    let payload = sign_payload(&instructions, &[&payer], anchor).unwrap();

    let result = strategy.submit(&payload).await.unwrap();

    assert_eq!(result, SubmissionResult::accepted(payload.signature));
}

#[tokio::test(start_paused = true)]
async fn relay_timeout_returns_unaccepted_without_signature() {
    let ledger = Arc::new(MockLedger::with_heights(vec![100]));
    let payer = Keypair::new();
    let relay = MockRelay {
        ledger: ledger.clone(),
        log: EventLog::default(),
        steps: Mutex::new(VecDeque::from([RelayStep::Hang])),
    };
    let strategy = relay_strategy(ledger, relay);
    let anchor = TransactionAnchor {
        blockhash: Hash::new_unique(),
        last_valid_block_height: 1_000,
    };
    let transfer = system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1);
    let payload = sign_payload(&[transfer], &[&payer], anchor).unwrap();

    let result = strategy.submit(&payload).await.unwrap();

    assert_eq!(result, SubmissionResult::rejected());
    assert!(matches!(strategy.rejection(), TxError::RelayTimeout { timeout_ms: 2_000 }));
}

#[tokio::test(start_paused = true)]
async fn relay_rejection_is_retryable() {
    let ledger = Arc::new(MockLedger::with_heights(vec![100]));
    let payer = Keypair::new();
    let relay = MockRelay {
        ledger: ledger.clone(),
        log: EventLog::default(),
        steps: Mutex::new(VecDeque::from([RelayStep::Reject])),
    };
    let strategy = relay_strategy(ledger, relay);
    let anchor = TransactionAnchor {
        blockhash: Hash::new_unique(),
        last_valid_block_height: 1_000,
    };
    let transfer = system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1);
    let payload = sign_payload(&[transfer], &[&payer], anchor).unwrap();

    let err = strategy.submit(&payload).await.unwrap_err();

    assert!(matches!(err, TxError::Rejected(_)));
    assert!(err.is_retryable());
}

#[test]
fn relay_decoration_adds_budget_and_tip() {
    let ledger = Arc::new(MockLedger::default());
    let payer = Pubkey::new_unique();
    let tip_account = Pubkey::new_unique();
    let relay = MockRelay {
        ledger: ledger.clone(),
        log: EventLog::default(),
        steps: Mutex::new(VecDeque::new()),
    };
    let strategy = PriorityRelaySubmission::new(Arc::new(relay), ledger, 50_000, vec![tip_account])
        .with_priority(PriorityFee::new(Some(100_000), None));
    let transfer = system_instruction::transfer(&payer, &Pubkey::new_unique(), 1);

    let instructions = strategy.decorate(vec![transfer.clone()], &payer);

    assert_eq!(instructions.len(), 3);
    assert_eq!(instructions[1], transfer);
    assert_eq!(
        instructions[2],
        system_instruction::transfer(&payer, &tip_account, 50_000)
    );
}

#[tokio::test(start_paused = true)]
async fn direct_submission_sends_through_the_ledger() {
    let ledger = Arc::new(MockLedger::with_heights(vec![100]));
    let payer = Keypair::new();
    let strategy = DirectSubmission::new(ledger.clone(), PriorityFee::new(None, Some(2_000)));
    let instructions = strategy.decorate(
        vec![system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1)],
        &payer.pubkey(),
    );
    let anchor = TransactionAnchor {
        blockhash: Hash::new_unique(),
        last_valid_block_height: 1_000,
    };
    let payload = sign_payload(&instructions, &[&payer], anchor).unwrap();

    let result = strategy.submit(&payload).await.unwrap();

    assert_eq!(instructions.len(), 2);
    assert_eq!(result, SubmissionResult::accepted(payload.signature));
    assert_eq!(ledger.sent_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn direct_submission_rejects_tampered_payload() {
    let ledger = Arc::new(MockLedger::with_heights(vec![100]));
    let payer = Keypair::new();
    let strategy = DirectSubmission::new(ledger.clone(), PriorityFee::default());
    let anchor = TransactionAnchor {
        blockhash: Hash::new_unique(),
        last_valid_block_height: 1_000,
    };
    let transfer = system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1);
    let mut payload = sign_payload(&[transfer], &[&payer], anchor).unwrap();
    payload.transaction.signatures[0] = Signature::new_unique();

    let err = strategy.submit(&payload).await.unwrap_err();

    assert!(matches!(err, TxError::SignatureMismatch(_)));
    assert_eq!(ledger.sent_count(), 0);
}
