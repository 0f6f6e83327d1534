//! Build → submit → confirm loop with bounded rebuilds.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use solana_sdk::{
    instruction::Instruction,
    signature::{Keypair, Signature, Signer},
};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::anchor::ExpiryTracker;
use super::confirm::{ConfirmationPoller, ConfirmationStatus};
use super::error::{TxError, TxResult};
use super::rpc::LedgerClient;
use super::submit::SubmissionStrategy;
use super::tx::sign_payload;

/// Rebuilds the instructions of one logical operation. Called once per
/// attempt, so quotes and account state are refreshed every time.
#[async_trait]
pub trait InstructionSource: Send + Sync {
    async fn instructions(&self) -> TxResult<Vec<Instruction>>;

    /// Signers besides the fee payer.
    fn extra_signers(&self) -> Vec<Arc<Keypair>> {
        Vec::new()
    }

    fn describe(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: Option<u32>,
    pub max_elapsed: Option<Duration>,
    /// Delay before a rebuild. Zero rebuilds immediately.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(20),
            max_elapsed: Some(Duration::from_secs(300)),
            backoff: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Retries until success, a fatal error or cancellation.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            max_elapsed: None,
            backoff: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Building,
    Submitting,
    Polling,
    Succeeded,
    ExpiredRetry,
    Failed,
}

impl fmt::Display for RetryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RetryState::Building => "building",
            RetryState::Submitting => "submitting",
            RetryState::Polling => "polling",
            RetryState::Succeeded => "succeeded",
            RetryState::ExpiredRetry => "expired-retry",
            RetryState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Book-keeping for one logical operation.
#[derive(Debug)]
pub struct RetryContext {
    pub operation: String,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub last_signature: Option<Signature>,
    pub state: RetryState,
    started: Instant,
}

impl RetryContext {
    fn new(operation: String) -> Self {
        Self {
            operation,
            attempts: 0,
            last_error: None,
            last_signature: None,
            state: RetryState::Building,
            started: Instant::now(),
        }
    }

    fn transition(&mut self, next: RetryState) {
        debug!(
            operation = %self.operation,
            attempt = self.attempts,
            from = %self.state,
            to = %next,
            "retry state"
        );
        self.state = next;
    }

    fn record(&mut self, error: &TxError) {
        self.last_error = Some(error.to_string());
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn exhausted(&self, policy: &RetryPolicy) -> bool {
        let attempts_spent = policy
            .max_attempts
            .is_some_and(|max| self.attempts >= max);
        let time_spent = policy
            .max_elapsed
            .is_some_and(|max| self.attempts > 0 && self.elapsed() >= max);
        attempts_spent || time_spent
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub signature: Signature,
    pub status: ConfirmationStatus,
    pub attempts: u32,
}

pub struct RetryOrchestrator {
    ledger: Arc<dyn LedgerClient>,
    tracker: ExpiryTracker,
    poller: ConfirmationPoller,
    payer: Arc<Keypair>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RetryOrchestrator {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        poller: ConfirmationPoller,
        payer: Arc<Keypair>,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            tracker: ExpiryTracker::new(ledger.clone()),
            ledger,
            poller,
            payer,
            policy,
            cancel,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `source` through `strategy` until it lands, fails for good, is
    /// cancelled or the policy gives up.
    pub async fn execute_with_retry(
        &self,
        source: &dyn InstructionSource,
        strategy: &dyn SubmissionStrategy,
    ) -> TxResult<ExecutionOutcome> {
        let mut ctx = RetryContext::new(source.describe());
        info!(operation = %ctx.operation, strategy = strategy.name(), "executing");

        loop {
            // the last payload may still land inside the safety margin
            if let Some(outcome) = self.previous_attempt_landed(&mut ctx).await? {
                ctx.transition(RetryState::Succeeded);
                return Ok(outcome);
            }

            if ctx.exhausted(&self.policy) {
                ctx.transition(RetryState::Failed);
                let error = TxError::RetriesExhausted {
                    attempts: ctx.attempts,
                    last_error: ctx.last_error.clone().unwrap_or_else(|| "none".to_string()),
                    last_signature: ctx.last_signature,
                };
                warn!(operation = %ctx.operation, error = %error, "giving up");
                return Err(error);
            }

            ctx.attempts += 1;
            ctx.transition(RetryState::Building);

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                result = self.attempt(&mut ctx, source, strategy) => Some(result),
            };
            let result = result.unwrap_or(Err(TxError::Cancelled {
                signature: ctx.last_signature,
            }));

            match result {
                Ok(outcome) => {
                    ctx.transition(RetryState::Succeeded);
                    info!(
                        operation = %ctx.operation,
                        signature = %outcome.signature,
                        attempts = outcome.attempts,
                        elapsed_ms = ctx.elapsed().as_millis() as u64,
                        "transaction landed"
                    );
                    return Ok(outcome);
                }
                Err(error) if error.is_retryable() => {
                    ctx.record(&error);
                    ctx.transition(RetryState::ExpiredRetry);
                    info!(
                        operation = %ctx.operation,
                        attempt = ctx.attempts,
                        error = %error,
                        "rebuilding transaction"
                    );
                    if !self.policy.backoff.is_zero() {
                        tokio::select! {
                            _ = self.cancel.cancelled() => {
                                ctx.transition(RetryState::Failed);
                                return Err(TxError::Cancelled { signature: ctx.last_signature });
                            }
                            _ = sleep(self.policy.backoff) => {}
                        }
                    }
                }
                Err(error) => {
                    ctx.record(&error);
                    ctx.transition(RetryState::Failed);
                    warn!(operation = %ctx.operation, attempt = ctx.attempts, error = %error, "fatal error");
                    return Err(error);
                }
            }
        }
    }

    // One status query for the payload of the previous attempt before a
    // rebuild, since it can still land after its poll gave up.
    async fn previous_attempt_landed(
        &self,
        ctx: &mut RetryContext,
    ) -> TxResult<Option<ExecutionOutcome>> {
        let Some(signature) = ctx.last_signature else {
            return Ok(None);
        };

        match self.poller.status(&signature).await {
            Ok(status) if status.is_success() => {
                info!(%signature, ?status, "previous attempt landed late");
                Ok(Some(ExecutionOutcome {
                    signature,
                    status,
                    attempts: ctx.attempts,
                }))
            }
            Ok(ConfirmationStatus::Failed) => {
                let reason = self
                    .poller
                    .failure_reason(&signature)
                    .await
                    .unwrap_or_else(|| "unknown".to_string());
                ctx.transition(RetryState::Failed);
                Err(TxError::ExecutionFailed { signature, reason })
            }
            Ok(_) | Err(_) => {
                warn!(
                    %signature,
                    "previous attempt unresolved, a rebuilt transaction may execute twice"
                );
                Ok(None)
            }
        }
    }

    async fn attempt(
        &self,
        ctx: &mut RetryContext,
        source: &dyn InstructionSource,
        strategy: &dyn SubmissionStrategy,
    ) -> TxResult<ExecutionOutcome> {
        let anchor = self.ledger.latest_anchor().await?;
        let instructions = source.instructions().await?;
        let instructions = strategy.decorate(instructions, &self.payer.pubkey());

        // `dyn Signer` is not Sync, keep the borrow out of the awaits below
        let payload = {
            let extra_signers = source.extra_signers();
            let mut signers: Vec<&dyn Signer> = vec![self.payer.as_ref()];
            signers.extend(extra_signers.iter().map(|k| k.as_ref() as &dyn Signer));
            sign_payload(&instructions, &signers, anchor)?
        };

        let expired = match self.tracker.is_expired(&anchor).await {
            Ok(expired) => expired,
            Err(e) => {
                warn!(error = %e, "height query failed before submit, treating anchor as expired");
                true
            }
        };
        if expired {
            return Err(TxError::Expired);
        }

        ctx.transition(RetryState::Submitting);
        ctx.last_signature = Some(payload.signature);
        let result = strategy.submit(&payload).await?;
        if !result.accepted {
            return Err(strategy.rejection());
        }
        let signature = result.signature.unwrap_or(payload.signature);

        ctx.transition(RetryState::Polling);
        match self
            .poller
            .await_confirmation(&signature, &anchor, &self.cancel)
            .await?
        {
            status @ (ConfirmationStatus::Confirmed | ConfirmationStatus::Finalized) => {
                Ok(ExecutionOutcome {
                    signature,
                    status,
                    attempts: ctx.attempts,
                })
            }
            ConfirmationStatus::Failed => {
                let reason = self
                    .poller
                    .failure_reason(&signature)
                    .await
                    .unwrap_or_else(|| "unknown".to_string());
                Err(TxError::ExecutionFailed { signature, reason })
            }
            ConfirmationStatus::Expired | ConfirmationStatus::Pending => Err(TxError::Expired),
        }
    }
}
