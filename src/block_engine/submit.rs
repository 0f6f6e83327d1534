//! Submission strategies: plain RPC or tipped relay.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::{
    commitment_config::CommitmentLevel, instruction::Instruction, pubkey::Pubkey,
    signature::Signature, system_instruction,
};
use tokio::time::{sleep, timeout, Instant};
use tracing::{info, warn};

use super::error::{TxError, TxResult};
use super::relay::{random_tip_account, RelayTransport};
use super::rpc::LedgerClient;
use super::tx::{PriorityFee, SignedPayload};

/// Outcome of handing a payload to the network.
///
/// `signature == None` means the payload was rejected before an identifier
/// was assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionResult {
    pub signature: Option<Signature>,
    pub accepted: bool,
}

impl SubmissionResult {
    pub fn accepted(signature: Signature) -> Self {
        Self {
            signature: Some(signature),
            accepted: true,
        }
    }

    pub fn rejected() -> Self {
        Self {
            signature: None,
            accepted: false,
        }
    }
}

#[async_trait]
pub trait SubmissionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Adds the strategy's own instructions (compute budget, tips) before signing.
    fn decorate(&self, instructions: Vec<Instruction>, payer: &Pubkey) -> Vec<Instruction>;

    async fn submit(&self, payload: &SignedPayload) -> TxResult<SubmissionResult>;

    /// Error recorded by the orchestrator for an unaccepted submission.
    fn rejection(&self) -> TxError {
        TxError::Rejected(format!("{} submission was not accepted", self.name()))
    }
}

pub struct DirectSubmission {
    ledger: Arc<dyn LedgerClient>,
    priority: PriorityFee,
    skip_preflight: bool,
}

impl DirectSubmission {
    pub fn new(ledger: Arc<dyn LedgerClient>, priority: PriorityFee) -> Self {
        Self {
            ledger,
            priority,
            skip_preflight: false,
        }
    }

    pub fn skip_preflight(mut self, skip: bool) -> Self {
        self.skip_preflight = skip;
        self
    }
}

#[async_trait]
impl SubmissionStrategy for DirectSubmission {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn decorate(&self, instructions: Vec<Instruction>, _payer: &Pubkey) -> Vec<Instruction> {
        self.priority.prepend_to(instructions)
    }

    async fn submit(&self, payload: &SignedPayload) -> TxResult<SubmissionResult> {
        payload.verify()?;

        let started = Instant::now();
        let config = RpcSendTransactionConfig {
            skip_preflight: self.skip_preflight,
            preflight_commitment: Some(CommitmentLevel::Confirmed),
            max_retries: Some(0),
            ..RpcSendTransactionConfig::default()
        };
        let signature = self
            .ledger
            .send_transaction(&payload.transaction, config)
            .await?;

        if signature != payload.signature {
            return Err(TxError::SignatureMismatch(format!(
                "node returned {} for payload {}",
                signature, payload.signature
            )));
        }

        info!(
            %signature,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "submitted through rpc"
        );
        Ok(SubmissionResult::accepted(signature))
    }
}

/// Sends through a relay with a tip attached and waits, bounded by
/// `ack_timeout`, for either the relay ack or the signature to show up on
/// the ledger.
pub struct PriorityRelaySubmission {
    relay: Arc<dyn RelayTransport>,
    ledger: Arc<dyn LedgerClient>,
    tip_lamports: u64,
    tip_accounts: Vec<Pubkey>,
    priority: PriorityFee,
    ack_timeout: Duration,
    watch_interval: Duration,
}

impl PriorityRelaySubmission {
    pub fn new(
        relay: Arc<dyn RelayTransport>,
        ledger: Arc<dyn LedgerClient>,
        tip_lamports: u64,
        tip_accounts: Vec<Pubkey>,
    ) -> Self {
        Self {
            relay,
            ledger,
            tip_lamports,
            tip_accounts,
            priority: PriorityFee::default(),
            ack_timeout: Duration::from_secs(5),
            watch_interval: Duration::from_millis(400),
        }
    }

    pub fn with_priority(mut self, priority: PriorityFee) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }

    pub fn with_watch_interval(mut self, watch_interval: Duration) -> Self {
        self.watch_interval = watch_interval;
        self
    }

    // Resolves once the node reports any status for the signature.
    async fn watch_ledger(&self, signature: &Signature) -> Signature {
        loop {
            match self.ledger.signature_status(signature).await {
                Ok(Some(_)) => return *signature,
                Ok(None) => {}
                Err(e) => warn!(%signature, error = %e, "ledger watch query failed"),
            }
            sleep(self.watch_interval).await;
        }
    }
}

#[async_trait]
impl SubmissionStrategy for PriorityRelaySubmission {
    fn name(&self) -> &'static str {
        "relay"
    }

    fn decorate(&self, instructions: Vec<Instruction>, payer: &Pubkey) -> Vec<Instruction> {
        let mut instructions = self.priority.prepend_to(instructions);
        match random_tip_account(&self.tip_accounts) {
            Some(tip_account) if self.tip_lamports > 0 => {
                instructions.push(system_instruction::transfer(
                    payer,
                    &tip_account,
                    self.tip_lamports,
                ));
            }
            _ => warn!("relay payload built without a tip"),
        }
        instructions
    }

    async fn submit(&self, payload: &SignedPayload) -> TxResult<SubmissionResult> {
        payload.verify()?;

        let started = Instant::now();
        let race = async {
            tokio::select! {
                ack = self.relay.send(payload) => ack.map(|signature| (signature, "relay ack")),
                signature = self.watch_ledger(&payload.signature) => Ok((signature, "ledger")),
            }
        };

        match timeout(self.ack_timeout, race).await {
            Ok(Ok((signature, source))) => {
                if signature != payload.signature {
                    return Err(TxError::SignatureMismatch(format!(
                        "relay acknowledged {} for payload {}",
                        signature, payload.signature
                    )));
                }
                info!(
                    %signature,
                    source,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "submitted through relay"
                );
                Ok(SubmissionResult::accepted(signature))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(
                    signature = %payload.signature,
                    timeout_ms = self.ack_timeout.as_millis() as u64,
                    "relay did not acknowledge in time"
                );
                Ok(SubmissionResult::rejected())
            }
        }
    }

    fn rejection(&self) -> TxError {
        TxError::RelayTimeout {
            timeout_ms: self.ack_timeout.as_millis() as u64,
        }
    }
}
