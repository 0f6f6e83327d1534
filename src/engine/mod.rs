//! Trading operations
//!
//! Every operation resolves its pool once, then hands an `InstructionSource`
//! to the landing engine so quotes are rebuilt on every attempt.

pub mod authority;
pub mod liquidity;
pub mod swap;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use solana_client::{client_error::ClientError, nonblocking::rpc_client::RpcClient};
use solana_sdk::{pubkey::Pubkey, signature::Keypair};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::block_engine::{
    relay::tip_lamports, token::WSOL_MINT, ConfirmationPoller, DirectSubmission, ExecutionOutcome, InstructionSource,
    LedgerClient, PriorityFee, PriorityRelaySubmission, RelayClient, RetryOrchestrator, SubmissionStrategy,
    TransactionLandingMode, TxError, JITO_TIP_ACCOUNTS,
};
use crate::dex::{raydium_amm::find_pool_by_mints, DexError, PoolKeys};
use crate::utils::config::{Cluster, Config};
use crate::utils::logger::{log_operation_failed, log_transaction_landed};

pub use authority::{revoke_authority, RevokeRequest};
pub use liquidity::{add_liquidity, LiquidityRequest};
pub use swap::{quote, swap, volume, Quote, SwapOrder, SwapRequest, VolumeRequest};

/// Configuration, connection, wallet and cancellation shared by one run of
/// the CLI.
pub struct TradingContext {
    pub config: Config,
    pub cluster: Cluster,
    pub rpc: Arc<RpcClient>,
    pub wallet: Arc<Keypair>,
    pub cancel: CancellationToken,
}

impl TradingContext {
    pub fn new(config: Config, cluster: Cluster, wallet: Keypair, cancel: CancellationToken) -> Self {
        let rpc = Arc::new(RpcClient::new_with_timeout_and_commitment(
            config.rpc_url(cluster).to_string(),
            config.request_timeout(),
            config.commitment(),
        ));
        Self {
            config,
            cluster,
            rpc,
            wallet: Arc::new(wallet),
            cancel,
        }
    }

    pub fn ledger(&self) -> Arc<dyn LedgerClient> {
        self.rpc.clone()
    }

    pub fn orchestrator(&self) -> RetryOrchestrator {
        let poller = ConfirmationPoller::new(
            self.ledger(),
            Duration::from_millis(self.config.landing.poll_interval_ms),
        );
        RetryOrchestrator::new(
            self.ledger(),
            poller,
            self.wallet.clone(),
            self.config.retry.policy(),
            self.cancel.clone(),
        )
    }

    pub fn strategy(&self, mode: TransactionLandingMode, priority: PriorityFee) -> Box<dyn SubmissionStrategy> {
        let landing = &self.config.landing;
        match mode {
            TransactionLandingMode::Direct => Box::new(
                DirectSubmission::new(self.ledger(), priority).skip_preflight(landing.skip_preflight),
            ),
            TransactionLandingMode::Relay => {
                let relay = RelayClient::new(
                    landing.relay_url.clone(),
                    landing.relay_api_key.clone(),
                    self.config.request_timeout(),
                );
                Box::new(
                    PriorityRelaySubmission::new(
                        Arc::new(relay),
                        self.ledger(),
                        tip_lamports(landing.tip_sol),
                        JITO_TIP_ACCOUNTS.to_vec(),
                    )
                    .with_priority(priority)
                    .with_ack_timeout(Duration::from_millis(landing.ack_timeout_ms)),
                )
            }
        }
    }

    /// Keys of `pool_id`, or of the largest `mint` / WSOL pool when no id is given.
    pub async fn resolve_pool(&self, mint: &Pubkey, pool_id: Option<Pubkey>) -> anyhow::Result<PoolKeys> {
        let pool_id = match pool_id {
            Some(id) => id,
            None => {
                let (id, _) = find_pool_by_mints(&self.rpc, mint, &WSOL_MINT)
                    .await
                    .with_context(|| format!("failed to find a WSOL pool for {}", mint))?;
                id
            }
        };
        let pool = PoolKeys::fetch(&self.rpc, &pool_id)
            .await
            .with_context(|| format!("failed to load pool {}", pool_id))?;
        if !pool.amm.contains(mint) || !pool.amm.contains(&WSOL_MINT) {
            anyhow::bail!("pool {} does not trade {} against WSOL", pool_id, mint);
        }
        info!(pool = %pool_id, market = %pool.market.market, "resolved pool");
        Ok(pool)
    }

    /// Lands `source` and prints the explorer link, or logs the failure.
    pub async fn land(
        &self,
        operation: &str,
        source: &dyn InstructionSource,
        strategy: &dyn SubmissionStrategy,
    ) -> anyhow::Result<ExecutionOutcome> {
        match self.orchestrator().execute_with_retry(source, strategy).await {
            Ok(outcome) => {
                log_transaction_landed(
                    operation,
                    &outcome.signature.to_string(),
                    self.cluster.explorer_suffix(),
                    outcome.attempts,
                );
                Ok(outcome)
            }
            Err(e) => {
                log_operation_failed(operation, &e.to_string());
                Err(e).with_context(|| format!("{} did not land", operation))
            }
        }
    }
}

/// Maps an instruction-building failure onto the landing engine's errors:
/// RPC failures stay retryable, everything else is fatal.
pub(crate) fn build_error(error: anyhow::Error) -> TxError {
    let network = error.chain().any(|cause| {
        cause.downcast_ref::<ClientError>().is_some()
            || matches!(cause.downcast_ref::<DexError>(), Some(DexError::Rpc(_)))
    });
    if network {
        TxError::NetworkUnavailable(format!("{:#}", error))
    } else {
        TxError::Build(format!("{:#}", error))
    }
}
