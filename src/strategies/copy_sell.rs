//! Copy-sell strategy
//!
//! Mirrors the exits of a tracked wallet: every position we hold that the
//! tracked wallet no longer holds is sold in full.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{pubkey::Pubkey, signature::Signature, signer::Signer};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::block_engine::{
    token::{get_associated_address, get_mint_meta, get_token_balance, get_wallet_token_balances},
    TransactionLandingMode, TxError,
};
use crate::common::positions::{JsonFilePositionStore, PositionStore};
use crate::engine::{swap, SwapOrder, SwapRequest, TradingContext};

/// Held positions the tracked wallet has exited: absent from its balances or
/// at zero.
pub fn tokens_to_sell(positions: &[Pubkey], tracked: &HashMap<Pubkey, u64>) -> Vec<Pubkey> {
    positions
        .iter()
        .filter(|mint| tracked.get(mint).copied().unwrap_or(0) == 0)
        .copied()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SellOutcome {
    Sold(Signature),
    /// Nothing left to sell; the position is stale.
    NothingHeld,
}

#[async_trait]
pub trait WalletWatcher: Send + Sync {
    async fn balances(&self, wallet: &Pubkey) -> anyhow::Result<HashMap<Pubkey, u64>>;
}

#[async_trait]
pub trait Seller: Send + Sync {
    async fn sell_all(&self, mint: &Pubkey) -> anyhow::Result<SellOutcome>;
}

pub struct RpcWalletWatcher {
    client: Arc<RpcClient>,
}

impl RpcWalletWatcher {
    pub fn new(client: Arc<RpcClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WalletWatcher for RpcWalletWatcher {
    async fn balances(&self, wallet: &Pubkey) -> anyhow::Result<HashMap<Pubkey, u64>> {
        get_wallet_token_balances(self.client.clone(), wallet).await
    }
}

/// Sells through the swap operation.
pub struct SwapSeller {
    ctx: Arc<TradingContext>,
    landing: TransactionLandingMode,
}

impl SwapSeller {
    pub fn new(ctx: Arc<TradingContext>, landing: TransactionLandingMode) -> Self {
        Self { ctx, landing }
    }
}

#[async_trait]
impl Seller for SwapSeller {
    async fn sell_all(&self, mint: &Pubkey) -> anyhow::Result<SellOutcome> {
        let (_, token_program) = get_mint_meta(&self.ctx.rpc, mint).await?;
        let account = get_associated_address(&self.ctx.wallet.pubkey(), mint, &token_program);
        if get_token_balance(&self.ctx.rpc, &account).await? == 0 {
            return Ok(SellOutcome::NothingHeld);
        }

        let request = SwapRequest {
            mint: *mint,
            order: SwapOrder::Sell { percentage: 100 },
            pool_id: None,
            landing: self.landing,
        };
        let outcome = swap(&self.ctx, &request).await?;
        Ok(SellOutcome::Sold(outcome.signature))
    }
}

pub struct CopySell {
    tracked_wallet: Pubkey,
    interval: Duration,
    watcher: Arc<dyn WalletWatcher>,
    seller: Arc<dyn Seller>,
    store: Arc<dyn PositionStore>,
    cancel: CancellationToken,
}

impl CopySell {
    pub fn new(
        tracked_wallet: Pubkey,
        interval: Duration,
        watcher: Arc<dyn WalletWatcher>,
        seller: Arc<dyn Seller>,
        store: Arc<dyn PositionStore>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            tracked_wallet,
            interval,
            watcher,
            seller,
            store,
            cancel,
        }
    }

    /// One pass: reload positions, diff against the tracked wallet, sell the
    /// exits and drop them from the store. Returns the mints removed.
    pub async fn tick(&self) -> anyhow::Result<Vec<Pubkey>> {
        let positions = self.store.load().await?;
        if positions.is_empty() {
            return Ok(Vec::new());
        }

        let tracked = self
            .watcher
            .balances(&self.tracked_wallet)
            .await
            .with_context(|| format!("failed to fetch balances of {}", self.tracked_wallet))?;

        let mut removed = Vec::new();
        for mint in tokens_to_sell(&positions, &tracked) {
            if self.cancel.is_cancelled() {
                break;
            }
            info!(%mint, "tracked wallet exited, selling");
            match self.seller.sell_all(&mint).await {
                Ok(SellOutcome::Sold(signature)) => {
                    info!(%mint, %signature, "sold");
                    removed.push(mint);
                }
                Ok(SellOutcome::NothingHeld) => {
                    warn!(%mint, "no balance left, dropping position");
                    removed.push(mint);
                }
                Err(e) if matches!(e.downcast_ref::<TxError>(), Some(TxError::Cancelled { .. })) => break,
                Err(e) => error!(%mint, error = %format!("{:#}", e), "sell failed, keeping position"),
            }
        }

        if !removed.is_empty() {
            let remaining = self.store.remove(&removed).await?;
            info!(sold = removed.len(), remaining = remaining.len(), "positions updated");
        }
        Ok(removed)
    }

    /// Ticks every `interval` until cancelled. Tick errors are logged and the
    /// loop continues.
    pub async fn run(&self) -> anyhow::Result<()> {
        info!(
            wallet = %self.tracked_wallet,
            interval_ms = self.interval.as_millis() as u64,
            "copy-sell started"
        );

        loop {
            if let Err(e) = self.tick().await {
                error!(error = %format!("{:#}", e), "copy-sell tick failed");
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("copy-sell stopped");
        Ok(())
    }
}

/// Watches `tracked_wallet` through the copy-trade endpoint when one is
/// configured and sells with the configured landing mode.
pub async fn run_copy_sell(
    ctx: Arc<TradingContext>,
    tracked_wallet: Pubkey,
    interval: Duration,
    positions: PathBuf,
) -> anyhow::Result<()> {
    let watch_client = match &ctx.config.solana.copy_trade_rpc_url {
        Some(url) => Arc::new(RpcClient::new_with_timeout_and_commitment(
            url.clone(),
            ctx.config.request_timeout(),
            ctx.config.commitment(),
        )),
        None => ctx.rpc.clone(),
    };
    info!(positions = %positions.display(), "loading positions");

    let strategy = CopySell::new(
        tracked_wallet,
        interval,
        Arc::new(RpcWalletWatcher::new(watch_client)),
        Arc::new(SwapSeller::new(ctx.clone(), ctx.config.landing.mode)),
        Arc::new(JsonFilePositionStore::new(positions)),
        ctx.cancel.clone(),
    );
    strategy.run().await
}
