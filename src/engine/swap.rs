//! Swaps against a Raydium AMM v4 WSOL pool, and same-transaction
//! buy-then-sell for volume.

use anyhow::{bail, Context};
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{instruction::Instruction, pubkey::Pubkey, signer::Signer};
use tracing::{debug, info};

use super::{build_error, TradingContext};
use crate::block_engine::{
    token::{
        close_account, create_ata_idempotent, get_associated_address, get_mint_meta, get_token_balance, unwrap_sol,
        wrap_sol, WSOL_MINT,
    },
    ExecutionOutcome, InstructionSource, PriorityFee, TransactionLandingMode, TxResult,
};
use crate::dex::{raydium::swap_base_in, DexError, PoolKeys, PoolReserves};
use crate::utils::math::{amount_out, min_amount_with_slippage, percentage_of};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOrder {
    /// Spend `lamports` of SOL on the token.
    Buy { lamports: u64 },
    /// Sell `percentage` (1 to 100) of the held token balance for SOL.
    Sell { percentage: u8 },
}

#[derive(Debug, Clone)]
pub struct SwapRequest {
    pub mint: Pubkey,
    pub order: SwapOrder,
    pub pool_id: Option<Pubkey>,
    pub landing: TransactionLandingMode,
}

#[derive(Debug, Clone)]
pub struct VolumeRequest {
    pub mint: Pubkey,
    pub lamports: u64,
    pub pool_id: Option<Pubkey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub amount_in: u64,
    pub amount_out: u64,
    pub minimum_out: u64,
}

/// Constant-product quote for selling `amount_in` of `input_mint` into the pool.
pub fn quote(
    pool: &PoolKeys,
    reserves: &PoolReserves,
    input_mint: &Pubkey,
    amount_in: u64,
    slippage_pct: f64,
) -> Result<Quote, DexError> {
    let (reserve_in, reserve_out) = pool.directional(reserves, input_mint)?;
    let out = amount_out(
        amount_in,
        reserve_in,
        reserve_out,
        pool.amm.swap_fee_numerator,
        pool.amm.swap_fee_denominator,
    )
    .ok_or(DexError::EmptyPool(pool.id))?;

    Ok(Quote {
        amount_in,
        amount_out: out,
        minimum_out: min_amount_with_slippage(out, slippage_pct),
    })
}

/// Reserves once `quote` has executed.
fn reserves_after(pool: &PoolKeys, reserves: &PoolReserves, input_mint: &Pubkey, quote: &Quote) -> PoolReserves {
    if *input_mint == pool.amm.base_mint {
        PoolReserves {
            base: reserves.base.saturating_add(quote.amount_in),
            quote: reserves.quote.saturating_sub(quote.amount_out),
        }
    } else {
        PoolReserves {
            base: reserves.base.saturating_sub(quote.amount_out),
            quote: reserves.quote.saturating_add(quote.amount_in),
        }
    }
}

/// Buy with `lamports` then sell the guaranteed minimum back, both legs
/// quoted against the reserves they will see.
pub fn round_trip(
    pool: &PoolKeys,
    reserves: &PoolReserves,
    mint: &Pubkey,
    lamports: u64,
    buy_slippage_pct: f64,
    sell_slippage_pct: f64,
) -> Result<(Quote, Quote), DexError> {
    let buy = quote(pool, reserves, &WSOL_MINT, lamports, buy_slippage_pct)?;
    let after_buy = reserves_after(pool, reserves, &WSOL_MINT, &buy);
    let sell = quote(pool, &after_buy, mint, buy.minimum_out, sell_slippage_pct)?;
    Ok((buy, sell))
}

struct SwapSource<'a> {
    rpc: &'a RpcClient,
    owner: Pubkey,
    pool: PoolKeys,
    mint: Pubkey,
    token_program: Pubkey,
    order: SwapOrder,
    slippage_pct: f64,
}

impl SwapSource<'_> {
    async fn build(&self) -> anyhow::Result<Vec<Instruction>> {
        let reserves = self.pool.reserves(self.rpc).await?;
        let owner = &self.owner;
        let token_account = get_associated_address(owner, &self.mint, &self.token_program);

        match self.order {
            SwapOrder::Buy { lamports } => {
                let quote = quote(&self.pool, &reserves, &WSOL_MINT, lamports, self.slippage_pct)?;
                debug!(amount_in = lamports, amount_out = quote.amount_out, minimum_out = quote.minimum_out, "buy quote");

                let (wsol_account, wrap) = wrap_sol(owner, lamports)?;
                let mut instructions = vec![create_ata_idempotent(owner, owner, &self.mint, &self.token_program)];
                instructions.extend(wrap);
                instructions.push(swap_base_in(
                    &self.pool,
                    &wsol_account,
                    &token_account,
                    owner,
                    lamports,
                    quote.minimum_out,
                ));
                instructions.push(unwrap_sol(owner)?);
                Ok(instructions)
            }
            SwapOrder::Sell { percentage } => {
                let balance = get_token_balance(self.rpc, &token_account).await?;
                let amount_in = percentage_of(balance, percentage);
                if amount_in == 0 {
                    bail!("no {} balance to sell", self.mint);
                }
                let quote = quote(&self.pool, &reserves, &self.mint, amount_in, self.slippage_pct)?;
                debug!(amount_in, amount_out = quote.amount_out, minimum_out = quote.minimum_out, "sell quote");

                let wsol_account = get_associated_address(owner, &WSOL_MINT, &spl_token::ID);
                let mut instructions = vec![
                    create_ata_idempotent(owner, owner, &WSOL_MINT, &spl_token::ID),
                    swap_base_in(&self.pool, &token_account, &wsol_account, owner, amount_in, quote.minimum_out),
                    unwrap_sol(owner)?,
                ];
                if percentage >= 100 {
                    instructions.push(close_account(&self.token_program, &token_account, owner, owner)?);
                }
                Ok(instructions)
            }
        }
    }
}

#[async_trait]
impl InstructionSource for SwapSource<'_> {
    async fn instructions(&self) -> TxResult<Vec<Instruction>> {
        self.build().await.map_err(build_error)
    }

    fn describe(&self) -> String {
        match self.order {
            SwapOrder::Buy { lamports } => format!("buy {} for {} lamports", self.mint, lamports),
            SwapOrder::Sell { percentage } => format!("sell {}% of {}", percentage, self.mint),
        }
    }
}

/// Buy or sell `request.mint` against SOL.
pub async fn swap(ctx: &TradingContext, request: &SwapRequest) -> anyhow::Result<ExecutionOutcome> {
    let slippage_pct = match request.order {
        SwapOrder::Buy { lamports } => {
            if lamports == 0 {
                bail!("buy amount must be positive");
            }
            ctx.config.trading.buy_slippage_pct
        }
        SwapOrder::Sell { percentage } => {
            if !(1..=100).contains(&percentage) {
                bail!("sell percentage must be within 1..=100, got {}", percentage);
            }
            ctx.config.trading.sell_slippage_pct
        }
    };

    let pool = ctx.resolve_pool(&request.mint, request.pool_id).await?;
    let (_, token_program) = get_mint_meta(&ctx.rpc, &request.mint)
        .await
        .with_context(|| format!("failed to load mint {}", request.mint))?;

    let source = SwapSource {
        rpc: &ctx.rpc,
        owner: ctx.wallet.pubkey(),
        pool,
        mint: request.mint,
        token_program,
        order: request.order,
        slippage_pct,
    };
    let strategy = ctx.strategy(
        request.landing,
        PriorityFee::new(None, Some(ctx.config.trading.swap_unit_price)),
    );

    info!(operation = %source.describe(), landing = %request.landing, "swap");
    ctx.land("swap", &source, strategy.as_ref()).await
}

struct VolumeSource<'a> {
    rpc: &'a RpcClient,
    owner: Pubkey,
    pool: PoolKeys,
    mint: Pubkey,
    token_program: Pubkey,
    lamports: u64,
    buy_slippage_pct: f64,
    sell_slippage_pct: f64,
}

impl VolumeSource<'_> {
    async fn build(&self) -> anyhow::Result<Vec<Instruction>> {
        let reserves = self.pool.reserves(self.rpc).await?;
        let (buy, sell) = round_trip(
            &self.pool,
            &reserves,
            &self.mint,
            self.lamports,
            self.buy_slippage_pct,
            self.sell_slippage_pct,
        )?;
        debug!(bought = buy.minimum_out, returned = sell.minimum_out, "volume quote");

        let owner = &self.owner;
        let token_account = get_associated_address(owner, &self.mint, &self.token_program);
        let (wsol_account, wrap) = wrap_sol(owner, self.lamports)?;

        let mut instructions = vec![create_ata_idempotent(owner, owner, &self.mint, &self.token_program)];
        instructions.extend(wrap);
        instructions.push(swap_base_in(
            &self.pool,
            &wsol_account,
            &token_account,
            owner,
            buy.amount_in,
            buy.minimum_out,
        ));
        instructions.push(swap_base_in(
            &self.pool,
            &token_account,
            &wsol_account,
            owner,
            sell.amount_in,
            sell.minimum_out,
        ));
        instructions.push(unwrap_sol(owner)?);
        Ok(instructions)
    }
}

#[async_trait]
impl InstructionSource for VolumeSource<'_> {
    async fn instructions(&self) -> TxResult<Vec<Instruction>> {
        self.build().await.map_err(build_error)
    }

    fn describe(&self) -> String {
        format!("volume {} with {} lamports", self.mint, self.lamports)
    }
}

/// Buys and sells `request.mint` in one transaction, always landed directly.
pub async fn volume(ctx: &TradingContext, request: &VolumeRequest) -> anyhow::Result<ExecutionOutcome> {
    if request.lamports == 0 {
        bail!("volume amount must be positive");
    }
    let pool = ctx.resolve_pool(&request.mint, request.pool_id).await?;
    let (_, token_program) = get_mint_meta(&ctx.rpc, &request.mint)
        .await
        .with_context(|| format!("failed to load mint {}", request.mint))?;

    let trading = &ctx.config.trading;
    let source = VolumeSource {
        rpc: &ctx.rpc,
        owner: ctx.wallet.pubkey(),
        pool,
        mint: request.mint,
        token_program,
        lamports: request.lamports,
        buy_slippage_pct: trading.buy_slippage_pct,
        sell_slippage_pct: trading.sell_slippage_pct,
    };
    let strategy = ctx.strategy(
        TransactionLandingMode::Direct,
        PriorityFee::new(Some(trading.volume_unit_limit), Some(trading.volume_unit_price)),
    );

    ctx.land("volume", &source, strategy.as_ref()).await
}
