//! SOL-side deposits into a Raydium AMM v4 pool.

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{instruction::Instruction, pubkey::Pubkey, signer::Signer};
use tracing::{debug, info};

use super::{build_error, TradingContext};
use crate::block_engine::{
    token::{create_ata_idempotent, get_associated_address, unwrap_sol, wrap_sol, WSOL_MINT},
    ExecutionOutcome, InstructionSource, PriorityFee, TransactionLandingMode, TxResult,
};
use crate::dex::{
    raydium::{deposit, DepositAccounts, DepositSide},
    PoolKeys, PoolReserves,
};
use crate::utils::math::{another_amount, max_amount_with_slippage};

#[derive(Debug, Clone)]
pub struct LiquidityRequest {
    pub mint: Pubkey,
    pub pool_id: Option<Pubkey>,
    pub lamports: u64,
    /// Micro-lamports per compute unit.
    pub unit_price: Option<u64>,
    pub landing: TransactionLandingMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositAmounts {
    pub max_base: u64,
    pub max_quote: u64,
    pub fixed_side: DepositSide,
}

/// Amounts for depositing `lamports` of SOL with the SOL side fixed and the
/// token side capped at the pool ratio plus `slippage_pct`.
pub fn deposit_amounts(
    pool: &PoolKeys,
    reserves: &PoolReserves,
    lamports: u64,
    slippage_pct: f64,
) -> Option<DepositAmounts> {
    if pool.amm.base_mint == WSOL_MINT {
        let token = another_amount(lamports, reserves.base, reserves.quote)?;
        Some(DepositAmounts {
            max_base: lamports,
            max_quote: max_amount_with_slippage(token, slippage_pct),
            fixed_side: DepositSide::Base,
        })
    } else {
        let token = another_amount(lamports, reserves.quote, reserves.base)?;
        Some(DepositAmounts {
            max_base: max_amount_with_slippage(token, slippage_pct),
            max_quote: lamports,
            fixed_side: DepositSide::Quote,
        })
    }
}

struct DepositSource<'a> {
    rpc: &'a RpcClient,
    owner: Pubkey,
    pool: PoolKeys,
    mint: Pubkey,
    lamports: u64,
    slippage_pct: f64,
}

impl DepositSource<'_> {
    async fn build(&self) -> anyhow::Result<Vec<Instruction>> {
        let reserves = self.pool.reserves(self.rpc).await?;
        let amounts = deposit_amounts(&self.pool, &reserves, self.lamports, self.slippage_pct)
            .ok_or_else(|| anyhow!("pool {} has no SOL reserve", self.pool.id))?;
        debug!(
            max_base = amounts.max_base,
            max_quote = amounts.max_quote,
            side = ?amounts.fixed_side,
            "deposit amounts"
        );

        let owner = &self.owner;
        let lp_mint = self.pool.amm.lp_mint;
        let token_account = get_associated_address(owner, &self.mint, &spl_token::ID);
        let lp_account = get_associated_address(owner, &lp_mint, &spl_token::ID);
        let (wsol_account, wrap) = wrap_sol(owner, self.lamports)?;

        let (user_base, user_quote) = if self.pool.amm.base_mint == WSOL_MINT {
            (wsol_account, token_account)
        } else {
            (token_account, wsol_account)
        };

        let mut instructions = vec![
            create_ata_idempotent(owner, owner, &self.mint, &spl_token::ID),
            create_ata_idempotent(owner, owner, &lp_mint, &spl_token::ID),
        ];
        instructions.extend(wrap);
        instructions.push(deposit(
            &self.pool,
            &DepositAccounts {
                user_base,
                user_quote,
                user_lp: lp_account,
                owner: *owner,
            },
            amounts.max_base,
            amounts.max_quote,
            amounts.fixed_side,
        ));
        instructions.push(unwrap_sol(owner)?);
        Ok(instructions)
    }
}

#[async_trait]
impl InstructionSource for DepositSource<'_> {
    async fn instructions(&self) -> TxResult<Vec<Instruction>> {
        self.build().await.map_err(build_error)
    }

    fn describe(&self) -> String {
        format!("deposit {} lamports into {}", self.lamports, self.pool.id)
    }
}

pub async fn add_liquidity(ctx: &TradingContext, request: &LiquidityRequest) -> anyhow::Result<ExecutionOutcome> {
    if request.lamports == 0 {
        bail!("deposit amount must be positive");
    }
    let pool = ctx.resolve_pool(&request.mint, request.pool_id).await?;
    info!(pool = %pool.id, lamports = request.lamports, landing = %request.landing, "adding liquidity");

    let source = DepositSource {
        rpc: &ctx.rpc,
        owner: ctx.wallet.pubkey(),
        pool,
        mint: request.mint,
        lamports: request.lamports,
        slippage_pct: ctx.config.trading.liquidity_slippage_pct,
    };
    let strategy = ctx.strategy(request.landing, PriorityFee::new(None, request.unit_price));

    ctx.land("add-liquidity", &source, strategy.as_ref()).await
}
