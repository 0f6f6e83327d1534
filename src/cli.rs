//! Command-line interface

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use solana_sdk::{pubkey::Pubkey, signer::Signer};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::block_engine::TransactionLandingMode;
use crate::engine::{
    add_liquidity, revoke_authority, swap, volume, LiquidityRequest, RevokeRequest, SwapOrder, SwapRequest,
    TradingContext, VolumeRequest,
};
use crate::strategies::run_copy_sell;
use crate::utils::config::{load_wallet, Cluster, Config, DEFAULT_CONFIG_PATH};
use crate::utils::math::ui_to_raw;

const SOL_DECIMALS: u8 = 9;

#[derive(Debug, Parser)]
#[command(name = "raydium-cli", version, about = "Raydium AMM trading toolkit for Solana")]
pub struct Cli {
    /// TOML configuration file. Missing files fall back to defaults.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Deposit SOL and the paired token into an AMM pool
    AddLiquidity(AddLiquidityArgs),
    /// Buy a token with SOL or sell a share of a held token
    Swap(SwapArgs),
    /// Buy and sell a token in one transaction
    Volume(VolumeArgs),
    /// Revoke the mint and/or freeze authority of a mint
    RevokeAuthority(RevokeArgs),
    /// Sell every held token a tracked wallet has exited
    CopySell(CopySellArgs),
}

#[derive(Debug, Args)]
pub struct WalletArgs {
    /// Keypair file of the fee payer, created when missing. Falls back to PRIVATE_KEY.
    #[arg(long)]
    pub payer: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Cluster::Mainnet)]
    pub cluster: Cluster,
}

#[derive(Debug, Args)]
pub struct AddLiquidityArgs {
    #[command(flatten)]
    pub wallet: WalletArgs,

    #[arg(long)]
    pub token_address: Pubkey,

    /// Pool to deposit into. Resolved from the token / WSOL pair when absent.
    #[arg(long)]
    pub pool_id: Option<Pubkey>,

    /// SOL to deposit; the token side follows the pool ratio.
    #[arg(long)]
    pub sol: f64,

    /// Compute-unit price in micro-lamports.
    #[arg(long)]
    pub priority_fee: Option<u64>,

    #[arg(long, default_value_t = TransactionLandingMode::Direct)]
    pub landing: TransactionLandingMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Args)]
pub struct SwapArgs {
    #[command(flatten)]
    pub wallet: WalletArgs,

    #[arg(long, value_enum)]
    pub side: Side,

    #[arg(long)]
    pub token_address: Pubkey,

    /// SOL to spend when buying.
    #[arg(long, required_if_eq("side", "buy"))]
    pub sol: Option<f64>,

    /// Share of the balance to sell, 1 to 100.
    #[arg(long, required_if_eq("side", "sell"), value_parser = clap::value_parser!(u8).range(1..=100))]
    pub percentage: Option<u8>,

    #[arg(long)]
    pub pool_id: Option<Pubkey>,

    /// Defaults to the configured landing mode.
    #[arg(long)]
    pub landing: Option<TransactionLandingMode>,
}

#[derive(Debug, Args)]
pub struct VolumeArgs {
    #[command(flatten)]
    pub wallet: WalletArgs,

    #[arg(long)]
    pub token_address: Pubkey,

    #[arg(long)]
    pub sol: f64,

    #[arg(long)]
    pub pool_id: Option<Pubkey>,
}

#[derive(Debug, Args)]
pub struct RevokeArgs {
    #[command(flatten)]
    pub wallet: WalletArgs,

    #[arg(long)]
    pub token_address: Pubkey,

    /// Revoke the mint authority.
    #[arg(long)]
    pub mint: bool,

    /// Revoke the freeze authority.
    #[arg(long)]
    pub freeze: bool,
}

#[derive(Debug, Args)]
pub struct CopySellArgs {
    #[command(flatten)]
    pub wallet: WalletArgs,

    /// Wallet to mirror. Defaults to SMART_MONEY_WALLET.
    #[arg(long = "wallet")]
    pub tracked_wallet: Option<Pubkey>,

    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Positions file. Defaults to the configured path.
    #[arg(long)]
    pub positions: Option<PathBuf>,
}

fn lamports(sol: f64) -> anyhow::Result<u64> {
    match ui_to_raw(sol, SOL_DECIMALS) {
        Some(lamports) if lamports > 0 => Ok(lamports),
        _ => Err(anyhow!("invalid SOL amount {}", sol)),
    }
}

fn context(config: Config, wallet: &WalletArgs, cancel: CancellationToken) -> anyhow::Result<TradingContext> {
    let keypair = load_wallet(wallet.payer.as_deref())?;
    info!(wallet = %keypair.pubkey(), cluster = ?wallet.cluster, "wallet loaded");
    Ok(TradingContext::new(config, wallet.cluster, keypair, cancel))
}

impl Command {
    pub async fn run(self, config: Config, cancel: CancellationToken) -> anyhow::Result<()> {
        match self {
            Command::AddLiquidity(args) => {
                let request = LiquidityRequest {
                    mint: args.token_address,
                    pool_id: args.pool_id,
                    lamports: lamports(args.sol)?,
                    unit_price: args.priority_fee,
                    landing: args.landing,
                };
                let ctx = context(config, &args.wallet, cancel)?;
                add_liquidity(&ctx, &request).await?;
            }
            Command::Swap(args) => {
                let order = match args.side {
                    Side::Buy => SwapOrder::Buy {
                        lamports: lamports(args.sol.context("--sol is required to buy")?)?,
                    },
                    Side::Sell => SwapOrder::Sell {
                        percentage: args.percentage.context("--percentage is required to sell")?,
                    },
                };
                let request = SwapRequest {
                    mint: args.token_address,
                    order,
                    pool_id: args.pool_id,
                    landing: args.landing.unwrap_or(config.landing.mode),
                };
                let ctx = context(config, &args.wallet, cancel)?;
                swap(&ctx, &request).await?;
            }
            Command::Volume(args) => {
                let request = VolumeRequest {
                    mint: args.token_address,
                    lamports: lamports(args.sol)?,
                    pool_id: args.pool_id,
                };
                let ctx = context(config, &args.wallet, cancel)?;
                volume(&ctx, &request).await?;
            }
            Command::RevokeAuthority(args) => {
                let request = RevokeRequest {
                    mint: args.token_address,
                    mint_authority: args.mint,
                    freeze_authority: args.freeze,
                };
                let ctx = context(config, &args.wallet, cancel)?;
                revoke_authority(&ctx, &request).await?;
            }
            Command::CopySell(args) => {
                let tracked = match args.tracked_wallet {
                    Some(wallet) => wallet,
                    None => config.smart_money_wallet()?,
                };
                let interval = Duration::from_millis(args.interval_ms.unwrap_or(config.copy_trade.interval_ms));
                let positions = args.positions.unwrap_or_else(|| config.copy_trade.positions_file.clone());
                let ctx = Arc::new(context(config, &args.wallet, cancel)?);
                run_copy_sell(ctx, tracked, interval, positions).await?;
            }
        }
        Ok(())
    }
}
