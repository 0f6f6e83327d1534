use solana_account_decoder::UiAccountEncoding;
use solana_client::{
    nonblocking::rpc_client::RpcClient,
    rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig},
    rpc_filter::{Memcmp, RpcFilterType},
};
use spl_token_2022::{extension::StateWithExtensionsOwned, state::Account as TokenAccount};
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use super::openbook::MarketKeys;
use super::{DexError, Layout};

pub const RAYDIUM_AMM_PROGRAM: Pubkey = solana_sdk::pubkey!("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8");
pub const RAYDIUM_AMM_POOL_SIZE: usize = 752;
pub const RAYDIUM_AMM_BASE_MINT_POSITION: usize = 400;
pub const RAYDIUM_AMM_QUOTE_MINT_POSITION: usize = 432;

const AMM_AUTHORITY_SEED: &[u8] = b"amm authority";

/// Raydium AMM v4 state. Fields the instruction builders and quotes do not
/// use are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmmPool {
    pub status: u64,
    pub nonce: u64,
    pub base_decimal: u64,
    pub quote_decimal: u64,
    pub trade_fee_numerator: u64,
    pub trade_fee_denominator: u64,
    pub swap_fee_numerator: u64,
    pub swap_fee_denominator: u64,
    pub base_need_take_pnl: u64,
    pub quote_need_take_pnl: u64,
    pub pool_open_time: u64,
    pub swap_base_in_amount: u128,
    pub swap_quote_out_amount: u128,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub lp_mint: Pubkey,
    pub open_orders: Pubkey,
    pub market_id: Pubkey,
    pub market_program_id: Pubkey,
    pub target_orders: Pubkey,
    pub withdraw_queue: Pubkey,
    pub lp_vault: Pubkey,
    pub owner: Pubkey,
    pub lp_reserve: u64,
}

impl AmmPool {
    pub fn parse(pool_id: Pubkey, data: &[u8]) -> Result<Self, DexError> {
        let layout = Layout::new(pool_id, data, RAYDIUM_AMM_POOL_SIZE)?;
        // 32 u64 header fields, index * 8
        let field = |index: usize| layout.u64(index * 8);

        Ok(Self {
            status: field(0)?,
            nonce: field(1)?,
            base_decimal: field(4)?,
            quote_decimal: field(5)?,
            trade_fee_numerator: field(18)?,
            trade_fee_denominator: field(19)?,
            swap_fee_numerator: field(22)?,
            swap_fee_denominator: field(23)?,
            base_need_take_pnl: field(24)?,
            quote_need_take_pnl: field(25)?,
            pool_open_time: field(28)?,
            swap_base_in_amount: layout.u128(256)?,
            swap_quote_out_amount: layout.u128(272)?,
            base_vault: layout.pubkey(336)?,
            quote_vault: layout.pubkey(368)?,
            base_mint: layout.pubkey(RAYDIUM_AMM_BASE_MINT_POSITION)?,
            quote_mint: layout.pubkey(RAYDIUM_AMM_QUOTE_MINT_POSITION)?,
            lp_mint: layout.pubkey(464)?,
            open_orders: layout.pubkey(496)?,
            market_id: layout.pubkey(528)?,
            market_program_id: layout.pubkey(560)?,
            target_orders: layout.pubkey(592)?,
            withdraw_queue: layout.pubkey(624)?,
            lp_vault: layout.pubkey(656)?,
            owner: layout.pubkey(688)?,
            lp_reserve: layout.u64(720)?,
        })
    }

    pub fn authority(&self, pool_id: &Pubkey) -> Result<Pubkey, DexError> {
        let nonce = u8::try_from(self.nonce).map_err(|_| DexError::InvalidAccount {
            account: *pool_id,
            reason: format!("authority nonce {} out of range", self.nonce),
        })?;
        Pubkey::create_program_address(&[AMM_AUTHORITY_SEED, &[nonce]], &RAYDIUM_AMM_PROGRAM).map_err(|e| {
            DexError::InvalidAccount {
                account: *pool_id,
                reason: format!("authority does not derive: {}", e),
            }
        })
    }

    pub fn contains(&self, mint: &Pubkey) -> bool {
        self.base_mint == *mint || self.quote_mint == *mint
    }
}

/// Vault balances net of the pnl the pool owes itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolReserves {
    pub base: u64,
    pub quote: u64,
}

impl PoolReserves {
    pub fn from_vaults(pool: &AmmPool, base_vault_amount: u64, quote_vault_amount: u64) -> Self {
        Self {
            base: base_vault_amount.saturating_sub(pool.base_need_take_pnl),
            quote: quote_vault_amount.saturating_sub(pool.quote_need_take_pnl),
        }
    }
}

/// Everything needed to build swap and deposit instructions for one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolKeys {
    pub id: Pubkey,
    pub amm: AmmPool,
    pub authority: Pubkey,
    pub market: MarketKeys,
}

impl PoolKeys {
    pub fn new(id: Pubkey, amm: AmmPool, market: MarketKeys) -> Result<Self, DexError> {
        Ok(Self {
            id,
            authority: amm.authority(&id)?,
            amm,
            market,
        })
    }

    pub async fn fetch(client: &RpcClient, pool_id: &Pubkey) -> Result<Self, DexError> {
        let account = client
            .get_account(pool_id)
            .await
            .map_err(|e| DexError::Rpc(e.to_string()))?;
        if account.owner != RAYDIUM_AMM_PROGRAM {
            return Err(DexError::InvalidAccount {
                account: *pool_id,
                reason: format!("owned by {}, not the Raydium AMM", account.owner),
            });
        }
        let amm = AmmPool::parse(*pool_id, &account.data)?;
        let market = MarketKeys::fetch(client, &amm.market_id).await?;
        Self::new(*pool_id, amm, market)
    }

    /// Reserves as `(reserve_in, reserve_out)` when `input_mint` is sold.
    pub fn directional(&self, reserves: &PoolReserves, input_mint: &Pubkey) -> Result<(u64, u64), DexError> {
        if *input_mint == self.amm.base_mint {
            Ok((reserves.base, reserves.quote))
        } else if *input_mint == self.amm.quote_mint {
            Ok((reserves.quote, reserves.base))
        } else {
            Err(DexError::MintNotInPool {
                pool: self.id,
                mint: *input_mint,
            })
        }
    }

    pub async fn reserves(&self, client: &RpcClient) -> Result<PoolReserves, DexError> {
        let vaults = [self.amm.base_vault, self.amm.quote_vault];
        let accounts = client
            .get_multiple_accounts(&vaults)
            .await
            .map_err(|e| DexError::Rpc(e.to_string()))?;

        let mut amounts = [0u64; 2];
        for ((vault, account), amount) in vaults.iter().zip(accounts).zip(amounts.iter_mut()) {
            let account = account.ok_or(DexError::AccountNotFound(*vault))?;
            let state = StateWithExtensionsOwned::<TokenAccount>::unpack(account.data).map_err(|e| {
                DexError::InvalidAccount {
                    account: *vault,
                    reason: e.to_string(),
                }
            })?;
            *amount = state.base.amount;
        }

        let reserves = PoolReserves::from_vaults(&self.amm, amounts[0], amounts[1]);
        if reserves.base == 0 || reserves.quote == 0 {
            return Err(DexError::EmptyPool(self.id));
        }
        Ok(reserves)
    }
}

/// Finds the AMM pool trading `mint_a` against `mint_b`, in either order.
/// When several match, the one with the largest LP reserve wins.
pub async fn find_pool_by_mints(
    client: &RpcClient,
    mint_a: &Pubkey,
    mint_b: &Pubkey,
) -> Result<(Pubkey, AmmPool), DexError> {
    let mut candidates = Vec::new();

    for (base, quote) in [(mint_a, mint_b), (mint_b, mint_a)] {
        let config = RpcProgramAccountsConfig {
            filters: Some(vec![
                RpcFilterType::DataSize(RAYDIUM_AMM_POOL_SIZE as u64),
                RpcFilterType::Memcmp(Memcmp::new_base58_encoded(RAYDIUM_AMM_BASE_MINT_POSITION, base.as_ref())),
                RpcFilterType::Memcmp(Memcmp::new_base58_encoded(RAYDIUM_AMM_QUOTE_MINT_POSITION, quote.as_ref())),
            ]),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                ..RpcAccountInfoConfig::default()
            },
            ..RpcProgramAccountsConfig::default()
        };

        let accounts = client
            .get_program_accounts_with_config(&RAYDIUM_AMM_PROGRAM, config)
            .await
            .map_err(|e| DexError::Rpc(e.to_string()))?;

        for (pubkey, account) in accounts {
            match AmmPool::parse(pubkey, &account.data) {
                Ok(pool) => candidates.push((pubkey, pool)),
                Err(e) => debug!(pool = %pubkey, error = %e, "skipping unparsable pool"),
            }
        }
    }

    candidates
        .into_iter()
        .max_by_key(|(_, pool)| pool.lp_reserve)
        .ok_or(DexError::PoolNotFound {
            base: *mint_a,
            quote: *mint_b,
        })
}
