//! Raydium AMM v4 instruction builders
//!
//! Account orders follow the on-chain program's `SwapBaseIn` and `Deposit`
//! handlers, OpenBook market accounts included.

use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};

use super::raydium_amm::{PoolKeys, RAYDIUM_AMM_PROGRAM};

const DEPOSIT_TAG: u8 = 3;
const SWAP_BASE_IN_TAG: u8 = 9;

/// Swap `amount_in` from `user_source` into `user_destination`, failing
/// on-chain when less than `minimum_amount_out` is returned.
pub fn swap_base_in(
    pool: &PoolKeys,
    user_source: &Pubkey,
    user_destination: &Pubkey,
    owner: &Pubkey,
    amount_in: u64,
    minimum_amount_out: u64,
) -> Instruction {
    let mut data = Vec::with_capacity(17);
    data.push(SWAP_BASE_IN_TAG);
    data.extend_from_slice(&amount_in.to_le_bytes());
    data.extend_from_slice(&minimum_amount_out.to_le_bytes());

    let market = &pool.market;
    let accounts = vec![
        AccountMeta::new_readonly(spl_token::ID, false),
        AccountMeta::new(pool.id, false),
        AccountMeta::new_readonly(pool.authority, false),
        AccountMeta::new(pool.amm.open_orders, false),
        AccountMeta::new(pool.amm.target_orders, false),
        AccountMeta::new(pool.amm.base_vault, false),
        AccountMeta::new(pool.amm.quote_vault, false),
        AccountMeta::new_readonly(market.program_id, false),
        AccountMeta::new(market.market, false),
        AccountMeta::new(market.bids, false),
        AccountMeta::new(market.asks, false),
        AccountMeta::new(market.event_queue, false),
        AccountMeta::new(market.base_vault, false),
        AccountMeta::new(market.quote_vault, false),
        AccountMeta::new_readonly(market.vault_signer, false),
        AccountMeta::new(*user_source, false),
        AccountMeta::new(*user_destination, false),
        AccountMeta::new_readonly(*owner, true),
    ];

    Instruction {
        program_id: RAYDIUM_AMM_PROGRAM,
        accounts,
        data,
    }
}

/// Side whose amount the pool keeps fixed on deposit; the other side is
/// charged at the pool ratio up to its maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositSide {
    Base,
    Quote,
}

impl DepositSide {
    fn encode(self) -> u64 {
        match self {
            DepositSide::Base => 0,
            DepositSide::Quote => 1,
        }
    }
}

/// Token accounts owned by the depositor.
#[derive(Debug, Clone, Copy)]
pub struct DepositAccounts {
    pub user_base: Pubkey,
    pub user_quote: Pubkey,
    pub user_lp: Pubkey,
    pub owner: Pubkey,
}

/// Deposit up to `max_base` / `max_quote` into the pool.
pub fn deposit(
    pool: &PoolKeys,
    user: &DepositAccounts,
    max_base: u64,
    max_quote: u64,
    fixed_side: DepositSide,
) -> Instruction {
    let mut data = Vec::with_capacity(25);
    data.push(DEPOSIT_TAG);
    data.extend_from_slice(&max_base.to_le_bytes());
    data.extend_from_slice(&max_quote.to_le_bytes());
    data.extend_from_slice(&fixed_side.encode().to_le_bytes());

    let accounts = vec![
        AccountMeta::new_readonly(spl_token::ID, false),
        AccountMeta::new(pool.id, false),
        AccountMeta::new_readonly(pool.authority, false),
        AccountMeta::new_readonly(pool.amm.open_orders, false),
        AccountMeta::new(pool.amm.target_orders, false),
        AccountMeta::new(pool.amm.lp_mint, false),
        AccountMeta::new(pool.amm.base_vault, false),
        AccountMeta::new(pool.amm.quote_vault, false),
        AccountMeta::new_readonly(pool.market.market, false),
        AccountMeta::new(user.user_base, false),
        AccountMeta::new(user.user_quote, false),
        AccountMeta::new(user.user_lp, false),
        AccountMeta::new_readonly(user.owner, true),
        AccountMeta::new_readonly(pool.market.event_queue, false),
    ];

    Instruction {
        program_id: RAYDIUM_AMM_PROGRAM,
        accounts,
        data,
    }
}
