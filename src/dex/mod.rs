//! DEX protocol integrations
//!
//! - Raydium AMM v4 state and pool lookup
//! - OpenBook market accounts backing the AMM
//! - Raydium swap and deposit instructions

pub mod openbook;
pub mod raydium;
pub mod raydium_amm;

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

pub use openbook::MarketKeys;
pub use raydium_amm::{AmmPool, PoolKeys, PoolReserves};

#[derive(Debug, Error)]
pub enum DexError {
    #[error("no Raydium AMM pool found for {base} / {quote}")]
    PoolNotFound { base: Pubkey, quote: Pubkey },

    #[error("account {0} not found")]
    AccountNotFound(Pubkey),

    #[error("account {account} is invalid: {reason}")]
    InvalidAccount { account: Pubkey, reason: String },

    #[error("pool {pool} does not trade {mint}")]
    MintNotInPool { pool: Pubkey, mint: Pubkey },

    #[error("pool {0} has no liquidity")]
    EmptyPool(Pubkey),

    #[error("rpc error: {0}")]
    Rpc(String),
}

/// Bounds-checked little-endian reads over raw account data.
pub(crate) struct Layout<'a> {
    account: Pubkey,
    data: &'a [u8],
}

impl<'a> Layout<'a> {
    pub(crate) fn new(account: Pubkey, data: &'a [u8], expected_len: usize) -> Result<Self, DexError> {
        if data.len() < expected_len {
            return Err(DexError::InvalidAccount {
                account,
                reason: format!("expected at least {} bytes, got {}", expected_len, data.len()),
            });
        }
        Ok(Self { account, data })
    }

    fn bytes<const N: usize>(&self, offset: usize) -> Result<[u8; N], DexError> {
        self.data
            .get(offset..offset + N)
            .and_then(|slice| slice.try_into().ok())
            .ok_or_else(|| DexError::InvalidAccount {
                account: self.account,
                reason: format!("read of {} bytes at offset {} out of bounds", N, offset),
            })
    }

    pub(crate) fn u64(&self, offset: usize) -> Result<u64, DexError> {
        Ok(u64::from_le_bytes(self.bytes::<8>(offset)?))
    }

    pub(crate) fn u128(&self, offset: usize) -> Result<u128, DexError> {
        Ok(u128::from_le_bytes(self.bytes::<16>(offset)?))
    }

    pub(crate) fn pubkey(&self, offset: usize) -> Result<Pubkey, DexError> {
        Ok(Pubkey::new_from_array(self.bytes::<32>(offset)?))
    }
}
