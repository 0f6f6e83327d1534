//! OpenBook (Serum v3) market accounts used by Raydium AMM v4 instructions.

use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::pubkey::Pubkey;

use super::{DexError, Layout};

pub const OPENBOOK_PROGRAM: Pubkey = solana_sdk::pubkey!("srmqPvymJeFKQ4zGQed1GFppgkRHL9kaELCbyksJtPX");
pub const MARKET_STATE_SIZE: usize = 388;

// offsets past the 5-byte "serum" head padding
const OWN_ADDRESS: usize = 13;
const VAULT_SIGNER_NONCE: usize = 45;
const BASE_MINT: usize = 53;
const QUOTE_MINT: usize = 85;
const BASE_VAULT: usize = 117;
const QUOTE_VAULT: usize = 165;
const REQUEST_QUEUE: usize = 221;
const EVENT_QUEUE: usize = 253;
const BIDS: usize = 285;
const ASKS: usize = 317;
const BASE_LOT_SIZE: usize = 349;
const QUOTE_LOT_SIZE: usize = 357;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketKeys {
    pub market: Pubkey,
    pub program_id: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub request_queue: Pubkey,
    pub event_queue: Pubkey,
    pub bids: Pubkey,
    pub asks: Pubkey,
    pub vault_signer: Pubkey,
    pub base_lot_size: u64,
    pub quote_lot_size: u64,
}

impl MarketKeys {
    pub fn parse(market: Pubkey, program_id: Pubkey, data: &[u8]) -> Result<Self, DexError> {
        let layout = Layout::new(market, data, MARKET_STATE_SIZE)?;

        let own_address = layout.pubkey(OWN_ADDRESS)?;
        if own_address != market {
            return Err(DexError::InvalidAccount {
                account: market,
                reason: format!("market state belongs to {}", own_address),
            });
        }

        let nonce = layout.u64(VAULT_SIGNER_NONCE)?;
        let vault_signer = vault_signer(&market, nonce, &program_id)?;

        Ok(Self {
            market,
            program_id,
            base_mint: layout.pubkey(BASE_MINT)?,
            quote_mint: layout.pubkey(QUOTE_MINT)?,
            base_vault: layout.pubkey(BASE_VAULT)?,
            quote_vault: layout.pubkey(QUOTE_VAULT)?,
            request_queue: layout.pubkey(REQUEST_QUEUE)?,
            event_queue: layout.pubkey(EVENT_QUEUE)?,
            bids: layout.pubkey(BIDS)?,
            asks: layout.pubkey(ASKS)?,
            vault_signer,
            base_lot_size: layout.u64(BASE_LOT_SIZE)?,
            quote_lot_size: layout.u64(QUOTE_LOT_SIZE)?,
        })
    }

    pub async fn fetch(client: &RpcClient, market: &Pubkey) -> Result<Self, DexError> {
        let account = client
            .get_account(market)
            .await
            .map_err(|e| DexError::Rpc(e.to_string()))?;
        Self::parse(*market, account.owner, &account.data)
    }
}

pub fn vault_signer(market: &Pubkey, nonce: u64, program_id: &Pubkey) -> Result<Pubkey, DexError> {
    Pubkey::create_program_address(&[market.as_ref(), &nonce.to_le_bytes()], program_id).map_err(|e| {
        DexError::InvalidAccount {
            account: *market,
            reason: format!("vault signer nonce {} does not derive: {}", nonce, e),
        }
    })
}
