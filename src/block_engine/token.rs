use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use futures::future::try_join_all;
use solana_account_decoder::UiAccountData;
use solana_client::{nonblocking::rpc_client::RpcClient, rpc_request::TokenAccountsFilter};
use solana_sdk::{instruction::Instruction, pubkey::Pubkey, system_instruction};
use spl_associated_token_account::{
    get_associated_token_address_with_program_id,
    instruction::create_associated_token_account_idempotent,
};
use spl_token_2022::{
    extension::StateWithExtensionsOwned,
    state::{Account, Mint},
};
use tracing::debug;

use crate::common::cache::MINT_CACHE;

pub const WSOL_MINT: Pubkey = spl_token::native_mint::ID;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintInfo {
    pub address: Pubkey,
    pub decimals: u8,
    pub supply: u64,
    /// SPL Token or Token-2022, whichever owns the mint.
    pub token_program: Pubkey,
    pub mint_authority: Option<Pubkey>,
    pub freeze_authority: Option<Pubkey>,
}

pub fn is_token_program(program: &Pubkey) -> bool {
    *program == spl_token::ID || *program == spl_token_2022::ID
}

pub fn parse_mint(address: Pubkey, owner: &Pubkey, data: Vec<u8>) -> Result<MintInfo> {
    if !is_token_program(owner) {
        return Err(anyhow!("{} is owned by {}, not a token program", address, owner));
    }
    let mint = StateWithExtensionsOwned::<Mint>::unpack(data)
        .with_context(|| format!("{} is not a mint account", address))?;

    Ok(MintInfo {
        address,
        decimals: mint.base.decimals,
        supply: mint.base.supply,
        token_program: *owner,
        mint_authority: mint.base.mint_authority.into(),
        freeze_authority: mint.base.freeze_authority.into(),
    })
}

/// Mint state. Decimals and owning program are cached, authorities are
/// always read fresh.
pub async fn get_mint_info(client: &RpcClient, address: &Pubkey) -> Result<MintInfo> {
    let account = client
        .get_account(address)
        .await
        .with_context(|| format!("failed to fetch mint {}", address))?;
    let info = parse_mint(*address, &account.owner, account.data)?;
    MINT_CACHE.insert(info.address, info.decimals, info.token_program);
    Ok(info)
}

/// Decimals and owning program of a mint, from the cache when possible.
pub async fn get_mint_meta(client: &RpcClient, address: &Pubkey) -> Result<(u8, Pubkey)> {
    if let Some(meta) = MINT_CACHE.get(address) {
        return Ok(meta);
    }
    let info = get_mint_info(client, address).await?;
    Ok((info.decimals, info.token_program))
}

pub fn get_associated_address(owner: &Pubkey, mint: &Pubkey, token_program: &Pubkey) -> Pubkey {
    get_associated_token_address_with_program_id(owner, mint, token_program)
}

pub fn create_ata_idempotent(payer: &Pubkey, owner: &Pubkey, mint: &Pubkey, token_program: &Pubkey) -> Instruction {
    create_associated_token_account_idempotent(payer, owner, mint, token_program)
}

/// Creates the owner's WSOL account if needed and funds it with `lamports`.
pub fn wrap_sol(owner: &Pubkey, lamports: u64) -> Result<(Pubkey, Vec<Instruction>)> {
    let wsol_account = get_associated_address(owner, &WSOL_MINT, &spl_token::ID);
    let instructions = vec![
        create_ata_idempotent(owner, owner, &WSOL_MINT, &spl_token::ID),
        system_instruction::transfer(owner, &wsol_account, lamports),
        spl_token::instruction::sync_native(&spl_token::ID, &wsol_account)?,
    ];
    Ok((wsol_account, instructions))
}

/// Closes the owner's WSOL account, returning wrapped and rent lamports.
pub fn unwrap_sol(owner: &Pubkey) -> Result<Instruction> {
    let wsol_account = get_associated_address(owner, &WSOL_MINT, &spl_token::ID);
    close_account(&spl_token::ID, &wsol_account, owner, owner)
}

pub fn close_account(
    token_program: &Pubkey,
    token_account: &Pubkey,
    destination: &Pubkey,
    authority: &Pubkey,
) -> Result<Instruction> {
    Ok(spl_token_2022::instruction::close_account(
        token_program,
        token_account,
        destination,
        authority,
        &[],
    )?)
}

/// Raw amount held in a token account. A missing account holds nothing.
pub async fn get_token_balance(client: &RpcClient, account: &Pubkey) -> Result<u64> {
    let response = client
        .get_account_with_commitment(account, client.commitment())
        .await
        .with_context(|| format!("failed to fetch token account {}", account))?;
    let Some(data) = response.value else {
        return Ok(0);
    };
    let state = StateWithExtensionsOwned::<Account>::unpack(data.data)
        .with_context(|| format!("{} is not a token account", account))?;
    Ok(state.base.amount)
}

/// Raw balances of every token account owned by `owner`, summed per mint,
/// across both token programs.
pub async fn get_wallet_token_balances(client: Arc<RpcClient>, owner: &Pubkey) -> Result<HashMap<Pubkey, u64>> {
    let listings = try_join_all([spl_token::ID, spl_token_2022::ID].map(|program| {
        let client = client.clone();
        async move {
            client
                .get_token_accounts_by_owner(owner, TokenAccountsFilter::ProgramId(program))
                .await
                .with_context(|| format!("failed to list {} accounts of {}", program, owner))
        }
    }))
    .await?;

    let mut balances: HashMap<Pubkey, u64> = HashMap::new();
    for keyed in listings.into_iter().flatten() {
        let UiAccountData::Json(parsed) = keyed.account.data else {
            debug!(account = %keyed.pubkey, "skipping non-json token account");
            continue;
        };
        if let Some((mint, amount)) = parse_token_amount(&parsed.parsed) {
            *balances.entry(mint).or_default() += amount;
        }
    }

    Ok(balances)
}

// `{"info": {"mint": "...", "tokenAmount": {"amount": "..."}}}`
fn parse_token_amount(parsed: &serde_json::Value) -> Option<(Pubkey, u64)> {
    let info = parsed.get("info")?;
    let mint = Pubkey::from_str(info.get("mint")?.as_str()?).ok()?;
    let amount = info
        .get("tokenAmount")?
        .get("amount")?
        .as_str()?
        .parse::<u64>()
        .ok()?;
    Some((mint, amount))
}
