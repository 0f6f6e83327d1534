//! Mint and freeze authority revocation.

use anyhow::{bail, Context};
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{instruction::Instruction, pubkey::Pubkey, signer::Signer};
use spl_token_2022::instruction::{set_authority, AuthorityType};
use tracing::{info, warn};

use super::{build_error, TradingContext};
use crate::block_engine::{
    token::{get_mint_info, MintInfo},
    ExecutionOutcome, InstructionSource, PriorityFee, TransactionLandingMode, TxResult,
};

#[derive(Debug, Clone)]
pub struct RevokeRequest {
    pub mint: Pubkey,
    pub mint_authority: bool,
    pub freeze_authority: bool,
}

/// `SetAuthority(None)` for every requested authority still held by `owner`.
/// Authorities that are already revoked are skipped.
pub fn revoke_instructions(mint: &MintInfo, owner: &Pubkey, request: &RevokeRequest) -> anyhow::Result<Vec<Instruction>> {
    let requested = [
        (request.mint_authority, AuthorityType::MintTokens, mint.mint_authority),
        (request.freeze_authority, AuthorityType::FreezeAccount, mint.freeze_authority),
    ];

    let mut instructions = Vec::new();
    for (wanted, authority_type, current) in requested {
        if !wanted {
            continue;
        }
        match current {
            None => warn!(mint = %mint.address, authority = ?authority_type, "already revoked"),
            Some(current) if current != *owner => {
                bail!("{:?} authority of {} is held by {}, not {}", authority_type, mint.address, current, owner)
            }
            Some(_) => instructions.push(set_authority(
                &mint.token_program,
                &mint.address,
                None,
                authority_type,
                owner,
                &[],
            )?),
        }
    }

    if instructions.is_empty() {
        bail!("nothing to revoke on {}", mint.address);
    }
    Ok(instructions)
}

struct RevokeSource<'a> {
    rpc: &'a RpcClient,
    owner: Pubkey,
    request: RevokeRequest,
}

impl RevokeSource<'_> {
    // authorities are read fresh each attempt
    async fn build(&self) -> anyhow::Result<Vec<Instruction>> {
        let mint = get_mint_info(self.rpc, &self.request.mint).await?;
        revoke_instructions(&mint, &self.owner, &self.request)
    }
}

#[async_trait]
impl InstructionSource for RevokeSource<'_> {
    async fn instructions(&self) -> TxResult<Vec<Instruction>> {
        self.build().await.map_err(build_error)
    }

    fn describe(&self) -> String {
        format!("revoke authorities of {}", self.request.mint)
    }
}

/// Revokes the requested authorities, always landed directly.
pub async fn revoke_authority(ctx: &TradingContext, request: &RevokeRequest) -> anyhow::Result<ExecutionOutcome> {
    if !request.mint_authority && !request.freeze_authority {
        bail!("pass --mint and/or --freeze");
    }
    let mint = get_mint_info(&ctx.rpc, &request.mint)
        .await
        .with_context(|| format!("failed to load mint {}", request.mint))?;
    info!(
        mint = %mint.address,
        program = %mint.token_program,
        mint_authority = request.mint_authority,
        freeze_authority = request.freeze_authority,
        "revoking"
    );

    let source = RevokeSource {
        rpc: &ctx.rpc,
        owner: ctx.wallet.pubkey(),
        request: request.clone(),
    };
    let strategy = ctx.strategy(TransactionLandingMode::Direct, PriorityFee::default());

    ctx.land("revoke-authority", &source, strategy.as_ref()).await
}
