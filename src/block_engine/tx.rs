use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use solana_sdk::{
    compute_budget::ComputeBudgetInstruction,
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Signature, Signer},
    transaction::Transaction,
};

use super::anchor::TransactionAnchor;
use super::error::{TxError, TxResult};

/// Where signed transactions are sent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionLandingMode {
    /// Plain `sendTransaction` on the RPC node.
    #[default]
    Direct,
    /// Tipped submission through a block-engine relay.
    Relay,
}

impl FromStr for TransactionLandingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "relay" | "jito" | "zeroslot" => Ok(TransactionLandingMode::Relay),
            "1" | "direct" | "normal" => Ok(TransactionLandingMode::Direct),
            _ => Err(format!(
                "Invalid transaction landing mode: {}. Use 'relay' or 'direct'",
                s
            )),
        }
    }
}

impl fmt::Display for TransactionLandingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionLandingMode::Direct => write!(f, "direct"),
            TransactionLandingMode::Relay => write!(f, "relay"),
        }
    }
}

// prioritization fee = unit_price * unit_limit
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PriorityFee {
    pub unit_limit: Option<u32>,
    /// Micro-lamports per compute unit.
    pub unit_price: Option<u64>,
}

impl PriorityFee {
    pub fn new(unit_limit: Option<u32>, unit_price: Option<u64>) -> Self {
        Self {
            unit_limit,
            unit_price,
        }
    }

    pub fn instructions(&self) -> Vec<Instruction> {
        let mut instructions = Vec::with_capacity(2);
        if let Some(limit) = self.unit_limit {
            instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(limit));
        }
        if let Some(price) = self.unit_price {
            instructions.push(ComputeBudgetInstruction::set_compute_unit_price(price));
        }
        instructions
    }

    /// Puts the compute budget instructions in front of `instructions`.
    pub fn prepend_to(&self, instructions: Vec<Instruction>) -> Vec<Instruction> {
        let mut with_budget = self.instructions();
        with_budget.extend(instructions);
        with_budget
    }
}

/// A signed transaction bound to the anchor it was signed against.
#[derive(Debug, Clone)]
pub struct SignedPayload {
    pub transaction: Transaction,
    pub anchor: TransactionAnchor,
    /// Fee payer signature, the transaction's identifier.
    pub signature: Signature,
}

impl SignedPayload {
    pub fn payer(&self) -> Option<&Pubkey> {
        self.transaction.message.account_keys.first()
    }

    /// Checks every signature against the message.
    pub fn verify(&self) -> TxResult<()> {
        self.transaction
            .verify()
            .map_err(|e| TxError::SignatureMismatch(e.to_string()))
    }

    pub fn serialize(&self) -> TxResult<Vec<u8>> {
        bincode::serialize(&self.transaction).map_err(|e| TxError::MalformedPayload(e.to_string()))
    }

    pub fn encode_base64(&self) -> TxResult<String> {
        Ok(BASE64.encode(self.serialize()?))
    }
}

/// Signs `instructions` with `signers` (fee payer first) against `anchor`.
///
/// Missing or unexpected signers are reported as `SignatureMismatch`.
pub fn sign_payload(
    instructions: &[Instruction],
    signers: &[&dyn Signer],
    anchor: TransactionAnchor,
) -> TxResult<SignedPayload> {
    if instructions.is_empty() {
        return Err(TxError::MalformedPayload("no instructions to sign".to_string()));
    }
    let payer = signers
        .first()
        .ok_or_else(|| TxError::SignatureMismatch("no fee payer supplied".to_string()))?
        .pubkey();

    let mut transaction = Transaction::new_with_payer(instructions, Some(&payer));
    let signers: Vec<&dyn Signer> = signers.to_vec();
    transaction
        .try_sign(&signers, anchor.blockhash)
        .map_err(|e| TxError::SignatureMismatch(e.to_string()))?;

    let signature = transaction
        .signatures
        .first()
        .copied()
        .ok_or_else(|| TxError::MalformedPayload("transaction has no signatures".to_string()))?;

    Ok(SignedPayload {
        transaction,
        anchor,
        signature,
    })
}
