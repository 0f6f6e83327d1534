//! Ledger access used by the landing engine.
//!
//! `LedgerClient` is the seam between the engine and the RPC node so the
//! engine can be driven by a scripted ledger in tests.

use std::sync::Arc;

use async_trait::async_trait;
use solana_client::{
    client_error::{ClientError, ClientErrorKind},
    nonblocking::rpc_client::RpcClient,
    rpc_config::RpcSendTransactionConfig,
};
use solana_sdk::{
    commitment_config::CommitmentConfig,
    signature::Signature,
    transaction::{Transaction, TransactionError},
};
use solana_transaction_status::TransactionConfirmationStatus;

use super::anchor::TransactionAnchor;
use super::error::{TxError, TxResult};

/// Status of one signature as reported by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureState {
    pub confirmation_status: Option<TransactionConfirmationStatus>,
    /// Execution error of a landed transaction.
    pub error: Option<String>,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn block_height(&self, commitment: CommitmentConfig) -> TxResult<u64>;

    /// `None` when the node has not seen the signature yet.
    async fn signature_status(&self, signature: &Signature) -> TxResult<Option<SignatureState>>;

    async fn send_transaction(
        &self,
        transaction: &Transaction,
        config: RpcSendTransactionConfig,
    ) -> TxResult<Signature>;

    async fn latest_anchor(&self) -> TxResult<TransactionAnchor>;
}

#[async_trait]
impl LedgerClient for RpcClient {
    async fn block_height(&self, commitment: CommitmentConfig) -> TxResult<u64> {
        self.get_block_height_with_commitment(commitment)
            .await
            .map_err(|e| TxError::NetworkUnavailable(e.to_string()))
    }

    async fn signature_status(&self, signature: &Signature) -> TxResult<Option<SignatureState>> {
        let response = self
            .get_signature_statuses(&[*signature])
            .await
            .map_err(|e| TxError::NetworkUnavailable(e.to_string()))?;

        Ok(response
            .value
            .into_iter()
            .next()
            .flatten()
            .map(|status| SignatureState {
                confirmation_status: status.confirmation_status,
                error: status.err.map(|err| err.to_string()),
            }))
    }

    async fn send_transaction(
        &self,
        transaction: &Transaction,
        config: RpcSendTransactionConfig,
    ) -> TxResult<Signature> {
        self.send_transaction_with_config(transaction, config)
            .await
            .map_err(classify_client_error)
    }

    async fn latest_anchor(&self) -> TxResult<TransactionAnchor> {
        let (blockhash, last_valid_block_height) = self
            .get_latest_blockhash_with_commitment(CommitmentConfig::finalized())
            .await
            .map_err(|e| TxError::NetworkUnavailable(e.to_string()))?;

        Ok(TransactionAnchor {
            blockhash,
            last_valid_block_height,
        })
    }
}

#[async_trait]
impl<T: LedgerClient + ?Sized> LedgerClient for Arc<T> {
    async fn block_height(&self, commitment: CommitmentConfig) -> TxResult<u64> {
        (**self).block_height(commitment).await
    }

    async fn signature_status(&self, signature: &Signature) -> TxResult<Option<SignatureState>> {
        (**self).signature_status(signature).await
    }

    async fn send_transaction(
        &self,
        transaction: &Transaction,
        config: RpcSendTransactionConfig,
    ) -> TxResult<Signature> {
        (**self).send_transaction(transaction, config).await
    }

    async fn latest_anchor(&self) -> TxResult<TransactionAnchor> {
        (**self).latest_anchor().await
    }
}

/// Maps a `sendTransaction` failure onto the engine's taxonomy.
pub fn classify_client_error(error: ClientError) -> TxError {
    match error.get_transaction_error() {
        Some(TransactionError::SignatureFailure) => {
            return TxError::SignatureMismatch(error.to_string())
        }
        Some(TransactionError::SanitizeFailure) => {
            return TxError::MalformedPayload(error.to_string())
        }
        _ => {}
    }

    match error.kind() {
        ClientErrorKind::Io(_) | ClientErrorKind::Reqwest(_) => {
            TxError::NetworkUnavailable(error.to_string())
        }
        ClientErrorKind::SerdeJson(_) => TxError::MalformedPayload(error.to_string()),
        ClientErrorKind::SigningError(_) => TxError::SignatureMismatch(error.to_string()),
        _ => TxError::Rejected(error.to_string()),
    }
}
