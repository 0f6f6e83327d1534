//! Blockhash anchors and their expiry.

use std::sync::Arc;

use solana_sdk::{commitment_config::CommitmentConfig, hash::Hash};
use tracing::debug;

use super::error::TxResult;
use super::rpc::LedgerClient;

/// Blocks subtracted from `last_valid_block_height` before an anchor is
/// considered unusable, covering propagation lag.
pub const SAFETY_MARGIN: u64 = 150;

/// A blockhash and the last block height at which it is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionAnchor {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

impl TransactionAnchor {
    /// Height above which the anchor is treated as expired.
    pub fn expiry_threshold(&self) -> u64 {
        self.last_valid_block_height.saturating_sub(SAFETY_MARGIN)
    }

    pub fn is_expired_at(&self, current_height: u64) -> bool {
        current_height > self.expiry_threshold()
    }
}

/// Answers "is this anchor still usable" against the finalized block height.
#[derive(Clone)]
pub struct ExpiryTracker {
    ledger: Arc<dyn LedgerClient>,
}

impl ExpiryTracker {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self { ledger }
    }

    pub async fn current_height(&self) -> TxResult<u64> {
        self.ledger.block_height(CommitmentConfig::finalized()).await
    }

    /// Fails with `NetworkUnavailable` when the height cannot be fetched.
    pub async fn is_expired(&self, anchor: &TransactionAnchor) -> TxResult<bool> {
        let current_height = self.current_height().await?;
        let threshold = anchor.expiry_threshold();
        let difference = current_height as i128 - threshold as i128;

        debug!(
            current_height,
            threshold,
            difference = difference as i64,
            "checked blockhash expiry"
        );

        Ok(anchor.is_expired_at(current_height))
    }
}
