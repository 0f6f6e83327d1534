//! Error taxonomy of the landing engine.
//!
//! Every error is either retryable (the orchestrator rebuilds and tries again)
//! or fatal (the orchestrator stops and hands the error to the caller).

use solana_sdk::signature::Signature;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TxError {
    /// The anchor crossed its validity threshold before the transaction landed.
    #[error("blockhash expired before confirmation")]
    Expired,

    /// The relay neither acknowledged the payload nor did it show up on chain in time.
    #[error("relay did not acknowledge within {timeout_ms} ms")]
    RelayTimeout { timeout_ms: u64 },

    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// Rejected by the node or relay before an identifier was assigned.
    #[error("submission rejected: {0}")]
    Rejected(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("signature mismatch: {0}")]
    SignatureMismatch(String),

    /// The poll or the loop was abandoned. `signature` is the last payload in
    /// flight, if any, so its status can still be queried later.
    #[error("operation cancelled")]
    Cancelled { signature: Option<Signature> },

    /// The transaction landed but its execution failed on chain.
    #[error("transaction {signature} failed on chain: {reason}")]
    ExecutionFailed { signature: Signature, reason: String },

    #[error("failed to build instructions: {0}")]
    Build(String),

    /// `last_signature` is the final payload sent, which can still be
    /// queried on the ledger.
    #[error("gave up after {attempts} attempts, last error: {last_error}")]
    RetriesExhausted {
        attempts: u32,
        last_error: String,
        last_signature: Option<Signature>,
    },
}

impl TxError {
    /// Whether the orchestrator may rebuild and resubmit after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TxError::Expired
                | TxError::RelayTimeout { .. }
                | TxError::NetworkUnavailable(_)
                | TxError::Rejected(_)
        )
    }
}

pub type TxResult<T> = Result<T, TxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transient_errors_as_retryable() {
        assert!(TxError::Expired.is_retryable());
        assert!(TxError::RelayTimeout { timeout_ms: 10 }.is_retryable());
        assert!(TxError::NetworkUnavailable("down".into()).is_retryable());
        assert!(TxError::Rejected("busy".into()).is_retryable());
    }

    #[test]
    fn classifies_caller_bugs_as_fatal() {
        assert!(!TxError::SignatureMismatch("x".into()).is_retryable());
        assert!(!TxError::MalformedPayload("x".into()).is_retryable());
        assert!(!TxError::Cancelled { signature: None }.is_retryable());
        assert!(!TxError::Build("no pool".into()).is_retryable());
    }
}
