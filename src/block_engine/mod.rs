//! Transaction landing engine
//!
//! Every trading operation lands its transactions through this module:
//! - `anchor`: blockhash anchors and expiry against the finalized height
//! - `confirm`: signature polling bounded by anchor expiry
//! - `submit` / `relay`: direct RPC or tipped relay submission
//! - `retry`: the build → submit → confirm loop
//! - `token`: SPL token helpers shared by the instruction builders

pub mod anchor;
pub mod confirm;
pub mod error;
pub mod relay;
pub mod retry;
pub mod rpc;
pub mod submit;
pub mod token;
pub mod tx;

#[cfg(test)]
pub(crate) mod tests;

pub use anchor::{ExpiryTracker, TransactionAnchor, SAFETY_MARGIN};
pub use confirm::{ConfirmationPoller, ConfirmationStatus, DEFAULT_POLL_INTERVAL};
pub use error::{TxError, TxResult};
pub use relay::{RelayClient, RelayTransport, JITO_TIP_ACCOUNTS};
pub use retry::{
    ExecutionOutcome, InstructionSource, RetryContext, RetryOrchestrator, RetryPolicy, RetryState,
};
pub use rpc::{LedgerClient, SignatureState};
pub use submit::{DirectSubmission, PriorityRelaySubmission, SubmissionResult, SubmissionStrategy};
pub use tx::{sign_payload, PriorityFee, SignedPayload, TransactionLandingMode};
