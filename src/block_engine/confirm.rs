//! Confirmation polling bounded by blockhash expiry.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::signature::Signature;
use solana_transaction_status::TransactionConfirmationStatus;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::anchor::{ExpiryTracker, TransactionAnchor};
use super::error::{TxError, TxResult};
use super::rpc::{LedgerClient, SignatureState};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2_500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationStatus {
    Pending,
    Confirmed,
    Finalized,
    Expired,
    /// Landed with an execution error.
    Failed,
}

impl ConfirmationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConfirmationStatus::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ConfirmationStatus::Confirmed | ConfirmationStatus::Finalized)
    }
}

impl From<Option<SignatureState>> for ConfirmationStatus {
    fn from(state: Option<SignatureState>) -> Self {
        let Some(state) = state else {
            return ConfirmationStatus::Pending;
        };
        if state.error.is_some() {
            return ConfirmationStatus::Failed;
        }
        match state.confirmation_status {
            Some(TransactionConfirmationStatus::Confirmed) => ConfirmationStatus::Confirmed,
            Some(TransactionConfirmationStatus::Finalized) => ConfirmationStatus::Finalized,
            Some(TransactionConfirmationStatus::Processed) | None => ConfirmationStatus::Pending,
        }
    }
}

/// Polls one signature until it is confirmed, fails, or its anchor expires.
///
/// The anchor's expiry is the only deadline: there is no wall-clock timeout.
#[derive(Clone)]
pub struct ConfirmationPoller {
    ledger: Arc<dyn LedgerClient>,
    tracker: ExpiryTracker,
    poll_interval: Duration,
}

impl ConfirmationPoller {
    pub fn new(ledger: Arc<dyn LedgerClient>, poll_interval: Duration) -> Self {
        Self {
            tracker: ExpiryTracker::new(ledger.clone()),
            ledger,
            poll_interval,
        }
    }

    /// One status query, usable after a cancelled poll to learn the fate of a
    /// payload that was left in flight.
    pub async fn status(&self, signature: &Signature) -> TxResult<ConfirmationStatus> {
        Ok(self.ledger.signature_status(signature).await?.into())
    }

    /// Execution error message of a landed transaction, if any.
    pub async fn failure_reason(&self, signature: &Signature) -> Option<String> {
        self.ledger
            .signature_status(signature)
            .await
            .ok()
            .flatten()
            .and_then(|state| state.error)
    }

    pub async fn await_confirmation(
        &self,
        signature: &Signature,
        anchor: &TransactionAnchor,
        cancel: &CancellationToken,
    ) -> TxResult<ConfirmationStatus> {
        let started = Instant::now();
        let start_height = match self.tracker.current_height().await {
            Ok(height) => Some(height),
            Err(e) => {
                warn!(%signature, error = %e, "could not read start height");
                None
            }
        };
        info!(
            %signature,
            start_height = ?start_height,
            last_valid_block_height = anchor.last_valid_block_height,
            "waiting for confirmation"
        );

        let mut polls: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(TxError::Cancelled {
                    signature: Some(*signature),
                });
            }

            polls += 1;
            match self.status(signature).await {
                Ok(status) if status.is_terminal() => {
                    info!(
                        %signature,
                        ?status,
                        polls,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "transaction settled"
                    );
                    return Ok(status);
                }
                Ok(_) => debug!(%signature, polls, "still pending"),
                Err(e) => warn!(%signature, polls, error = %e, "status query failed"),
            }

            let expired = match self.tracker.is_expired(anchor).await {
                Ok(expired) => expired,
                Err(e) => {
                    warn!(%signature, error = %e, "height query failed, treating anchor as expired");
                    true
                }
            };
            if expired {
                info!(
                    %signature,
                    polls,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "blockhash expired before confirmation"
                );
                return Ok(ConfirmationStatus::Expired);
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(TxError::Cancelled { signature: Some(*signature) });
                }
                _ = sleep(self.poll_interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_engine::tests::{state, MockLedger};
    use solana_sdk::hash::Hash;

    fn anchor(last_valid_block_height: u64) -> TransactionAnchor {
        TransactionAnchor {
            blockhash: Hash::new_unique(),
            last_valid_block_height,
        }
    }

    fn poller(ledger: Arc<MockLedger>) -> ConfirmationPoller {
        ConfirmationPoller::new(ledger, DEFAULT_POLL_INTERVAL)
    }

    #[tokio::test(start_paused = true)]
    async fn expires_as_soon_as_threshold_is_crossed() {
        // start height, then one height per expiry check
        let ledger = Arc::new(MockLedger::with_heights(vec![850, 850, 855, 860, 1005]));
        let signature = Signature::new_unique();

        let status = poller(ledger.clone())
            .await_confirmation(&signature, &anchor(1000), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(status, ConfirmationStatus::Expired);
        assert_eq!(ledger.status_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_confirmed_after_exactly_three_queries() {
        let ledger = Arc::new(MockLedger::with_heights(vec![100]));
        ledger.push_statuses(vec![
            None,
            Some(state(Some(TransactionConfirmationStatus::Processed), None)),
            Some(state(Some(TransactionConfirmationStatus::Confirmed), None)),
        ]);
        let signature = Signature::new_unique();

        let status = poller(ledger.clone())
            .await_confirmation(&signature, &anchor(1000), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(status, ConfirmationStatus::Confirmed);
        assert_eq!(ledger.status_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn terminates_within_height_budget() {
        // heights advance 10 per query starting at 800; threshold is 850
        let heights: Vec<u64> = (0..100).map(|i| 800 + i * 10).collect();
        let ledger = Arc::new(MockLedger::with_heights(heights));
        let signature = Signature::new_unique();

        let status = poller(ledger.clone())
            .await_confirmation(&signature, &anchor(1000), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(status, ConfirmationStatus::Expired);
        let budget = (850u64 - 800).div_ceil(10) + 1;
        assert!(ledger.status_calls() as u64 <= budget);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_signature_is_idempotent() {
        let ledger = Arc::new(MockLedger::with_heights(vec![100]));
        ledger.set_default_status(Some(state(
            Some(TransactionConfirmationStatus::Finalized),
            None,
        )));
        let signature = Signature::new_unique();
        let poller = poller(ledger.clone());
        let cancel = CancellationToken::new();

        let first = poller
            .await_confirmation(&signature, &anchor(1000), &cancel)
            .await
            .unwrap();
        let second = poller
            .await_confirmation(&signature, &anchor(1000), &cancel)
            .await
            .unwrap();

        assert_eq!(first, ConfirmationStatus::Finalized);
        assert_eq!(second, first);
        assert_eq!(ledger.sent_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn landed_with_error_is_failed() {
        let ledger = Arc::new(MockLedger::with_heights(vec![100]));
        ledger.push_statuses(vec![Some(state(
            Some(TransactionConfirmationStatus::Confirmed),
            Some("custom program error: 0x1e".to_string()),
        ))]);

        let status = poller(ledger)
            .await_confirmation(&Signature::new_unique(), &anchor(1000), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(status, ConfirmationStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_reports_signature_in_flight() {
        let ledger = Arc::new(MockLedger::with_heights(vec![100]));
        let signature = Signature::new_unique();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = poller(ledger)
            .await_confirmation(&signature, &anchor(1000), &cancel)
            .await
            .unwrap_err();

        match err {
            TxError::Cancelled { signature: Some(in_flight) } => assert_eq!(in_flight, signature),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn height_failure_is_treated_as_expired() {
        let ledger = Arc::new(MockLedger::with_heights(vec![]));
        ledger.fail_heights(true);

        let status = poller(ledger)
            .await_confirmation(&Signature::new_unique(), &anchor(1000), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(status, ConfirmationStatus::Expired);
    }
}
