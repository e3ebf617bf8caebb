//! On-chain transaction submission.
//!
//! A submitter does not broadcast anything itself. It stages an
//! [`OnchainTransactionRow`] in the caller's open store transaction, and
//! the broadcaster picks the row up once that transaction commits. A
//! rolled-back settlement therefore never produces a transfer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use spoke_types::{OnchainTransactionRequest, OnchainTransactionRow, Result, SpokeError};
use tracing::{debug, warn};

use crate::store::OnchainTxLog;

pub trait OnchainSubmitter: Send + Sync {
    /// Queue `request` inside `log` and return the staged row.
    fn send<L>(
        &self,
        log: &mut L,
        request: OnchainTransactionRequest,
    ) -> impl Future<Output = Result<OnchainTransactionRow>> + Send
    where
        L: OnchainTxLog + Send;
}

/// Submitter for tests and embedding, with optional injected faults.
#[derive(Debug, Default)]
pub struct InMemorySubmitter {
    failure: Option<String>,
    latency: Option<Duration>,
    attempts: AtomicUsize,
}

impl InMemorySubmitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every submission fails with `reason`.
    #[must_use]
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Sleep this long before each submission completes.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of `send` calls so far, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }
}

impl OnchainSubmitter for InMemorySubmitter {
    async fn send<L>(
        &self,
        log: &mut L,
        request: OnchainTransactionRequest,
    ) -> Result<OnchainTransactionRow>
    where
        L: OnchainTxLog + Send,
    {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(reason) = &self.failure {
            warn!(to = %request.to, value = %request.value, %reason, "Submission rejected");
            return Err(SpokeError::SubmissionFailed {
                reason: reason.clone(),
            });
        }
        let row = log.stage_onchain_transaction(request)?;
        debug!(id = %row.id, to = %row.to, value = %row.value, "Staged on-chain transaction");
        Ok(row)
    }
}
