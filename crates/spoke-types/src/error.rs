//! Error types for the Spoke consistency core.
//!
//! All errors use the `SPK_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by which invariant was violated:
//! - 1xx: Validation errors (amounts, balances, signatures, request shape)
//! - 2xx: Not-found errors (thread or account absent from a given set)
//! - 3xx: Consistency errors (signer, root, proof, state ordering, ledger)
//! - 4xx: External failures (rate source, on-chain submission, store)
//! - 9xx: General / internal errors
//!
//! Callers branch on [`SpokeError::kind`]: retry on
//! [`ErrorKind::External`], never on [`ErrorKind::Validation`].

use thiserror::Error;

use crate::{Address, Amount, Digest, WithdrawalRequestId};

/// Which class of invariant an error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Consistency,
    External,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "VALIDATION"),
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::Consistency => write!(f, "CONSISTENCY"),
            Self::External => write!(f, "EXTERNAL"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// Central error enum for all Spoke operations.
#[derive(Debug, Error)]
pub enum SpokeError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// Requested withdrawal is smaller than the configured minimum.
    #[error("SPK_ERR_100: Amount below minimum: requested {requested}, minimum {minimum}")]
    AmountBelowMinimum { requested: Amount, minimum: Amount },

    /// Not enough custodial balance to cover the request.
    #[error("SPK_ERR_101: Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Amount, available: Amount },

    /// A signature required for this state is absent.
    #[error("SPK_ERR_102: Missing signature from {party}")]
    MissingSignature { party: String },

    /// An on-chain operation proposed earlier is still unconfirmed.
    #[error("SPK_ERR_103: Channel has pending operations awaiting confirmation")]
    PendingOperations,

    /// The request is malformed (overflowing amounts, bad rate, etc.).
    #[error("SPK_ERR_104: Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// This request id has already been recorded.
    #[error("SPK_ERR_105: Withdrawal request already recorded: {0}")]
    DuplicateRequest(WithdrawalRequestId),

    // =================================================================
    // Not Found Errors (2xx)
    // =================================================================
    /// The target thread's digest is not part of the given thread set.
    #[error("SPK_ERR_200: Thread not found in set: {digest}")]
    ThreadNotFound { digest: Digest },

    /// No custodial account exists for this user.
    #[error("SPK_ERR_201: Custodial account not found: {0}")]
    CustodialAccountNotFound(Address),

    // =================================================================
    // Consistency Errors (3xx)
    // =================================================================
    /// A signature recovered to someone other than the expected signer.
    #[error("SPK_ERR_300: Signer mismatch: expected {expected}, recovered {recovered:?}")]
    SignerMismatch {
        expected: Address,
        recovered: Option<Address>,
    },

    /// The recomputed thread root differs from the claimed root.
    #[error("SPK_ERR_301: Thread root mismatch: claimed {claimed}, computed {computed}")]
    RootMismatch { claimed: Digest, computed: Digest },

    /// A Merkle proof did not replay to the expected root.
    #[error("SPK_ERR_302: Proof does not verify against thread set")]
    InvalidProof,

    /// A state arrived with a lower global transaction count than its predecessor.
    #[error("SPK_ERR_303: Stale state: tx_count_global {next} below {previous}")]
    StaleState { previous: u64, next: u64 },

    /// The custodial ledger counters no longer reconcile with the balance.
    #[error("SPK_ERR_304: Ledger invariant violation: {reason}")]
    LedgerInvariantViolation { reason: String },

    // =================================================================
    // External Failures (4xx)
    // =================================================================
    /// The exchange-rate source could not be reached or errored.
    #[error("SPK_ERR_400: Rate source unavailable: {reason}")]
    RateSourceUnavailable { reason: String },

    /// The latest exchange rate is older than the configured maximum age.
    #[error("SPK_ERR_401: Exchange rate is stale: {age_secs}s old, max {max_age_secs}s")]
    StaleRate { age_secs: i64, max_age_secs: u64 },

    /// The on-chain transaction could not be submitted.
    #[error("SPK_ERR_402: On-chain submission failed: {reason}")]
    SubmissionFailed { reason: String },

    /// The transactional store could not begin or commit.
    #[error("SPK_ERR_403: Store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error (arithmetic overflow, broken invariant).
    #[error("SPK_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("SPK_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("SPK_ERR_902: Configuration error: {0}")]
    Configuration(String),
}

impl SpokeError {
    /// The invariant class this error reports.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AmountBelowMinimum { .. }
            | Self::InsufficientBalance { .. }
            | Self::MissingSignature { .. }
            | Self::PendingOperations
            | Self::InvalidRequest { .. }
            | Self::DuplicateRequest(_) => ErrorKind::Validation,
            Self::ThreadNotFound { .. } | Self::CustodialAccountNotFound(_) => ErrorKind::NotFound,
            Self::SignerMismatch { .. }
            | Self::RootMismatch { .. }
            | Self::InvalidProof
            | Self::StaleState { .. }
            | Self::LedgerInvariantViolation { .. } => ErrorKind::Consistency,
            Self::RateSourceUnavailable { .. }
            | Self::StaleRate { .. }
            | Self::SubmissionFailed { .. }
            | Self::StoreUnavailable { .. } => ErrorKind::External,
            Self::Internal(_) | Self::Serialization(_) | Self::Configuration(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::External
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, SpokeError>;

impl From<serde_json::Error> for SpokeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_balance_display() {
        let err = SpokeError::InsufficientBalance {
            needed: Amount::from(120u64),
            available: Amount::from(100u64),
        };
        let msg = format!("{err}");
        assert!(msg.starts_with("SPK_ERR_101"), "Got: {msg}");
        assert!(msg.contains("120"));
        assert!(msg.contains("100"));
    }

    #[test]
    fn kinds_match_taxonomy() {
        assert_eq!(SpokeError::PendingOperations.kind(), ErrorKind::Validation);
        assert_eq!(
            SpokeError::ThreadNotFound { digest: Digest::ZERO }.kind(),
            ErrorKind::NotFound
        );
        assert_eq!(SpokeError::InvalidProof.kind(), ErrorKind::Consistency);
        assert_eq!(
            SpokeError::SubmissionFailed { reason: "rpc down".into() }.kind(),
            ErrorKind::External
        );
    }

    #[test]
    fn only_external_failures_are_retryable() {
        assert!(SpokeError::RateSourceUnavailable { reason: "timeout".into() }.is_retryable());
        assert!(!SpokeError::InsufficientBalance {
            needed: Amount::one(),
            available: Amount::zero(),
        }
        .is_retryable());
        assert!(!SpokeError::RootMismatch {
            claimed: Digest::ZERO,
            computed: Digest([1u8; 32]),
        }
        .is_retryable());
    }

    #[test]
    fn all_errors_have_spk_err_prefix() {
        let errors: Vec<Box<dyn std::error::Error>> = vec![
            Box::new(SpokeError::PendingOperations),
            Box::new(SpokeError::InvalidProof),
            Box::new(SpokeError::DuplicateRequest(WithdrawalRequestId::new())),
            Box::new(SpokeError::Internal("test".into())),
            Box::new(SpokeError::StaleState { previous: 4, next: 3 }),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(
                msg.starts_with("SPK_ERR_"),
                "Error missing SPK_ERR_ prefix: {msg}"
            );
        }
    }
}
