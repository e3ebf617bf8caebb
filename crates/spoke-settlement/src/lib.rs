//! # spoke-settlement
//!
//! **Settlement plane**: custodial withdrawals, rate conversion, on-chain
//! submission, and ledger audit.
//!
//! ## Architecture
//!
//! [`CustodialSettlementService`] turns a custodial token balance into an
//! ether transfer:
//! 1. Validates the amount and the request id (no double-settlement)
//! 2. Locks the user's balance row inside a store transaction
//! 3. Converts token to wei at a fresh exchange rate
//! 4. Stages the on-chain transfer in the same transaction
//! 5. Debits the balance, records the ledger row and commits
//!
//! The store, rate source and submitter are traits with in-memory
//! implementations for tests and embedding.

pub mod audit;
pub mod conversion;
pub mod idempotency;
pub mod onchain;
pub mod rates;
pub mod service;
pub mod store;

pub use audit::CustodialAudit;
pub use conversion::{WeiConversion, token_to_wei};
pub use idempotency::IdempotencyGuard;
pub use onchain::{InMemorySubmitter, OnchainSubmitter};
pub use rates::{FixedRateSource, RateSource, UnavailableRateSource};
pub use service::{CreateCustodialWithdrawalArgs, CustodialSettlementService};
pub use store::{CustodialStore, CustodialTx, InMemoryCustodialStore, InMemoryTx, OnchainTxLog};
