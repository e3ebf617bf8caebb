//! # spoke-types
//!
//! Shared types, errors, and configuration for the **Spoke** payment-channel
//! consistency core.
//!
//! This crate is the leaf dependency of the workspace: every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`Address`], [`Digest`], [`Signature`], [`WithdrawalRequestId`], [`OnchainTxId`]
//! - **Amounts**: [`Amount`] (256-bit base units) and checked conversions
//! - **Channel model**: [`ChannelState`], [`ThreadState`]
//! - **Custodial model**: [`CustodialBalanceRow`], [`CustodialWithdrawalRow`], [`OnchainTransactionRow`]
//! - **Withdrawal model**: [`WithdrawalRequest`], [`WithdrawalAmounts`], [`WithdrawalAllocation`], [`WithdrawalStatus`]
//! - **Rates**: [`ExchangeRate`]
//! - **Configuration**: [`SettlementConfig`]
//! - **Session**: [`HubSession`], [`SessionProvider`]
//! - **Errors**: [`SpokeError`] with `SPK_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod amount;
pub mod channel;
pub mod config;
pub mod constants;
pub mod custodial;
pub mod error;
pub mod ids;
pub mod rate;
pub mod session;
pub mod withdrawal;

// Re-export all primary types at crate root for ergonomic imports:
//   use spoke_types::{ChannelState, ThreadState, Amount, ...};

pub use amount::*;
pub use channel::*;
pub use config::*;
pub use custodial::*;
pub use error::*;
pub use ids::*;
pub use rate::*;
pub use session::*;
pub use withdrawal::*;

// Constants are accessed via `spoke_types::constants::FOO`
// (not re-exported to avoid name collisions).
