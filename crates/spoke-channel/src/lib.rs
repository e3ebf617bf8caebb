//! # spoke-channel
//!
//! **Pure channel policy for Spoke.**
//!
//! The hub and every client run these functions on the same inputs and
//! must reach the same answer, so they take plain records and return plain
//! records:
//!
//! - **Allocation**: split a withdrawal between the custodial pool and the channel
//! - **Pending guard**: refuse new operations while an on-chain change is unconfirmed
//! - **Balance views**: a user's spendable total across both pools

pub mod allocator;
pub mod balances;
pub mod pending;

pub use allocator::{allocate, allocate_request};
pub use balances::custodial_and_channel_balance;
pub use pending::{
    ensure_no_pending_ops, ensure_tx_count_progression, has_pending_ops,
    latest_state_without_pending_ops,
};
