//! Custodial ledger types.
//!
//! The hub holds a pooled custodial balance per user: funds owed to them
//! that have not yet been pushed into their on-chain channel. Balances move
//! only inside a settlement transaction, and every withdrawal leaves a
//! [`CustodialWithdrawalRow`] behind for audit.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, Amount, OnchainTxId};

/// Per-user custodial balance plus lifetime counters.
///
/// Invariant, per asset: `balance = total_received - total_withdrawn - sent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustodialBalanceRow {
    pub user: Address,
    pub balance_token: Amount,
    pub balance_wei: Amount,
    pub total_received_token: Amount,
    pub total_received_wei: Amount,
    pub total_withdrawn_token: Amount,
    pub total_withdrawn_wei: Amount,
    pub sent_token: Amount,
    pub sent_wei: Amount,
}

impl CustodialBalanceRow {
    /// A user with nothing owed.
    #[must_use]
    pub fn new(user: Address) -> Self {
        Self {
            user,
            balance_token: Amount::zero(),
            balance_wei: Amount::zero(),
            total_received_token: Amount::zero(),
            total_received_wei: Amount::zero(),
            total_withdrawn_token: Amount::zero(),
            total_withdrawn_wei: Amount::zero(),
            sent_token: Amount::zero(),
            sent_wei: Amount::zero(),
        }
    }

    /// A row whose balances were all received (nothing withdrawn or sent yet).
    #[must_use]
    pub fn with_received(user: Address, token: Amount, wei: Amount) -> Self {
        Self {
            balance_token: token,
            balance_wei: wei,
            total_received_token: token,
            total_received_wei: wei,
            ..Self::new(user)
        }
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.balance_token.is_zero() && self.balance_wei.is_zero()
    }
}

/// Lifecycle of an on-chain transaction row staged by the submitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnchainTxState {
    /// Queued; the broadcaster picks it up once the enclosing store
    /// transaction commits.
    New,
    Submitted,
    Confirmed,
    Failed,
}

/// Free-form metadata carried with an on-chain transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnchainTxMeta {
    pub reason: String,
}

/// An outgoing value transfer the hub wants executed on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnchainTransactionRequest {
    pub from: Address,
    pub to: Address,
    pub value: Amount,
    pub meta: OnchainTxMeta,
}

/// A queued on-chain transaction as recorded in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnchainTransactionRow {
    pub id: OnchainTxId,
    pub from: Address,
    pub to: Address,
    pub value: Amount,
    pub meta: OnchainTxMeta,
    pub state: OnchainTxState,
    pub created_at: DateTime<Utc>,
}

/// Everything needed to insert a ledger row; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCustodialWithdrawal {
    pub user: Address,
    pub recipient: Address,
    pub requested_token: Amount,
    pub exchange_rate: Decimal,
    pub sent_wei: Amount,
    /// Token value the wei transfer did not cover because of floor rounding.
    pub remainder_token: Amount,
    pub onchain_transaction_id: OnchainTxId,
}

/// A recorded custodial withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustodialWithdrawalRow {
    pub id: u64,
    pub user: Address,
    pub recipient: Address,
    pub requested_token: Amount,
    pub exchange_rate: Decimal,
    pub sent_wei: Amount,
    pub remainder_token: Amount,
    pub onchain_transaction_id: OnchainTxId,
    pub created_at: DateTime<Utc>,
}

impl CustodialWithdrawalRow {
    #[must_use]
    pub fn from_new(id: u64, new: NewCustodialWithdrawal, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            user: new.user,
            recipient: new.recipient,
            requested_token: new.requested_token,
            exchange_rate: new.exchange_rate,
            sent_wei: new.sent_wei,
            remainder_token: new.remainder_token,
            onchain_transaction_id: new.onchain_transaction_id,
            created_at,
        }
    }
}
