//! Withdrawal request and allocation records.
//!
//! Clients may describe a withdrawal in two shapes: the *split* form used by
//! the channel update protocol (how much to sell to the hub vs. withdraw
//! directly) or the *succinct* form (a plain total per asset). Both are
//! normalized to [`WithdrawalAmounts`] before any policy runs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Address, Amount, Result, SpokeError};

/// A user's withdrawal request, in either accepted shape.
///
/// `exchange_rate` is informational (the rate the client saw); the
/// allocator never reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "camelCase")]
pub enum WithdrawalRequest {
    #[serde(rename_all = "camelCase")]
    Split {
        tokens_to_sell: Amount,
        withdrawal_token_user: Amount,
        wei_to_sell: Amount,
        withdrawal_wei_user: Amount,
        exchange_rate: String,
        recipient: Option<Address>,
    },
    #[serde(rename_all = "camelCase")]
    Succinct {
        amount_token: Amount,
        amount_wei: Amount,
        exchange_rate: String,
        recipient: Option<Address>,
    },
}

impl WithdrawalRequest {
    #[must_use]
    pub fn exchange_rate(&self) -> &str {
        match self {
            Self::Split { exchange_rate, .. } | Self::Succinct { exchange_rate, .. } => {
                exchange_rate
            }
        }
    }

    #[must_use]
    pub fn recipient(&self) -> Option<Address> {
        match self {
            Self::Split { recipient, .. } | Self::Succinct { recipient, .. } => *recipient,
        }
    }
}

/// Canonical per-asset totals of a withdrawal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalAmounts {
    pub amount_token: Amount,
    pub amount_wei: Amount,
}

impl TryFrom<&WithdrawalRequest> for WithdrawalAmounts {
    type Error = SpokeError;

    fn try_from(request: &WithdrawalRequest) -> Result<Self> {
        match request {
            WithdrawalRequest::Split {
                tokens_to_sell,
                withdrawal_token_user,
                wei_to_sell,
                withdrawal_wei_user,
                ..
            } => {
                let amount_token = tokens_to_sell
                    .checked_add(*withdrawal_token_user)
                    .ok_or_else(|| SpokeError::InvalidRequest {
                        reason: "token withdrawal total overflows".into(),
                    })?;
                let amount_wei = wei_to_sell.checked_add(*withdrawal_wei_user).ok_or_else(|| {
                    SpokeError::InvalidRequest {
                        reason: "wei withdrawal total overflows".into(),
                    }
                })?;
                Ok(Self {
                    amount_token,
                    amount_wei,
                })
            }
            WithdrawalRequest::Succinct {
                amount_token,
                amount_wei,
                ..
            } => Ok(Self {
                amount_token: *amount_token,
                amount_wei: *amount_wei,
            }),
        }
    }
}

/// How a withdrawal is split between the custodial pool and the channel.
///
/// Each custodial/channel pair sums to the requested amount of that asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalAllocation {
    pub custodial_token_withdrawal: Amount,
    pub channel_token_withdrawal: Amount,
    pub custodial_wei_withdrawal: Amount,
    pub channel_wei_withdrawal: Amount,
}

impl WithdrawalAllocation {
    #[must_use]
    pub fn total_token(&self) -> Amount {
        self.custodial_token_withdrawal + self.channel_token_withdrawal
    }

    #[must_use]
    pub fn total_wei(&self) -> Amount {
        self.custodial_wei_withdrawal + self.channel_wei_withdrawal
    }

    /// Nothing is drawn from the custodial pool; the request builder can
    /// skip the custodial leg entirely.
    #[must_use]
    pub fn custodial_is_empty(&self) -> bool {
        self.custodial_token_withdrawal.is_zero() && self.custodial_wei_withdrawal.is_zero()
    }
}

impl fmt::Display for WithdrawalAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "token(custodial={}, channel={}) wei(custodial={}, channel={})",
            self.custodial_token_withdrawal,
            self.channel_token_withdrawal,
            self.custodial_wei_withdrawal,
            self.channel_wei_withdrawal
        )
    }
}

/// A per-asset amount pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub amount_wei: Amount,
    pub amount_token: Amount,
}

/// Lifecycle of a custodial withdrawal on the hub.
///
/// ```text
///   REQUESTED ──▶ VALIDATED ──▶ SUBMITTED ──▶ RECORDED
///       │             │             │
///       └─────────────┴─────────────┴──────▶ FAILED
/// ```
///
/// Transitions are monotonic; `Recorded` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    /// Received, nothing checked yet.
    Requested,
    /// Amount and balance checks passed; rate converted.
    Validated,
    /// On-chain transfer queued; a transaction id exists.
    Submitted,
    /// Balance decremented and ledger row committed.
    Recorded,
    /// Aborted; nothing was committed.
    Failed,
}

impl WithdrawalStatus {
    /// Can a withdrawal move from this status to `target`?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Requested, Self::Validated | Self::Failed)
                | (Self::Validated, Self::Submitted | Self::Failed)
                | (Self::Submitted, Self::Recorded | Self::Failed)
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Recorded | Self::Failed)
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "REQUESTED"),
            Self::Validated => write!(f, "VALIDATED"),
            Self::Submitted => write!(f, "SUBMITTED"),
            Self::Recorded => write!(f, "RECORDED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}
