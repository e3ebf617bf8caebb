//! Custodial-first withdrawal allocation.
//!
//! Funds the hub holds custodially are paid out before anything is drawn
//! from the channel. Token and wei are allocated independently:
//!
//! ```text
//!   custodial = min(requested, custodial balance)
//!   channel   = requested - custodial
//! ```
//!
//! Whether the channel can cover its share is the state-update builder's
//! concern, not this module's.

use spoke_types::{
    Amount, CustodialBalanceRow, Result, WithdrawalAllocation, WithdrawalAmounts,
    WithdrawalRequest,
};
use tracing::debug;

/// Allocate already-normalized amounts against a custodial balance.
#[must_use]
pub fn allocate(amounts: &WithdrawalAmounts, custodial: &CustodialBalanceRow) -> WithdrawalAllocation {
    let (custodial_token_withdrawal, channel_token_withdrawal) =
        split(amounts.amount_token, custodial.balance_token);
    let (custodial_wei_withdrawal, channel_wei_withdrawal) =
        split(amounts.amount_wei, custodial.balance_wei);
    WithdrawalAllocation {
        custodial_token_withdrawal,
        channel_token_withdrawal,
        custodial_wei_withdrawal,
        channel_wei_withdrawal,
    }
}

/// Normalize `request` and allocate it.
///
/// Only fails if the split form's components overflow when summed.
pub fn allocate_request(
    request: &WithdrawalRequest,
    custodial: &CustodialBalanceRow,
) -> Result<WithdrawalAllocation> {
    let amounts = WithdrawalAmounts::try_from(request)?;
    let allocation = allocate(&amounts, custodial);
    debug!(user = %custodial.user, %allocation, "Allocated withdrawal");
    Ok(allocation)
}

fn split(requested: Amount, available: Amount) -> (Amount, Amount) {
    let custodial = requested.min(available);
    (custodial, requested - custodial)
}
