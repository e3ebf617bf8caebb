//! Custodial ledger audit.
//!
//! Invariant enforced on every balance row, per asset:
//! ```text
//! balance == total_received - total_withdrawn - sent
//! ```
//!
//! A violation means the ledger and the balance disagree; settlement must
//! stop for that user until it is reconciled.

use spoke_types::{Amount, CustodialBalanceRow, Result, SpokeError};
use tracing::error;

pub struct CustodialAudit;

impl CustodialAudit {
    /// Check one balance row.
    pub fn verify(row: &CustodialBalanceRow) -> Result<()> {
        check(
            row,
            "token",
            row.balance_token,
            row.total_received_token,
            row.total_withdrawn_token,
            row.sent_token,
        )?;
        check(
            row,
            "wei",
            row.balance_wei,
            row.total_received_wei,
            row.total_withdrawn_wei,
            row.sent_wei,
        )
    }

    /// Check every row, stopping at the first violation.
    pub fn verify_all<'a>(rows: impl IntoIterator<Item = &'a CustodialBalanceRow>) -> Result<()> {
        rows.into_iter().try_for_each(Self::verify)
    }
}

fn check(
    row: &CustodialBalanceRow,
    asset: &str,
    balance: Amount,
    received: Amount,
    withdrawn: Amount,
    sent: Amount,
) -> Result<()> {
    let expected = received
        .checked_sub(withdrawn)
        .and_then(|rest| rest.checked_sub(sent));
    if expected == Some(balance) {
        return Ok(());
    }
    let reason = format!(
        "{} {asset}: balance {balance} != received {received} - withdrawn {withdrawn} - sent {sent}",
        row.user
    );
    error!(user = %row.user, asset, %reason, "Custodial ledger invariant violated");
    Err(SpokeError::LedgerInvariantViolation { reason })
}
