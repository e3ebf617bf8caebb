//! Pending-operation guard for channel states.
//!
//! While a proposed deposit or withdrawal is waiting for on-chain
//! confirmation, its confirmation can still change the balances a new
//! off-chain update would build on. New withdrawals, deposits and
//! exchanges are refused until every pending amount is back to zero.

use spoke_types::{ChannelState, Result, SpokeError};
use tracing::warn;

/// True iff any pending deposit or withdrawal amount is nonzero.
#[must_use]
pub fn has_pending_ops(state: &ChannelState) -> bool {
    state.pending_amounts().iter().any(|amount| !amount.is_zero())
}

/// Refuse to build on a state with unconfirmed on-chain operations.
pub fn ensure_no_pending_ops(state: &ChannelState) -> Result<()> {
    if has_pending_ops(state) {
        warn!(
            user = %state.user,
            tx_count_global = state.tx_count_global,
            "Refusing update: channel has pending operations"
        );
        return Err(SpokeError::PendingOperations);
    }
    Ok(())
}

/// `next` may not carry a lower global transaction count than `previous`.
pub fn ensure_tx_count_progression(previous: &ChannelState, next: &ChannelState) -> Result<()> {
    if next.tx_count_global < previous.tx_count_global {
        return Err(SpokeError::StaleState {
            previous: previous.tx_count_global,
            next: next.tx_count_global,
        });
    }
    Ok(())
}

/// The most recent state (by `tx_count_global`) with no pending operations.
#[must_use]
pub fn latest_state_without_pending_ops<'a, I>(states: I) -> Option<&'a ChannelState>
where
    I: IntoIterator<Item = &'a ChannelState>,
{
    states
        .into_iter()
        .filter(|state| !has_pending_ops(state))
        .max_by_key(|state| state.tx_count_global)
}
