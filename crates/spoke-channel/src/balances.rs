//! Spendable balance across the custodial pool and the channel.

use spoke_types::{ChannelState, CustodialBalanceRow, Payment, Result, SpokeError};

/// `custodial.balance + channel.balance_*_user`, per asset.
pub fn custodial_and_channel_balance(
    channel: &ChannelState,
    custodial: &CustodialBalanceRow,
) -> Result<Payment> {
    let overflow = || SpokeError::Internal(format!("balance overflow for {}", custodial.user));
    Ok(Payment {
        amount_wei: custodial
            .balance_wei
            .checked_add(channel.balance_wei_user)
            .ok_or_else(overflow)?,
        amount_token: custodial
            .balance_token
            .checked_add(channel.balance_token_user)
            .ok_or_else(overflow)?,
    })
}
