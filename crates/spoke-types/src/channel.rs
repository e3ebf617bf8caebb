//! Channel and thread state records.
//!
//! A [`ChannelState`] is the co-signed balance sheet between one user and
//! the hub. Open [`ThreadState`]s are committed into it through
//! `thread_root` / `thread_count`; their balances fold back into the channel
//! when the thread closes.

use serde::{Deserialize, Serialize};

use crate::{Address, Amount, Digest, Signature};

/// One co-signed state of a user/hub channel.
///
/// `tx_count_global` is monotonic across accepted states. The eight
/// `pending_*` fields describe an on-chain deposit or withdrawal that has
/// been proposed but not yet confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelState {
    /// The channel manager contract this state is bound to.
    pub contract_address: Address,
    pub user: Address,
    /// Recipient of the user's share on withdrawal.
    pub recipient: Address,

    pub balance_wei_hub: Amount,
    pub balance_wei_user: Amount,
    pub balance_token_hub: Amount,
    pub balance_token_user: Amount,

    pub pending_deposit_wei_hub: Amount,
    pub pending_deposit_wei_user: Amount,
    pub pending_deposit_token_hub: Amount,
    pub pending_deposit_token_user: Amount,
    pub pending_withdrawal_wei_hub: Amount,
    pub pending_withdrawal_wei_user: Amount,
    pub pending_withdrawal_token_hub: Amount,
    pub pending_withdrawal_token_user: Amount,

    /// Off-chain update counter; never decreases.
    pub tx_count_global: u64,
    /// On-chain update counter.
    pub tx_count_chain: u64,

    /// Merkle root over every open thread.
    pub thread_root: Digest,
    pub thread_count: u64,
    /// Block timestamp after which a pending on-chain op may no longer execute.
    pub timeout: u64,

    pub sig_hub: Option<Signature>,
    pub sig_user: Option<Signature>,
}

impl ChannelState {
    /// All eight pending-operation amounts, deposits first.
    #[must_use]
    pub fn pending_amounts(&self) -> [Amount; 8] {
        [
            self.pending_deposit_wei_hub,
            self.pending_deposit_wei_user,
            self.pending_deposit_token_hub,
            self.pending_deposit_token_user,
            self.pending_withdrawal_wei_hub,
            self.pending_withdrawal_wei_user,
            self.pending_withdrawal_token_hub,
            self.pending_withdrawal_token_user,
        ]
    }
}

/// One co-signed state of a thread between two channel users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadState {
    pub contract_address: Address,
    pub sender: Address,
    pub receiver: Address,
    /// Distinguishes successive threads between the same two parties.
    pub thread_id: u64,

    pub balance_wei_sender: Amount,
    pub balance_wei_receiver: Amount,
    pub balance_token_sender: Amount,
    pub balance_token_receiver: Amount,

    /// Thread-local update counter.
    pub tx_count: u64,

    /// Signature of the sender over the thread state hash.
    pub sig_a: Option<Signature>,
}

#[cfg(any(test, feature = "test-helpers"))]
impl ChannelState {
    /// A zeroed, unsigned state between the given user and contract.
    #[must_use]
    pub fn empty(contract_address: Address, user: Address) -> Self {
        Self {
            contract_address,
            user,
            recipient: user,
            balance_wei_hub: Amount::zero(),
            balance_wei_user: Amount::zero(),
            balance_token_hub: Amount::zero(),
            balance_token_user: Amount::zero(),
            pending_deposit_wei_hub: Amount::zero(),
            pending_deposit_wei_user: Amount::zero(),
            pending_deposit_token_hub: Amount::zero(),
            pending_deposit_token_user: Amount::zero(),
            pending_withdrawal_wei_hub: Amount::zero(),
            pending_withdrawal_wei_user: Amount::zero(),
            pending_withdrawal_token_hub: Amount::zero(),
            pending_withdrawal_token_user: Amount::zero(),
            tx_count_global: 0,
            tx_count_chain: 0,
            thread_root: Digest::ZERO,
            thread_count: 0,
            timeout: 0,
            sig_hub: None,
            sig_user: None,
        }
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl ThreadState {
    /// An unsigned thread with the given sender-side balances and zeroed
    /// receiver balances, under fixed test parties.
    #[must_use]
    pub fn dummy(balance_wei_sender: u64, balance_token_sender: u64) -> Self {
        Self {
            contract_address: Address::repeat(0xCC),
            sender: Address::repeat(0xAA),
            receiver: Address::repeat(0xBB),
            thread_id: 1,
            balance_wei_sender: Amount::from(balance_wei_sender),
            balance_wei_receiver: Amount::zero(),
            balance_token_sender: Amount::from(balance_token_sender),
            balance_token_receiver: Amount::zero(),
            tx_count: 0,
            sig_a: None,
        }
    }
}
