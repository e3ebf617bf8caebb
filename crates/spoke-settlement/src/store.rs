//! Transactional custodial store.
//!
//! A [`CustodialStore`] hands out one transaction per user. The transaction
//! holds that user's row lock from `begin` until it is committed or
//! dropped, so concurrent settlements for the same user are serialized.
//! Writes are staged inside the transaction and become visible only on
//! [`CustodialTx::commit`]; dropping the transaction discards them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use chrono::Utc;
use spoke_types::{
    Address, Amount, CustodialBalanceRow, CustodialWithdrawalRow, NewCustodialWithdrawal,
    OnchainTransactionRequest, OnchainTransactionRow, OnchainTxId, OnchainTxState, Result,
    SpokeError,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// The part of an open store transaction the on-chain submitter writes to.
///
/// Rows staged here commit or roll back together with the rest of the
/// transaction.
pub trait OnchainTxLog {
    fn stage_onchain_transaction(
        &mut self,
        request: OnchainTransactionRequest,
    ) -> Result<OnchainTransactionRow>;
}

/// An open transaction scoped to one user's custodial balance row.
pub trait CustodialTx: OnchainTxLog + Send + Sized {
    fn user(&self) -> Address;

    /// The balance row as seen inside this transaction, staged writes included.
    fn balance(&self) -> &CustodialBalanceRow;

    /// Debit the token balance and count it as withdrawn.
    ///
    /// # Errors
    /// [`SpokeError::InsufficientBalance`] if the balance would go negative.
    fn decrement_token(&mut self, amount: Amount) -> Result<()>;

    /// Stage a ledger row; the store assigns its id.
    fn record_withdrawal(&mut self, new: NewCustodialWithdrawal) -> Result<CustodialWithdrawalRow>;

    /// Make every staged write visible and release the row lock.
    fn commit(self) -> impl Future<Output = Result<()>> + Send;
}

pub trait CustodialStore: Send + Sync {
    type Tx: CustodialTx;

    /// Open a transaction for `user`, waiting for their row lock.
    ///
    /// A user the store has never seen starts from a zero balance row. The
    /// account exists only once such a transaction commits.
    fn begin(&self, user: Address) -> impl Future<Output = Result<Self::Tx>> + Send;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Ledger {
    withdrawals: Vec<CustodialWithdrawalRow>,
    onchain: Vec<OnchainTransactionRow>,
}

// `None` is a row locked by an open transaction for a user with no
// committed account.
type RowCell = Arc<Mutex<Option<CustodialBalanceRow>>>;

#[derive(Default)]
struct Shared {
    rows: StdMutex<HashMap<Address, RowCell>>,
    ledger: StdMutex<Ledger>,
    // Ids come from sequences: a rolled-back transaction leaves a gap.
    next_withdrawal_id: AtomicU64,
    next_onchain_id: AtomicU64,
}

fn lock<T>(mutex: &StdMutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| SpokeError::StoreUnavailable {
        reason: "store mutex poisoned".into(),
    })
}

/// Process-local [`CustodialStore`] with per-user `tokio` row locks.
#[derive(Clone, Default)]
pub struct InMemoryCustodialStore {
    shared: Arc<Shared>,
}

impl InMemoryCustodialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn row_cell(&self, user: Address) -> Result<RowCell> {
        let mut rows = lock(&self.shared.rows)?;
        Ok(Arc::clone(rows.entry(user).or_default()))
    }

    /// Credit funds owed to `user` (a received custodial payment).
    pub async fn credit(&self, user: Address, token: Amount, wei: Amount) -> Result<()> {
        let mut tx = self.begin(user).await?;
        tx.credit(token, wei)?;
        tx.commit().await
    }

    /// Committed balance row for `user`.
    pub async fn balance(&self, user: Address) -> Result<CustodialBalanceRow> {
        let cell = lock(&self.shared.rows)?
            .get(&user)
            .cloned()
            .ok_or(SpokeError::CustodialAccountNotFound(user))?;
        let row = cell.lock().await;
        row.clone().ok_or(SpokeError::CustodialAccountNotFound(user))
    }

    /// Committed ledger rows, oldest first.
    pub fn withdrawals(&self) -> Result<Vec<CustodialWithdrawalRow>> {
        Ok(lock(&self.shared.ledger)?.withdrawals.clone())
    }

    /// Committed on-chain transaction rows, oldest first.
    pub fn onchain_transactions(&self) -> Result<Vec<OnchainTransactionRow>> {
        Ok(lock(&self.shared.ledger)?.onchain.clone())
    }
}

impl CustodialStore for InMemoryCustodialStore {
    type Tx = InMemoryTx;

    async fn begin(&self, user: Address) -> Result<InMemoryTx> {
        let cell = self.row_cell(user)?;
        let row = Arc::clone(&cell).lock_owned().await;
        debug!(%user, existing = row.is_some(), "Row lock acquired");
        Ok(InMemoryTx {
            shared: Arc::clone(&self.shared),
            staged_balance: row.clone().unwrap_or_else(|| CustodialBalanceRow::new(user)),
            cell,
            row,
            staged_withdrawals: Vec::new(),
            staged_onchain: Vec::new(),
        })
    }
}

/// Transaction on an [`InMemoryCustodialStore`].
pub struct InMemoryTx {
    shared: Arc<Shared>,
    cell: RowCell,
    row: OwnedMutexGuard<Option<CustodialBalanceRow>>,
    staged_balance: CustodialBalanceRow,
    staged_withdrawals: Vec<CustodialWithdrawalRow>,
    staged_onchain: Vec<OnchainTransactionRow>,
}

impl InMemoryTx {
    /// Stage a received credit: raises balance and lifetime received totals.
    pub fn credit(&mut self, token: Amount, wei: Amount) -> Result<()> {
        let row = &mut self.staged_balance;
        let user = row.user;
        let overflow = || SpokeError::LedgerInvariantViolation {
            reason: format!("credit overflows balance of {user}"),
        };
        let balance_token = row.balance_token.checked_add(token).ok_or_else(overflow)?;
        let balance_wei = row.balance_wei.checked_add(wei).ok_or_else(overflow)?;
        let received_token = row.total_received_token.checked_add(token).ok_or_else(overflow)?;
        let received_wei = row.total_received_wei.checked_add(wei).ok_or_else(overflow)?;
        row.balance_token = balance_token;
        row.balance_wei = balance_wei;
        row.total_received_token = received_token;
        row.total_received_wei = received_wei;
        Ok(())
    }
}

impl OnchainTxLog for InMemoryTx {
    fn stage_onchain_transaction(
        &mut self,
        request: OnchainTransactionRequest,
    ) -> Result<OnchainTransactionRow> {
        let id = OnchainTxId(self.shared.next_onchain_id.fetch_add(1, Ordering::Relaxed) + 1);
        let row = OnchainTransactionRow {
            id,
            from: request.from,
            to: request.to,
            value: request.value,
            meta: request.meta,
            state: OnchainTxState::New,
            created_at: Utc::now(),
        };
        self.staged_onchain.push(row.clone());
        Ok(row)
    }
}

impl CustodialTx for InMemoryTx {
    fn user(&self) -> Address {
        self.staged_balance.user
    }

    fn balance(&self) -> &CustodialBalanceRow {
        &self.staged_balance
    }

    fn decrement_token(&mut self, amount: Amount) -> Result<()> {
        let row = &mut self.staged_balance;
        let balance_token =
            row.balance_token
                .checked_sub(amount)
                .ok_or(SpokeError::InsufficientBalance {
                    needed: amount,
                    available: row.balance_token,
                })?;
        let total_withdrawn_token = row.total_withdrawn_token.checked_add(amount).ok_or_else(|| {
            SpokeError::LedgerInvariantViolation {
                reason: format!("withdrawn total overflows for {}", row.user),
            }
        })?;
        row.balance_token = balance_token;
        row.total_withdrawn_token = total_withdrawn_token;
        Ok(())
    }

    fn record_withdrawal(&mut self, new: NewCustodialWithdrawal) -> Result<CustodialWithdrawalRow> {
        let user = self.staged_balance.user;
        if new.user != user {
            return Err(SpokeError::LedgerInvariantViolation {
                reason: format!("ledger row for {} staged in transaction of {user}", new.user),
            });
        }
        let id = self.shared.next_withdrawal_id.fetch_add(1, Ordering::Relaxed) + 1;
        let row = CustodialWithdrawalRow::from_new(id, new, Utc::now());
        self.staged_withdrawals.push(row.clone());
        Ok(row)
    }

    async fn commit(mut self) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        // Take the ledger lock first so a failure here leaves the row untouched.
        let mut ledger = lock(&shared.ledger)?;
        debug!(
            user = %self.staged_balance.user,
            withdrawals = self.staged_withdrawals.len(),
            onchain = self.staged_onchain.len(),
            "Committing custodial transaction"
        );
        ledger.withdrawals.append(&mut self.staged_withdrawals);
        ledger.onchain.append(&mut self.staged_onchain);
        *self.row = Some(self.staged_balance.clone());
        Ok(())
    }
}

impl Drop for InMemoryTx {
    fn drop(&mut self) {
        if self.row.is_some() {
            return;
        }
        // Nothing was ever committed for this user. Unless someone else is
        // waiting on the cell (map, guard and `self.cell` are ours), forget
        // it so a failed first request does not create an account.
        let Ok(mut rows) = self.shared.rows.lock() else {
            return;
        };
        let user = self.staged_balance.user;
        let ours = rows.get(&user).is_some_and(|c| Arc::ptr_eq(c, &self.cell));
        if ours && Arc::strong_count(&self.cell) == 3 {
            rows.remove(&user);
            debug!(%user, "Released row of uncommitted account");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use spoke_types::OnchainTxMeta;

    fn user() -> Address {
        Address::repeat(0xAA)
    }

    fn new_withdrawal(onchain_transaction_id: OnchainTxId) -> NewCustodialWithdrawal {
        NewCustodialWithdrawal {
            user: user(),
            recipient: Address::repeat(0xBB),
            requested_token: Amount::from(10u64),
            exchange_rate: Decimal::new(2, 0),
            sent_wei: Amount::from(5u64),
            remainder_token: Amount::zero(),
            onchain_transaction_id,
        }
    }

    fn transfer() -> OnchainTransactionRequest {
        OnchainTransactionRequest {
            from: Address::repeat(0x01),
            to: Address::repeat(0xBB),
            value: Amount::from(5u64),
            meta: OnchainTxMeta {
                reason: "test".into(),
            },
        }
    }

    #[tokio::test]
    async fn unknown_account_is_not_found() {
        let store = InMemoryCustodialStore::new();
        let err = store.balance(user()).await.unwrap_err();
        assert!(matches!(err, SpokeError::CustodialAccountNotFound(a) if a == user()));
    }

    #[tokio::test]
    async fn credit_is_visible_after_commit() {
        let store = InMemoryCustodialStore::new();
        store.credit(user(), Amount::from(100u64), Amount::one()).await.unwrap();
        let row = store.balance(user()).await.unwrap();
        assert_eq!(row.balance_token, Amount::from(100u64));
        assert_eq!(row.total_received_token, Amount::from(100u64));
        assert_eq!(row.balance_wei, Amount::one());
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = InMemoryCustodialStore::new();
        store.credit(user(), Amount::from(100u64), Amount::zero()).await.unwrap();
        {
            let mut tx = store.begin(user()).await.unwrap();
            tx.decrement_token(Amount::from(40u64)).unwrap();
            let onchain = tx.stage_onchain_transaction(transfer()).unwrap();
            tx.record_withdrawal(new_withdrawal(onchain.id)).unwrap();
            assert_eq!(tx.balance().balance_token, Amount::from(60u64));
        }
        assert_eq!(store.balance(user()).await.unwrap().balance_token, Amount::from(100u64));
        assert!(store.withdrawals().unwrap().is_empty());
        assert!(store.onchain_transactions().unwrap().is_empty());
    }

    #[tokio::test]
    async fn commit_applies_every_staged_write() {
        let store = InMemoryCustodialStore::new();
        store.credit(user(), Amount::from(100u64), Amount::zero()).await.unwrap();
        let mut tx = store.begin(user()).await.unwrap();
        tx.decrement_token(Amount::from(40u64)).unwrap();
        let onchain = tx.stage_onchain_transaction(transfer()).unwrap();
        let recorded = tx.record_withdrawal(new_withdrawal(onchain.id)).unwrap();
        tx.commit().await.unwrap();

        let row = store.balance(user()).await.unwrap();
        assert_eq!(row.balance_token, Amount::from(60u64));
        assert_eq!(row.total_withdrawn_token, Amount::from(40u64));
        assert_eq!(store.withdrawals().unwrap(), vec![recorded]);
        let txs = store.onchain_transactions().unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].state, OnchainTxState::New);
    }

    #[tokio::test]
    async fn decrement_below_zero_is_refused() {
        let store = InMemoryCustodialStore::new();
        store.credit(user(), Amount::from(10u64), Amount::zero()).await.unwrap();
        let mut tx = store.begin(user()).await.unwrap();
        let err = tx.decrement_token(Amount::from(11u64)).unwrap_err();
        assert!(matches!(err, SpokeError::InsufficientBalance { .. }));
        assert_eq!(tx.balance().balance_token, Amount::from(10u64));
    }

    #[tokio::test]
    async fn foreign_ledger_row_is_refused() {
        let store = InMemoryCustodialStore::new();
        let mut tx = store.begin(Address::repeat(0x99)).await.unwrap();
        let err = tx.record_withdrawal(new_withdrawal(OnchainTxId(1))).unwrap_err();
        assert!(matches!(err, SpokeError::LedgerInvariantViolation { .. }));
    }

    #[tokio::test]
    async fn second_transaction_waits_for_row_lock() {
        let store = InMemoryCustodialStore::new();
        let tx = store.begin(user()).await.unwrap();

        let contender = {
            let store = store.clone();
            tokio::spawn(async move { store.begin(user()).await.map(|_| ()) })
        };
        tokio::task::yield_now().await;
        assert!(!contender.is_finished());

        drop(tx);
        contender.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn failed_first_transaction_creates_no_account() {
        let store = InMemoryCustodialStore::new();
        {
            let mut tx = store.begin(user()).await.unwrap();
            assert_eq!(tx.balance().balance_token, Amount::zero());
            let err = tx.decrement_token(Amount::one()).unwrap_err();
            assert!(matches!(err, SpokeError::InsufficientBalance { .. }));
        }
        let err = store.balance(user()).await.unwrap_err();
        assert!(matches!(err, SpokeError::CustodialAccountNotFound(_)));
        assert!(store.shared.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn uncommitted_row_survives_while_contended() {
        let store = InMemoryCustodialStore::new();
        let tx = store.begin(user()).await.unwrap();
        let contender = {
            let store = store.clone();
            tokio::spawn(async move {
                let tx = store.begin(user()).await?;
                tx.commit().await
            })
        };
        tokio::task::yield_now().await;

        drop(tx);
        contender.await.unwrap().unwrap();
        assert_eq!(store.balance(user()).await.unwrap().balance_token, Amount::zero());
    }

    #[tokio::test]
    async fn committed_account_survives_failed_transaction() {
        let store = InMemoryCustodialStore::new();
        store.credit(user(), Amount::from(5u64), Amount::zero()).await.unwrap();
        {
            let mut tx = store.begin(user()).await.unwrap();
            tx.decrement_token(Amount::from(6u64)).unwrap_err();
        }
        assert_eq!(store.balance(user()).await.unwrap().balance_token, Amount::from(5u64));
    }
}
