//! Custodial withdrawal settlement.
//!
//! One request runs through:
//! 1. Validate the amount against the configured minimum
//! 2. Open the user's store transaction and check the custodial balance
//! 3. Fetch a fresh rate and convert the token amount to wei
//! 4. Stage the on-chain transfer from the hot wallet to the recipient
//! 5. Debit the balance, stage the ledger row, audit the row, and commit
//!
//! Steps 2 to 5 run inside one store transaction. The user's row lock is
//! held across the awaited submission, and an error or a dropped future at
//! any point discards every staged write.

use std::sync::{Mutex, MutexGuard};

use spoke_types::constants::CUSTODIAL_WITHDRAWAL_REASON;
use spoke_types::{
    Address, Amount, CustodialWithdrawalRow, NewCustodialWithdrawal, OnchainTransactionRequest,
    OnchainTxMeta, Result, SettlementConfig, SpokeError, WithdrawalRequestId, WithdrawalStatus,
};
use tracing::{debug, info, warn};

use crate::audit::CustodialAudit;
use crate::conversion::token_to_wei;
use crate::idempotency::IdempotencyGuard;
use crate::onchain::OnchainSubmitter;
use crate::rates::RateSource;
use crate::store::{CustodialStore, CustodialTx};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCustodialWithdrawalArgs {
    pub user: Address,
    pub recipient: Address,
    pub amount_token: Amount,
    /// Caller-chosen id; a recorded id cannot be settled again.
    pub request_id: Option<WithdrawalRequestId>,
}

/// Hub-side service paying out custodial token balances as ether.
pub struct CustodialSettlementService<S, R, T> {
    config: SettlementConfig,
    store: S,
    rates: R,
    submitter: T,
    idempotency: Mutex<IdempotencyGuard>,
}

impl<S, R, T> CustodialSettlementService<S, R, T>
where
    S: CustodialStore,
    R: RateSource,
    T: OnchainSubmitter,
{
    pub fn new(config: SettlementConfig, store: S, rates: R, submitter: T) -> Result<Self> {
        config.validate()?;
        let idempotency = Mutex::new(IdempotencyGuard::new(config.idempotency_cache_size));
        Ok(Self {
            config,
            store,
            rates,
            submitter,
            idempotency,
        })
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn rates(&self) -> &R {
        &self.rates
    }

    pub fn submitter(&self) -> &T {
        &self.submitter
    }

    /// Pay `amount_token` of the user's custodial balance to `recipient`.
    ///
    /// # Errors
    /// - `DuplicateRequest` if `request_id` was already recorded or is in flight
    /// - `AmountBelowMinimum`, `InsufficientBalance` on validation
    /// - `RateSourceUnavailable`, `StaleRate`, `SubmissionFailed`,
    ///   `StoreUnavailable` from collaborators
    pub async fn create_custodial_withdrawal(
        &self,
        args: CreateCustodialWithdrawalArgs,
    ) -> Result<CustodialWithdrawalRow> {
        let claim = match args.request_id {
            Some(id) => Some(Claim::new(&self.idempotency, id)?),
            None => None,
        };

        let mut progress = Progress::new(&args);
        let outcome = self.settle(&args, &mut progress).await;
        match &outcome {
            Ok(row) => {
                if let Some(claim) = claim {
                    claim.recorded();
                }
                info!(
                    user = %args.user,
                    withdrawal_id = row.id,
                    onchain_tx = %row.onchain_transaction_id,
                    sent_wei = %row.sent_wei,
                    remainder_token = %row.remainder_token,
                    "Custodial withdrawal recorded"
                );
            }
            Err(err) => progress.fail(err),
        }
        outcome
    }

    async fn settle(
        &self,
        args: &CreateCustodialWithdrawalArgs,
        progress: &mut Progress,
    ) -> Result<CustodialWithdrawalRow> {
        let minimum = self.config.min_withdrawal_token;
        if args.amount_token < minimum {
            return Err(SpokeError::AmountBelowMinimum {
                requested: args.amount_token,
                minimum,
            });
        }

        let mut tx = self.store.begin(args.user).await?;
        let available = tx.balance().balance_token;
        if available < args.amount_token {
            return Err(SpokeError::InsufficientBalance {
                needed: args.amount_token,
                available,
            });
        }

        let rate = self.rates.latest_rate().await?;
        let age_secs = rate.age_secs(chrono::Utc::now());
        if age_secs > i64::try_from(self.config.max_rate_age_secs).unwrap_or(i64::MAX) {
            return Err(SpokeError::StaleRate {
                age_secs,
                max_age_secs: self.config.max_rate_age_secs,
            });
        }
        let conversion = token_to_wei(args.amount_token, rate.usd_per_eth)?;
        debug!(
            user = %args.user,
            usd_per_eth = %rate.usd_per_eth,
            sent_wei = %conversion.sent_wei,
            remainder_token = %conversion.remainder_token,
            "Converted withdrawal"
        );
        progress.advance(WithdrawalStatus::Validated)?;

        let request = OnchainTransactionRequest {
            from: self.config.hot_wallet_address,
            to: args.recipient,
            value: conversion.sent_wei,
            meta: OnchainTxMeta {
                reason: CUSTODIAL_WITHDRAWAL_REASON.to_string(),
            },
        };
        let onchain = self.submitter.send(&mut tx, request).await?;
        progress.advance(WithdrawalStatus::Submitted)?;

        tx.decrement_token(args.amount_token)?;
        let row = tx.record_withdrawal(NewCustodialWithdrawal {
            user: args.user,
            recipient: args.recipient,
            requested_token: args.amount_token,
            exchange_rate: rate.usd_per_eth,
            sent_wei: conversion.sent_wei,
            remainder_token: conversion.remainder_token,
            onchain_transaction_id: onchain.id,
        })?;
        CustodialAudit::verify(tx.balance())?;
        tx.commit().await?;
        progress.advance(WithdrawalStatus::Recorded)?;
        Ok(row)
    }
}

/// Status of one request as it moves through settlement.
struct Progress {
    user: Address,
    amount_token: Amount,
    request_id: Option<WithdrawalRequestId>,
    status: WithdrawalStatus,
}

impl Progress {
    fn new(args: &CreateCustodialWithdrawalArgs) -> Self {
        info!(
            user = %args.user,
            recipient = %args.recipient,
            amount_token = %args.amount_token,
            request_id = ?args.request_id,
            "Custodial withdrawal requested"
        );
        Self {
            user: args.user,
            amount_token: args.amount_token,
            request_id: args.request_id,
            status: WithdrawalStatus::Requested,
        }
    }

    fn advance(&mut self, next: WithdrawalStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(SpokeError::Internal(format!(
                "illegal withdrawal transition {} -> {next}",
                self.status
            )));
        }
        debug!(user = %self.user, from = %self.status, to = %next, "Withdrawal transition");
        self.status = next;
        Ok(())
    }

    fn fail(&mut self, err: &SpokeError) {
        warn!(
            user = %self.user,
            amount_token = %self.amount_token,
            request_id = ?self.request_id,
            at = %self.status,
            kind = ?err.kind(),
            retryable = err.is_retryable(),
            error = %err,
            "Custodial withdrawal failed"
        );
        if self.status.can_transition_to(WithdrawalStatus::Failed) {
            self.status = WithdrawalStatus::Failed;
        }
    }
}

/// A request id held in flight; released again unless it is recorded.
struct Claim<'a> {
    guard: &'a Mutex<IdempotencyGuard>,
    id: WithdrawalRequestId,
    recorded: bool,
}

impl<'a> Claim<'a> {
    fn new(guard: &'a Mutex<IdempotencyGuard>, id: WithdrawalRequestId) -> Result<Self> {
        lock(guard)?.claim(id)?;
        Ok(Self {
            guard,
            id,
            recorded: false,
        })
    }

    fn recorded(mut self) {
        if let Ok(mut guard) = self.guard.lock() {
            guard.mark_recorded(self.id);
            self.recorded = true;
        }
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if self.recorded {
            return;
        }
        if let Ok(mut guard) = self.guard.lock() {
            guard.release(self.id);
        }
    }
}

fn lock(guard: &Mutex<IdempotencyGuard>) -> Result<MutexGuard<'_, IdempotencyGuard>> {
    guard
        .lock()
        .map_err(|_| SpokeError::Internal("idempotency guard poisoned".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onchain::InMemorySubmitter;
    use crate::rates::{FixedRateSource, UnavailableRateSource};
    use crate::store::InMemoryCustodialStore;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use spoke_types::{ExchangeRate, whole_tokens};

    fn user() -> Address {
        Address::repeat(0xAA)
    }

    fn args(amount_token: Amount) -> CreateCustodialWithdrawalArgs {
        CreateCustodialWithdrawalArgs {
            user: user(),
            recipient: Address::repeat(0xBB),
            amount_token,
            request_id: None,
        }
    }

    async fn service_with<R: RateSource>(
        rates: R,
        submitter: InMemorySubmitter,
    ) -> CustodialSettlementService<InMemoryCustodialStore, R, InMemorySubmitter> {
        let store = InMemoryCustodialStore::new();
        store.credit(user(), whole_tokens(10), Amount::zero()).await.unwrap();
        CustodialSettlementService::new(
            SettlementConfig::new(Address::repeat(0x01)),
            store,
            rates,
            submitter,
        )
        .unwrap()
    }

    async fn service() -> CustodialSettlementService<InMemoryCustodialStore, FixedRateSource, InMemorySubmitter>
    {
        service_with(FixedRateSource::fresh(Decimal::new(100, 0)), InMemorySubmitter::new()).await
    }

    #[tokio::test]
    async fn records_withdrawal() {
        let svc = service().await;
        let row = svc.create_custodial_withdrawal(args(whole_tokens(2))).await.unwrap();
        assert_eq!(row.requested_token, whole_tokens(2));
        // 2 tokens at $100/ETH.
        assert_eq!(row.sent_wei, Amount::from(20_000_000_000_000_000u64));
        assert!(row.remainder_token.is_zero());

        let balance = svc.store().balance(user()).await.unwrap();
        assert_eq!(balance.balance_token, whole_tokens(8));
        let txs = svc.store().onchain_transactions().unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].id, row.onchain_transaction_id);
        assert_eq!(txs[0].from, Address::repeat(0x01));
        assert_eq!(txs[0].meta.reason, CUSTODIAL_WITHDRAWAL_REASON);
    }

    #[tokio::test]
    async fn below_minimum_is_refused_before_store() {
        let svc = service().await;
        let err = svc
            .create_custodial_withdrawal(args(Amount::from(99_999_999_999_999_999u64)))
            .await
            .unwrap_err();
        assert!(matches!(err, SpokeError::AmountBelowMinimum { .. }));
        assert_eq!(svc.submitter().attempts(), 0);
    }

    #[tokio::test]
    async fn minimum_itself_is_accepted() {
        let svc = service().await;
        svc.create_custodial_withdrawal(args(Amount::from(100_000_000_000_000_000u64)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn more_than_balance_is_refused() {
        let svc = service().await;
        let err = svc
            .create_custodial_withdrawal(args(whole_tokens(11)))
            .await
            .unwrap_err();
        assert!(matches!(err, SpokeError::InsufficientBalance { .. }));
        assert_eq!(svc.submitter().attempts(), 0);
    }

    #[tokio::test]
    async fn stale_rate_is_refused() {
        let old = ExchangeRate::new(Decimal::new(100, 0), Utc::now() - Duration::seconds(601));
        let svc = service_with(FixedRateSource::new(old), InMemorySubmitter::new()).await;
        let err = svc
            .create_custodial_withdrawal(args(whole_tokens(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, SpokeError::StaleRate { max_age_secs: 600, .. }));
        assert!(err.is_retryable());
        assert_eq!(svc.store().balance(user()).await.unwrap().balance_token, whole_tokens(10));
    }

    #[tokio::test]
    async fn rate_outage_is_refused() {
        let rates = UnavailableRateSource {
            reason: "feed offline".into(),
        };
        let svc = service_with(rates, InMemorySubmitter::new()).await;
        let err = svc
            .create_custodial_withdrawal(args(whole_tokens(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, SpokeError::RateSourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn failed_submission_releases_request_id() {
        let svc = service_with(
            FixedRateSource::fresh(Decimal::new(100, 0)),
            InMemorySubmitter::failing("rpc down"),
        )
        .await;
        let id = WithdrawalRequestId::new();
        let mut a = args(whole_tokens(1));
        a.request_id = Some(id);

        for _ in 0..2 {
            let err = svc.create_custodial_withdrawal(a.clone()).await.unwrap_err();
            assert!(matches!(err, SpokeError::SubmissionFailed { .. }));
        }
        assert_eq!(svc.submitter().attempts(), 2);
    }

    #[tokio::test]
    async fn recorded_request_id_is_refused() {
        let svc = service().await;
        let mut a = args(whole_tokens(1));
        a.request_id = Some(WithdrawalRequestId::new());
        svc.create_custodial_withdrawal(a.clone()).await.unwrap();
        let err = svc.create_custodial_withdrawal(a).await.unwrap_err();
        assert!(matches!(err, SpokeError::DuplicateRequest(_)));
        assert_eq!(svc.store().withdrawals().unwrap().len(), 1);
        assert_eq!(svc.submitter().attempts(), 1);
    }

    #[test]
    fn progress_refuses_skipped_steps() {
        let mut progress = Progress::new(&args(Amount::one()));
        assert!(progress.advance(WithdrawalStatus::Recorded).is_err());
        progress.advance(WithdrawalStatus::Validated).unwrap();
        progress.fail(&SpokeError::Internal("x".into()));
        assert_eq!(progress.status, WithdrawalStatus::Failed);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let result = CustodialSettlementService::new(
            SettlementConfig::new(Address::ZERO),
            InMemoryCustodialStore::new(),
            FixedRateSource::fresh(Decimal::ONE),
            InMemorySubmitter::new(),
        );
        assert!(matches!(result, Err(SpokeError::Configuration(_))));
    }
}
