//! Exchange-rate observations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// USD value of one ETH at a point in time. The hub token is USD-pegged, so
/// this is also the token-per-ETH rate used to convert custodial token
/// withdrawals into wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRate {
    pub usd_per_eth: Decimal,
    pub observed_at: DateTime<Utc>,
}

impl ExchangeRate {
    #[must_use]
    pub fn new(usd_per_eth: Decimal, observed_at: DateTime<Utc>) -> Self {
        Self {
            usd_per_eth,
            observed_at,
        }
    }

    /// Seconds elapsed between the observation and `now`.
    #[must_use]
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.observed_at).num_seconds()
    }
}
