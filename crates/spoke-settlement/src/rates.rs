//! Exchange-rate sources.

use std::sync::RwLock;

use chrono::Utc;
use rust_decimal::Decimal;
use spoke_types::{ExchangeRate, Result, SpokeError};

/// Where settlement reads the current USD/ETH rate from.
pub trait RateSource: Send + Sync {
    fn latest_rate(&self) -> impl Future<Output = Result<ExchangeRate>> + Send;
}

/// A rate source that returns whatever it was last given.
#[derive(Debug)]
pub struct FixedRateSource {
    rate: RwLock<ExchangeRate>,
}

impl FixedRateSource {
    #[must_use]
    pub fn new(rate: ExchangeRate) -> Self {
        Self {
            rate: RwLock::new(rate),
        }
    }

    /// `usd_per_eth`, observed now.
    #[must_use]
    pub fn fresh(usd_per_eth: Decimal) -> Self {
        Self::new(ExchangeRate::new(usd_per_eth, Utc::now()))
    }

    pub fn set(&self, rate: ExchangeRate) -> Result<()> {
        let mut current = self.rate.write().map_err(|_| SpokeError::RateSourceUnavailable {
            reason: "rate lock poisoned".into(),
        })?;
        *current = rate;
        Ok(())
    }
}

impl RateSource for FixedRateSource {
    async fn latest_rate(&self) -> Result<ExchangeRate> {
        let rate = self.rate.read().map_err(|_| SpokeError::RateSourceUnavailable {
            reason: "rate lock poisoned".into(),
        })?;
        Ok(*rate)
    }
}

/// A rate source whose upstream is down.
#[derive(Debug, Clone)]
pub struct UnavailableRateSource {
    pub reason: String,
}

impl RateSource for UnavailableRateSource {
    async fn latest_rate(&self) -> Result<ExchangeRate> {
        Err(SpokeError::RateSourceUnavailable {
            reason: self.reason.clone(),
        })
    }
}
