//! Configuration for the hub-side settlement path.

use serde::{Deserialize, Serialize};

use crate::{Address, Amount, Result, SpokeError, constants};

/// Settings consumed by the custodial settlement service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementConfig {
    /// Hub wallet that funds custodial withdrawals on-chain.
    pub hot_wallet_address: Address,
    /// Smallest custodial token withdrawal accepted, in base units.
    #[serde(default = "default_min_withdrawal_token")]
    pub min_withdrawal_token: Amount,
    /// Rates older than this are refused.
    #[serde(default = "default_max_rate_age_secs")]
    pub max_rate_age_secs: u64,
    /// How many recorded request ids to remember.
    #[serde(default = "default_idempotency_cache_size")]
    pub idempotency_cache_size: usize,
}

fn default_min_withdrawal_token() -> Amount {
    Amount::from(constants::DEFAULT_MIN_WITHDRAWAL_TOKEN)
}

fn default_max_rate_age_secs() -> u64 {
    constants::DEFAULT_MAX_RATE_AGE_SECS
}

fn default_idempotency_cache_size() -> usize {
    constants::DEFAULT_IDEMPOTENCY_CACHE_SIZE
}

impl SettlementConfig {
    /// Defaults for everything except the hot wallet.
    #[must_use]
    pub fn new(hot_wallet_address: Address) -> Self {
        Self {
            hot_wallet_address,
            min_withdrawal_token: default_min_withdrawal_token(),
            max_rate_age_secs: default_max_rate_age_secs(),
            idempotency_cache_size: default_idempotency_cache_size(),
        }
    }

    /// Parse and validate a JSON config document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self =
            serde_json::from_str(json).map_err(|e| SpokeError::Configuration(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.hot_wallet_address == Address::ZERO {
            return Err(SpokeError::Configuration(
                "hotWalletAddress must not be the zero address".into(),
            ));
        }
        if self.idempotency_cache_size == 0 {
            return Err(SpokeError::Configuration(
                "idempotencyCacheSize must be > 0".into(),
            ));
        }
        Ok(())
    }
}
