//! Token to wei conversion at a USD/ETH rate.
//!
//! The token is USD-pegged with 18 decimals, as is ether. With the rate
//! scaled to 18 decimals (`rate_wei = usd_per_eth * 10^18`):
//!
//! ```text
//!   sent_wei        = floor(amount_token * 10^18 / rate_wei)
//!   remainder_token = amount_token - floor(sent_wei * rate_wei / 10^18)
//! ```
//!
//! Rounding always favours the hub; the remainder is what the user was
//! debited but not paid, and is kept on the ledger row.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use spoke_types::constants::TOKEN_DECIMALS;
use spoke_types::{Amount, Result, SpokeError, pow10, scale_decimal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeiConversion {
    /// One ether in token base units.
    pub rate_wei: Amount,
    pub sent_wei: Amount,
    pub remainder_token: Amount,
}

/// Convert `amount_token` base units to wei at `usd_per_eth`.
///
/// Rate digits beyond 18 decimals are truncated. A rate that is not
/// positive after truncation is a bad feed, reported as
/// [`SpokeError::RateSourceUnavailable`].
pub fn token_to_wei(amount_token: Amount, usd_per_eth: Decimal) -> Result<WeiConversion> {
    let unusable = || SpokeError::RateSourceUnavailable {
        reason: format!("unusable exchange rate {usd_per_eth}"),
    };
    let rate = usd_per_eth.round_dp_with_strategy(TOKEN_DECIMALS, RoundingStrategy::ToZero);
    if rate <= Decimal::ZERO {
        return Err(unusable());
    }
    let rate_wei = scale_decimal(rate, TOKEN_DECIMALS).map_err(|_| unusable())?;
    let unit = pow10(TOKEN_DECIMALS);
    let overflow = || SpokeError::InvalidRequest {
        reason: format!("{amount_token} token base units overflow wei conversion"),
    };
    let sent_wei = amount_token.checked_mul(unit).ok_or_else(overflow)? / rate_wei;
    let covered = sent_wei.checked_mul(rate_wei).ok_or_else(overflow)? / unit;
    Ok(WeiConversion {
        rate_wei,
        sent_wei,
        remainder_token: amount_token - covered,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use spoke_types::{parse_amount, whole_tokens};

    #[test]
    fn exact_conversion_has_no_remainder() {
        // 200 tokens at $100/ETH is exactly 2 ETH.
        let c = token_to_wei(whole_tokens(200), Decimal::new(100, 0)).unwrap();
        assert_eq!(c.sent_wei, whole_tokens(2));
        assert!(c.remainder_token.is_zero());
    }

    #[test]
    fn inexact_conversion_floors_and_keeps_remainder() {
        // 1 token at $3/ETH: 0.333... ETH, floored to wei.
        let c = token_to_wei(whole_tokens(1), Decimal::new(3, 0)).unwrap();
        assert_eq!(c.sent_wei, parse_amount("333333333333333333").unwrap());
        // 333333333333333333 * 3 = 999999999999999999 token units covered.
        assert_eq!(c.remainder_token, Amount::one());
    }

    #[test]
    fn fractional_rate() {
        let rate: Decimal = "123.45".parse().unwrap();
        let amount = parse_amount("8003287580000000000000").unwrap();
        let c = token_to_wei(amount, rate).unwrap();
        let covered = c.sent_wei * c.rate_wei / pow10(18);
        assert_eq!(covered + c.remainder_token, amount);
        // Remainder is always less than the token value of one wei.
        assert!(c.remainder_token * pow10(18) < c.rate_wei + pow10(18));
    }

    #[test]
    fn non_positive_rates_are_a_rate_source_fault() {
        let dust: Decimal = "0.0000000000000000001".parse().unwrap();
        for rate in [Decimal::ZERO, Decimal::new(-5, 0), dust] {
            let err = token_to_wei(whole_tokens(1), rate).unwrap_err();
            assert!(matches!(err, SpokeError::RateSourceUnavailable { .. }), "rate {rate}: {err}");
            assert_eq!(err.kind(), spoke_types::ErrorKind::External);
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn conversion_serializes_in_camel_case() {
        let c = token_to_wei(whole_tokens(200), Decimal::new(100, 0)).unwrap();
        let json = serde_json::to_value(c).unwrap();
        assert!(json.get("rateWei").is_some(), "Got: {json}");
        assert!(json.get("sentWei").is_some(), "Got: {json}");
        assert!(json.get("remainderToken").is_some(), "Got: {json}");
        let back: WeiConversion = serde_json::from_value(json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn overlong_rate_is_truncated() {
        let rate: Decimal = "2.0000000000000000009".parse().unwrap();
        let c = token_to_wei(whole_tokens(2), rate).unwrap();
        assert_eq!(c.rate_wei, whole_tokens(2));
        assert_eq!(c.sent_wei, whole_tokens(1));
    }
}
