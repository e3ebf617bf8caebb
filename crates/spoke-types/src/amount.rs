//! Monetary amounts.
//!
//! Every balance in Spoke is a 256-bit unsigned integer in base units
//! (wei, or the token's smallest unit). Arithmetic on amounts is always
//! checked; an overflow or underflow is an error, never a wrap.

use rust_decimal::Decimal;

use crate::{Result, SpokeError};

/// A non-negative base-unit amount.
pub type Amount = primitive_types::U256;

/// Parse a base-10 amount string, e.g. `"8003287580000000000000"`.
pub fn parse_amount(s: &str) -> Result<Amount> {
    Amount::from_dec_str(s).map_err(|e| SpokeError::Serialization(format!("invalid amount {s:?}: {e:?}")))
}

/// `10^decimals` as an [`Amount`].
#[must_use]
pub fn pow10(decimals: u32) -> Amount {
    Amount::exp10(decimals as usize)
}

/// Convert a non-negative decimal into an integer scaled by `10^decimals`.
///
/// `scale_decimal(1.5, 18) == 1_500_000_000_000_000_000`. Fails if the value
/// is negative or carries more fractional digits than `decimals`.
pub fn scale_decimal(value: Decimal, decimals: u32) -> Result<Amount> {
    if value.is_sign_negative() {
        return Err(SpokeError::InvalidRequest {
            reason: format!("negative decimal {value}"),
        });
    }
    let value = value.normalize();
    let scale = value.scale();
    if scale > decimals {
        return Err(SpokeError::InvalidRequest {
            reason: format!("{value} has more than {decimals} fractional digits"),
        });
    }
    let mantissa = u128::try_from(value.mantissa())
        .map_err(|_| SpokeError::Internal(format!("decimal mantissa out of range: {value}")))?;
    Amount::from(mantissa)
        .checked_mul(pow10(decimals - scale))
        .ok_or_else(|| SpokeError::Internal(format!("scaled decimal overflows: {value}")))
}

/// Whole token count expressed in 18-decimal base units.
#[must_use]
pub fn whole_tokens(count: u64) -> Amount {
    Amount::from(count) * pow10(18)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_large_amount() {
        let a = parse_amount("8003287580000000000000").unwrap();
        assert_eq!(a, Amount::from(8_003_287_580_000_000_000_000u128));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_amount("12ab").is_err());
    }

    #[test]
    fn scale_decimal_fractional() {
        let rate = Decimal::new(15, 1); // 1.5
        assert_eq!(
            scale_decimal(rate, 18).unwrap(),
            Amount::from(1_500_000_000_000_000_000u128)
        );
    }

    #[test]
    fn scale_decimal_trailing_zeros_normalized() {
        // 2.500 normalizes to 2.5 before scaling.
        let v = Decimal::new(2500, 3);
        assert_eq!(scale_decimal(v, 1).unwrap(), Amount::from(25u64));
    }

    #[test]
    fn scale_decimal_rejects_negative_and_excess_precision() {
        assert!(scale_decimal(Decimal::new(-1, 0), 18).is_err());
        assert!(scale_decimal(Decimal::new(123, 3), 2).is_err());
    }

    #[test]
    fn whole_tokens_uses_18_decimals() {
        assert_eq!(whole_tokens(2), Amount::from(2_000_000_000_000_000_000u128));
    }
}
