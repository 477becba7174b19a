//! Decimal arithmetic utilities for financial calculations.

use rust_decimal::Decimal;

/// Price precision used for every quoted price (2 decimal places).
pub const PRICE_DECIMALS: u32 = 2;

/// Round a value to quoted-price precision.
pub fn round_price(value: Decimal) -> Decimal {
    value.round_dp(PRICE_DECIMALS)
}

/// Safe division that returns zero if divisor is zero.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator == Decimal::ZERO {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_price() {
        assert_eq!(round_price(dec!(10036.6666)), dec!(10036.67));
        assert_eq!(round_price(dec!(9989.584)), dec!(9989.58));
    }

    #[test]
    fn test_safe_div() {
        assert_eq!(safe_div(dec!(10), dec!(4)), dec!(2.5));
        assert_eq!(safe_div(dec!(10), Decimal::ZERO), Decimal::ZERO);
    }
}
