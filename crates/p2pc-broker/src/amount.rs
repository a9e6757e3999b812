//! Conversion between decimal token amounts and ledger fixed-point units.
//!
//! The ledger stores money as integers scaled by `10^decimals`. Converting a
//! decimal amount to units always truncates: the ledger never receives more
//! units than the caller's decimal amount expresses.
//!
//! Decimal input given as `f64` is converted through its shortest round-trip
//! decimal representation, so `0.29` becomes exactly `29` units at two
//! decimals rather than `28` from `0.29 * 100.0 == 28.999999999999996`.

use crate::error::{BrokerError, Result};

/// Largest scale whose factor fits in `u128`.
pub const MAX_DECIMALS: u8 = 38;

/// Converts between decimal amounts and integer ledger units for one scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmountConverter {
    decimals: u8,
    factor: u128,
}

impl AmountConverter {
    /// Create a converter for the given number of decimals.
    ///
    /// # Errors
    ///
    /// Returns an encoding error if `10^decimals` does not fit in `u128`.
    pub fn new(decimals: u8) -> Result<Self> {
        if decimals > MAX_DECIMALS {
            return Err(BrokerError::encoding(format!(
                "decimals {decimals} exceeds maximum of {MAX_DECIMALS}"
            )));
        }
        Ok(Self {
            decimals,
            factor: 10u128.pow(u32::from(decimals)),
        })
    }

    /// Number of decimal places.
    #[must_use]
    pub const fn decimals(&self) -> u8 {
        self.decimals
    }

    /// Units per whole token (`10^decimals`).
    #[must_use]
    pub const fn factor(&self) -> u128 {
        self.factor
    }

    /// Convert a decimal amount to ledger units, truncating extra digits.
    ///
    /// # Errors
    ///
    /// Returns an encoding error for negative, non-finite, or overflowing
    /// amounts.
    pub fn to_units(&self, amount: f64) -> Result<u128> {
        if !amount.is_finite() {
            return Err(BrokerError::encoding(format!(
                "amount {amount} is not finite"
            )));
        }
        if amount < 0.0 {
            return Err(BrokerError::encoding(format!(
                "amount {amount} must be non-negative"
            )));
        }
        // `Display` for f64 never uses exponent notation.
        self.parse_units(&amount.to_string())
    }

    /// Parse a decimal string such as `"12.345"` into ledger units,
    /// truncating digits beyond the scale.
    ///
    /// # Errors
    ///
    /// Returns an encoding error if the string is not a plain non-negative
    /// decimal or the result overflows.
    pub fn parse_units(&self, text: &str) -> Result<u128> {
        let text = text.trim();
        let (whole, fraction) = match text.split_once('.') {
            Some((w, f)) => (w, f),
            None => (text, ""),
        };

        if whole.is_empty() && fraction.is_empty() {
            return Err(BrokerError::encoding(format!("'{text}' is not a decimal amount")));
        }
        if !whole.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(BrokerError::encoding(format!("'{text}' is not a decimal amount")));
        }

        let overflow = || BrokerError::encoding(format!("'{text}' overflows ledger units"));

        let whole_units = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<u128>()
                .map_err(|_| overflow())?
                .checked_mul(self.factor)
                .ok_or_else(overflow)?
        };

        let kept = &fraction[..fraction.len().min(usize::from(self.decimals))];
        let fraction_units = if kept.is_empty() {
            0
        } else {
            let padding = u32::from(self.decimals) - kept.len() as u32;
            kept.parse::<u128>().map_err(|_| overflow())? * 10u128.pow(padding)
        };

        whole_units.checked_add(fraction_units).ok_or_else(overflow)
    }

    /// Convert ledger units to a decimal amount.
    ///
    /// The result is for display: values beyond 2^53 units lose precision
    /// in the usual `f64` way.
    #[must_use]
    pub fn to_decimal(&self, units: u128) -> f64 {
        units as f64 / self.factor as f64
    }

    /// Render ledger units as an exact decimal string without trailing zeros.
    #[must_use]
    pub fn format_units(&self, units: u128) -> String {
        let whole = units / self.factor;
        if self.decimals == 0 {
            return whole.to_string();
        }
        let fraction = units % self.factor;
        let digits = format!("{fraction:0width$}", width = usize::from(self.decimals));
        let digits = digits.trim_end_matches('0');
        if digits.is_empty() {
            whole.to_string()
        } else {
            format!("{whole}.{digits}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    fn conv(decimals: u8) -> AmountConverter {
        AmountConverter::new(decimals).expect("valid decimals")
    }

    #[test]
    fn test_whole_amount() {
        assert_eq!(conv(18).to_units(1.0).expect("convert"), 1_000_000_000_000_000_000);
        assert_eq!(conv(6).to_units(42.0).expect("convert"), 42_000_000);
    }

    #[test]
    fn test_no_float_multiplication_artifacts() {
        assert_eq!(conv(2).to_units(0.29).expect("convert"), 29);
        assert_eq!(conv(6).to_units(1.1).expect("convert"), 1_100_000);
    }

    #[test_case("1.239", 2, 123 ; "truncates extra digits")]
    #[test_case("1.5", 3, 1500 ; "pads short fraction")]
    #[test_case(".5", 1, 5 ; "no whole part")]
    #[test_case("7.", 2, 700 ; "trailing dot")]
    #[test_case("0.000001", 3, 0 ; "below precision")]
    #[test_case("12", 0, 12 ; "zero decimals")]
    fn test_parse_units(text: &str, decimals: u8, expected: u128) {
        assert_eq!(conv(decimals).parse_units(text).expect("convert"), expected);
    }

    #[test_case("" ; "empty")]
    #[test_case("." ; "lone dot")]
    #[test_case("-1" ; "negative")]
    #[test_case("1e5" ; "exponent")]
    #[test_case("1.2.3" ; "two dots")]
    fn test_parse_units_rejects(text: &str) {
        let err = conv(6).parse_units(text).unwrap_err();
        assert!(matches!(err, BrokerError::Encoding { .. }));
    }

    #[test]
    fn test_rejects_negative_and_nan() {
        assert!(conv(6).to_units(-0.5).is_err());
        assert!(conv(6).to_units(f64::NAN).is_err());
        assert!(conv(6).to_units(f64::INFINITY).is_err());
    }

    #[test]
    fn test_overflow_is_encoding_error() {
        let err = conv(38).parse_units("1000").unwrap_err();
        assert!(matches!(err, BrokerError::Encoding { .. }));
    }

    #[test]
    fn test_decimals_limit() {
        assert!(AmountConverter::new(MAX_DECIMALS).is_ok());
        assert!(AmountConverter::new(MAX_DECIMALS + 1).is_err());
    }

    #[test]
    fn test_to_decimal() {
        assert!((conv(6).to_decimal(1_500_000) - 1.5).abs() < f64::EPSILON);
        assert!((conv(0).to_decimal(3) - 3.0).abs() < f64::EPSILON);
    }

    #[test_case(1_500_000, 6, "1.5")]
    #[test_case(2_000_000, 6, "2")]
    #[test_case(1, 6, "0.000001")]
    #[test_case(42, 0, "42")]
    fn test_format_units(units: u128, decimals: u8, expected: &str) {
        assert_eq!(conv(decimals).format_units(units), expected);
    }

    proptest! {
        #[test]
        fn to_units_never_exceeds_amount(amount in 0.0f64..1_000_000.0, decimals in 0u8..=12) {
            let c = conv(decimals);
            let units = c.to_units(amount).expect("convert");
            prop_assert!(c.to_decimal(units) <= amount * (1.0 + 1e-12));
        }

        #[test]
        fn round_trip_within_one_unit(amount in 0.0f64..1_000_000.0, decimals in 0u8..=12) {
            let c = conv(decimals);
            let back = c.to_decimal(c.to_units(amount).expect("convert"));
            let unit = 10f64.powi(-i32::from(decimals));
            prop_assert!((amount - back).abs() <= unit + amount * 1e-12);
        }

        #[test]
        fn format_then_parse_is_exact(units in 0u128..u128::from(u64::MAX), decimals in 0u8..=18) {
            let c = conv(decimals);
            prop_assert_eq!(c.parse_units(&c.format_units(units)).expect("convert"), units);
        }
    }
}
