//! Type-safe money representation using decimal arithmetic.

use core::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Errors produced by [`Money`] parsing and arithmetic.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// The amount is not a decimal number.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    /// The currency code is not supported.
    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),
    /// Arithmetic between two different currencies.
    #[error("currency mismatch: {0} vs {1}")]
    CurrencyMismatch(CurrencyCode, CurrencyCode),
    /// The result does not fit in a `Decimal`.
    #[error("amount out of range")]
    Overflow,
    /// More decimal places than the currency's minor unit.
    #[error("{0} takes at most {1} decimal places")]
    TooPrecise(CurrencyCode, u32),
}

/// ISO 4217 currency codes accepted by the billing API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
    JPY,
    NZD,
    CHF,
    DKK,
    SEK,
    NOK,
    INR,
    SGD,
    HKD,
}

impl CurrencyCode {
    /// The three-letter ISO code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::CAD => "CAD",
            Self::AUD => "AUD",
            Self::JPY => "JPY",
            Self::NZD => "NZD",
            Self::CHF => "CHF",
            Self::DKK => "DKK",
            Self::SEK => "SEK",
            Self::NOK => "NOK",
            Self::INR => "INR",
            Self::SGD => "SGD",
            Self::HKD => "HKD",
        }
    }

    /// Display symbol used in the admin UI.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::USD | Self::CAD | Self::AUD | Self::NZD | Self::SGD | Self::HKD => "$",
            Self::EUR => "€",
            Self::GBP => "£",
            Self::JPY => "¥",
            Self::INR => "₹",
            Self::CHF => "CHF ",
            Self::DKK | Self::SEK | Self::NOK => "kr ",
        }
    }

    /// Number of minor-unit digits.
    #[must_use]
    pub const fn decimal_places(self) -> u32 {
        match self {
            Self::JPY => 0,
            _ => 2,
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CurrencyCode {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Self::USD),
            "EUR" => Ok(Self::EUR),
            "GBP" => Ok(Self::GBP),
            "CAD" => Ok(Self::CAD),
            "AUD" => Ok(Self::AUD),
            "JPY" => Ok(Self::JPY),
            "NZD" => Ok(Self::NZD),
            "CHF" => Ok(Self::CHF),
            "DKK" => Ok(Self::DKK),
            "SEK" => Ok(Self::SEK),
            "NOK" => Ok(Self::NOK),
            "INR" => Ok(Self::INR),
            "SGD" => Ok(Self::SGD),
            "HKD" => Ok(Self::HKD),
            other => Err(MoneyError::UnsupportedCurrency(other.to_string())),
        }
    }
}

/// A monetary amount with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Money {
    /// Create a new amount.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Zero in the given currency.
    #[must_use]
    pub const fn zero(currency_code: CurrencyCode) -> Self {
        Self::new(Decimal::ZERO, currency_code)
    }

    /// Parse from the decimal string and currency code the GraphQL API returns.
    ///
    /// # Errors
    ///
    /// Returns an error if either part is invalid.
    pub fn parse(amount: &str, currency_code: &str) -> Result<Self, MoneyError> {
        let amount = Decimal::from_str(amount.trim())
            .map_err(|_| MoneyError::InvalidAmount(amount.to_string()))?;
        Ok(Self::new(amount, currency_code.parse()?))
    }

    /// Whether the amount is strictly positive.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    /// Round to the currency's minor unit, midpoint away from zero.
    #[must_use]
    pub fn rounded(self) -> Self {
        Self::new(
            self.amount.round_dp_with_strategy(
                self.currency_code.decimal_places(),
                RoundingStrategy::MidpointAwayFromZero,
            ),
            self.currency_code,
        )
    }

    /// Reject amounts finer than the currency's minor unit (`0.001` USD).
    ///
    /// # Errors
    ///
    /// Returns `TooPrecise` with the currency's decimal places.
    pub fn in_minor_units(self) -> Result<Self, MoneyError> {
        let places = self.currency_code.decimal_places();
        if self.amount.normalize().scale() > places {
            return Err(MoneyError::TooPrecise(self.currency_code, places));
        }
        Ok(self)
    }

    /// Add another amount in the same currency.
    ///
    /// # Errors
    ///
    /// Returns `CurrencyMismatch` when the currencies differ and `Overflow`
    /// when the sum leaves the `Decimal` range.
    pub fn checked_add(self, other: Self) -> Result<Self, MoneyError> {
        self.same_currency(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::new(amount, self.currency_code))
    }

    /// Subtract another amount, flooring at zero.
    ///
    /// # Errors
    ///
    /// Returns `CurrencyMismatch` when the currencies differ and `Overflow`
    /// when the difference leaves the `Decimal` range.
    pub fn saturating_sub(self, other: Self) -> Result<Self, MoneyError> {
        self.same_currency(other)?;
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::new(amount.max(Decimal::ZERO), self.currency_code))
    }

    /// Apply a percentage discount (`percent` in 0..=100), rounded to the minor unit.
    #[must_use]
    pub fn percent_off(self, percent: Decimal) -> Self {
        let percent = percent.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
        let factor = (Decimal::ONE_HUNDRED - percent) / Decimal::ONE_HUNDRED;
        Self::new(self.amount * factor, self.currency_code).rounded()
    }

    /// Share of `total` this amount represents, as a whole percentage clamped to 0..=100.
    #[must_use]
    pub fn percent_of(self, total: Self) -> u8 {
        if total.amount <= Decimal::ZERO {
            return 0;
        }
        let Some(ratio) = self
            .amount
            .checked_div(total.amount)
            .and_then(|r| r.checked_mul(Decimal::ONE_HUNDRED))
        else {
            // only a huge positive share can overflow here
            return if self.amount.is_sign_negative() { 0 } else { 100 };
        };
        let pct = ratio
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
        pct.to_u8().unwrap_or(100)
    }

    /// Amount formatted with the currency's minor-unit precision (no symbol).
    #[must_use]
    pub fn amount_string(&self) -> String {
        let rounded = self.rounded();
        let dp = self.currency_code.decimal_places() as usize;
        format!("{:.dp$}", rounded.amount)
    }

    /// Format for display (e.g., `$19.99 USD`).
    #[must_use]
    pub fn display(&self) -> String {
        format!(
            "{}{} {}",
            self.currency_code.symbol(),
            self.amount_string(),
            self.currency_code
        )
    }

    fn same_currency(self, other: Self) -> Result<(), MoneyError> {
        if self.currency_code == other.currency_code {
            Ok(())
        } else {
            Err(MoneyError::CurrencyMismatch(
                self.currency_code,
                other.currency_code,
            ))
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn usd(s: &str) -> Money {
        Money::parse(s, "USD").unwrap()
    }

    #[test]
    fn test_parse() {
        let m = Money::parse("19.99", "usd").unwrap();
        assert_eq!(m.amount, Decimal::new(1999, 2));
        assert_eq!(m.currency_code, CurrencyCode::USD);

        assert!(matches!(
            Money::parse("abc", "USD"),
            Err(MoneyError::InvalidAmount(_))
        ));
        assert!(matches!(
            Money::parse("1.00", "XYZ"),
            Err(MoneyError::UnsupportedCurrency(_))
        ));
    }

    #[test]
    fn test_arithmetic_overflow_is_an_error() {
        let huge = Money::new(Decimal::MAX, CurrencyCode::USD);
        assert_eq!(usd("1.00").checked_add(huge), Err(MoneyError::Overflow));
        assert_eq!(
            Money::new(Decimal::MIN, CurrencyCode::USD).saturating_sub(usd("1.00")),
            Err(MoneyError::Overflow)
        );
        assert_eq!(huge.percent_of(usd("0.01")), 100);
        assert_eq!(usd("12.50").checked_add(usd("0.50")).unwrap(), usd("13.00"));
    }

    #[test]
    fn test_in_minor_units() {
        assert!(usd("12.50").in_minor_units().is_ok());
        assert!(usd("12.500").in_minor_units().is_ok());
        assert_eq!(
            usd("0.001").in_minor_units(),
            Err(MoneyError::TooPrecise(CurrencyCode::USD, 2))
        );
        assert!(Money::parse("1.5", "JPY").unwrap().in_minor_units().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(usd("19.9").display(), "$19.90 USD");
        assert_eq!(Money::parse("500", "JPY").unwrap().display(), "¥500 JPY");
        assert_eq!(Money::parse("5", "EUR").unwrap().to_string(), "€5.00 EUR");
    }

    #[test]
    fn test_percent_off_rounds_half_up() {
        // 9.99 * 0.85 = 8.4915 -> 8.49
        assert_eq!(usd("9.99").percent_off(Decimal::from(15)).amount, Decimal::new(849, 2));
        // 0.05 * 0.5 = 0.025 -> 0.03
        assert_eq!(usd("0.05").percent_off(Decimal::from(50)).amount, Decimal::new(3, 2));
    }

    #[test]
    fn test_percent_off_is_clamped() {
        assert_eq!(usd("10").percent_off(Decimal::from(150)).amount, Decimal::ZERO);
        assert_eq!(usd("10").percent_off(Decimal::from(-5)).amount, Decimal::from(10));
    }

    #[test]
    fn test_saturating_sub_floors_at_zero() {
        assert_eq!(usd("5").saturating_sub(usd("7")).unwrap().amount, Decimal::ZERO);
        assert_eq!(usd("7").saturating_sub(usd("5")).unwrap().amount, Decimal::from(2));
    }

    #[test]
    fn test_currency_mismatch() {
        let eur = Money::parse("1", "EUR").unwrap();
        assert!(matches!(
            usd("1").checked_add(eur),
            Err(MoneyError::CurrencyMismatch(CurrencyCode::USD, CurrencyCode::EUR))
        ));
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(usd("25").percent_of(usd("100")), 25);
        assert_eq!(usd("33.335").percent_of(usd("100")), 33);
        assert_eq!(usd("150").percent_of(usd("100")), 100);
        assert_eq!(usd("1").percent_of(usd("0")), 0);
    }
}
