//! Monetary amounts using decimal arithmetic.
//!
//! Payment providers report amounts in minor units (cents). The pipeline keeps
//! amounts as [`Decimal`] in the currency's standard unit and converts using
//! the currency's exponent, so zero-decimal currencies like JPY are not off by
//! a factor of 100.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Currencies without a minor unit.
const ZERO_DECIMAL: &[&str] = &[
    "BIF", "CLP", "DJF", "GNF", "JPY", "KMF", "KRW", "MGA", "PYG", "RWF", "UGX", "VND", "VUV",
    "XAF", "XOF", "XPF",
];

/// Currencies with three decimal places.
const THREE_DECIMAL: &[&str] = &["BHD", "JOD", "KWD", "OMR", "TND"];

/// An ISO 4217 currency code, stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Parse a three-letter currency code (any case).
    ///
    /// # Errors
    ///
    /// Returns the rejected input if it is not three ASCII letters.
    pub fn parse(code: &str) -> Result<Self, String> {
        let code = code.trim();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(code.to_ascii_uppercase()))
        } else {
            Err(format!("invalid currency code: {code:?}"))
        }
    }

    /// US dollars.
    #[must_use]
    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    /// The uppercase ISO code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Number of decimal places in the currency's minor unit.
    #[must_use]
    pub fn exponent(&self) -> u32 {
        let code = self.0.as_str();
        if ZERO_DECIMAL.contains(&code) {
            0
        } else if THREE_DECIMAL.contains(&code) {
            3
        } else {
            2
        }
    }

    /// Display symbol, when the currency has an unambiguous one.
    #[must_use]
    pub fn symbol(&self) -> Option<&'static str> {
        match self.0.as_str() {
            "USD" => Some("$"),
            "EUR" => Some("€"),
            "GBP" => Some("£"),
            "JPY" => Some("¥"),
            "CAD" => Some("CA$"),
            "AUD" => Some("A$"),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Currency {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

/// An amount of money in a specific currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency.
    pub currency: Currency,
}

impl Money {
    /// Create a new amount.
    #[must_use]
    pub const fn new(amount: Decimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Build an amount from provider minor units (e.g., 4990 cents → 49.90).
    #[must_use]
    pub fn from_minor_units(units: i64, currency: Currency) -> Self {
        let amount = Decimal::new(units, currency.exponent());
        Self { amount, currency }
    }

    /// Human-readable total for emails, e.g. `€49.90` or `49.90 CHF`.
    #[must_use]
    pub fn formatted(&self) -> String {
        let places = self.currency.exponent() as usize;
        let rounded = self.amount.round_dp(self.currency.exponent());
        match self.currency.symbol() {
            Some(symbol) => format!("{symbol}{rounded:.places$}"),
            None => format!("{rounded:.places$} {}", self.currency.code()),
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn currency(code: &str) -> Currency {
        Currency::parse(code).unwrap()
    }

    #[test]
    fn test_currency_parse_normalizes() {
        assert_eq!(currency("eur").code(), "EUR");
        assert!(Currency::parse("euro").is_err());
        assert!(Currency::parse("E1R").is_err());
    }

    #[test]
    fn test_from_minor_units_two_decimals() {
        let money = Money::from_minor_units(4990, currency("usd"));
        assert_eq!(money.amount, Decimal::new(4990, 2));
        assert_eq!(money.formatted(), "$49.90");
    }

    #[test]
    fn test_from_minor_units_zero_decimal() {
        let money = Money::from_minor_units(1500, currency("jpy"));
        assert_eq!(money.amount, Decimal::from(1500));
        assert_eq!(money.formatted(), "¥1500");
    }

    #[test]
    fn test_formatted_without_symbol() {
        let money = Money::from_minor_units(12_345, currency("chf"));
        assert_eq!(money.formatted(), "123.45 CHF");
    }

    #[test]
    fn test_formatted_pads_trailing_zero() {
        let money = Money::new(Decimal::new(499, 1), currency("eur"));
        assert_eq!(money.formatted(), "€49.90");
    }
}
