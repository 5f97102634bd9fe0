use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Currency or currency-pair label as it appears in the input files.
///
/// FX series are keyed by pair labels such as `EURUSD` or `INRJPY`, and
/// trades reference the same labels through their instrument column, so a
/// single newtype covers both.
///
/// # Examples
///
/// ```
/// use fx_threshold_engine::core::currency::CurrencyCode;
///
/// let eur = CurrencyCode::new("EURUSD");
/// let gbp = CurrencyCode::new("GBPUSD");
/// assert_ne!(eur, gbp);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CurrencyCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Errors arising from quote-rate table maintenance.
#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("quote rate must be positive and finite, got {rate} for {currency}")]
    InvalidRate { currency: CurrencyCode, rate: f64 },
}

/// Outcome of looking up the divisor for a currency.
///
/// A missing entry is not an error: the backtester falls back to a divisor
/// of one, which leaves the volatility threshold unconverted. The variant
/// keeps that fallback visible to callers and reports.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "rate")]
pub enum QuoteLookup {
    /// Rate found in the table.
    Quoted(f64),
    /// No entry; divisor of 1 applied.
    Fallback,
}

impl QuoteLookup {
    /// The divisor to apply when converting a volatility threshold.
    pub fn divisor(&self) -> f64 {
        match self {
            QuoteLookup::Quoted(rate) => *rate,
            QuoteLookup::Fallback => 1.0,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, QuoteLookup::Fallback)
    }

    /// Convert a volatility threshold into deviation-percentage space.
    pub fn convert(&self, threshold: f64) -> f64 {
        threshold / self.divisor()
    }
}

/// Static currency → spot rate mapping.
///
/// Used solely to convert an annualized volatility threshold, expressed in
/// rate units, into a deviation-percentage threshold comparable with trade
/// deviations. It is a unit conversion table, not a market data source.
///
/// # Examples
///
/// ```
/// use fx_threshold_engine::core::currency::{CurrencyCode, QuoteRateTable};
///
/// let table = QuoteRateTable::default();
/// let pct = table.lookup(&CurrencyCode::new("EURUSD")).convert(0.07);
/// assert!((pct - 0.07 / 1.07).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteRateTable {
    rates: BTreeMap<CurrencyCode, f64>,
}

impl QuoteRateTable {
    /// Look up the divisor for a currency.
    pub fn lookup(&self, currency: &CurrencyCode) -> QuoteLookup {
        match self.rates.get(currency) {
            Some(rate) => QuoteLookup::Quoted(*rate),
            None => QuoteLookup::Fallback,
        }
    }

    /// Check that every stored rate is positive and finite. Tables
    /// deserialized from configuration files may not be.
    pub fn validate(&self) -> Result<(), QuoteError> {
        for (currency, &rate) in &self.rates {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(QuoteError::InvalidRate {
                    currency: currency.clone(),
                    rate,
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

impl Default for QuoteRateTable {
    /// The six reference pairs used by the FX desk.
    fn default() -> Self {
        let rates = [
            ("INRUSD", 83.5),
            ("JPYUSD", 145.2),
            ("EURUSD", 1.07),
            ("GBPUSD", 1.25),
            ("INRJPY", 0.58),
            ("EURJPY", 156.0),
        ]
        .into_iter()
        .map(|(code, rate)| (CurrencyCode::new(code), rate))
        .collect();
        Self { rates }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_currency_code_equality() {
        let a = CurrencyCode::new("EURUSD");
        let b = CurrencyCode::new("EURUSD");
        assert_eq!(a, b);
    }

    #[test]
    fn test_default_table_has_six_pairs() {
        let table = QuoteRateTable::default();
        assert_eq!(table.len(), 6);
        assert_eq!(
            table.lookup(&CurrencyCode::new("JPYUSD")),
            QuoteLookup::Quoted(145.2)
        );
    }

    #[test]
    fn test_conversion_divides_by_rate() {
        let table = QuoteRateTable::default();
        let pct = table.lookup(&CurrencyCode::new("EURUSD")).convert(0.07);
        assert_relative_eq!(pct, 0.0654, epsilon = 1e-4);
    }

    #[test]
    fn test_missing_rate_falls_back_to_one() {
        let table = QuoteRateTable::default();
        let code = CurrencyCode::new("CHFUSD");
        assert!(table.lookup(&code).is_fallback());
        assert_eq!(table.lookup(&code).convert(0.5), 0.5);
    }

    #[test]
    fn test_empty_table_always_falls_back() {
        let table: QuoteRateTable = serde_json::from_str("{}").unwrap();
        assert!(table.is_empty());
        assert!(table.lookup(&CurrencyCode::new("EURUSD")).is_fallback());
    }

    #[test]
    fn test_validate_catches_deserialized_zero() {
        let table: QuoteRateTable = serde_json::from_str(r#"{"EURUSD": 0.0}"#).unwrap();
        assert!(table.validate().is_err());
        let table: QuoteRateTable = serde_json::from_str(r#"{"EURUSD": -1.0}"#).unwrap();
        assert!(table.validate().is_err());
    }
}
