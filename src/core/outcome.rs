use crate::core::currency::CurrencyCode;
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a currency (or a whole analysis) produced no row.
///
/// These are recoverable outcomes: the run continues with the remaining
/// currencies and the reason stays attached to the model output.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    #[error("insufficient data: {available} observations, {required} required")]
    InsufficientData { required: usize, available: usize },
    #[error("no defined rolling volatility")]
    NoDefinedVolatility,
    #[error("variance is zero or not finite")]
    DegenerateVariance,
    #[error("model fit failed: {reason}")]
    FitFailed { reason: String },
    #[error("insufficient currencies: {available} with valid features, {required} required")]
    InsufficientCurrencies { required: usize, available: usize },
}

/// A currency that was left out of a model's output, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedCurrency {
    pub currency: CurrencyCode,
    pub reason: SkipReason,
}

/// Rows produced by one model plus the currencies it skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput<T> {
    rows: Vec<T>,
    skipped: Vec<SkippedCurrency>,
}

impl<T> ModelOutput<T> {
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Record one per-currency outcome.
    pub fn record(&mut self, currency: &CurrencyCode, outcome: Result<T, SkipReason>) {
        match outcome {
            Ok(row) => self.rows.push(row),
            Err(reason) => {
                debug!("skipping {}: {}", currency, reason);
                self.skipped.push(SkippedCurrency {
                    currency: currency.clone(),
                    reason,
                });
            }
        }
    }

    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    pub fn skipped(&self) -> &[SkippedCurrency] {
        &self.skipped
    }

    /// The reason a currency was skipped, if it was.
    pub fn skip_reason(&self, currency: &CurrencyCode) -> Option<&SkipReason> {
        self.skipped
            .iter()
            .find(|s| &s.currency == currency)
            .map(|s| &s.reason)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<T> Default for ModelOutput<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<(CurrencyCode, Result<T, SkipReason>)> for ModelOutput<T> {
    fn from_iter<I: IntoIterator<Item = (CurrencyCode, Result<T, SkipReason>)>>(iter: I) -> Self {
        let mut output = ModelOutput::new();
        for (currency, outcome) in iter {
            output.record(&currency, outcome);
        }
        output
    }
}
