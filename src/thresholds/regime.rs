//! Regime-shift detection on rolling volatility.
//!
//! Each currency's whole rolling-volatility history is z-scored and the
//! latest value is flagged when it sits more than the configured number of
//! standard deviations from the historical level.

use crate::core::currency::CurrencyCode;
use crate::core::outcome::{ModelOutput, SkipReason};
use crate::volatility::rolling::RollingSeries;
use crate::volatility::stats::{mean, sample_std};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Standard deviations at or below this are treated as zero.
pub const MIN_STD: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeRow {
    pub currency: CurrencyCode,
    /// z-score of the latest value; `None` when the series has no usable
    /// spread.
    pub z_score: Option<f64>,
    pub flag_regime: bool,
}

/// `true` when `|z|` strictly exceeds the threshold.
pub fn is_regime_shift(z: f64, threshold: f64) -> bool {
    z.abs() > threshold
}

/// z-score of the last element against the whole slice.
///
/// `None` for fewer than two values or a near-zero standard deviation.
pub fn latest_z_score(values: &[f64]) -> Option<f64> {
    let last = *values.last()?;
    let mu = mean(values)?;
    let sd = sample_std(values)?;
    if sd <= MIN_STD {
        return None;
    }
    let z = (last - mu) / sd;
    z.is_finite().then_some(z)
}

#[derive(Debug, Clone, Copy)]
pub struct RegimeDetector {
    z_threshold: f64,
}

impl RegimeDetector {
    pub fn new(z_threshold: f64) -> Self {
        Self { z_threshold }
    }

    pub fn evaluate(&self, series: &RollingSeries) -> Result<RegimeRow, SkipReason> {
        let values = series.defined();
        if values.is_empty() {
            return Err(SkipReason::NoDefinedVolatility);
        }
        let z_score = latest_z_score(&values);
        Ok(RegimeRow {
            currency: series.currency.clone(),
            z_score,
            flag_regime: z_score.is_some_and(|z| is_regime_shift(z, self.z_threshold)),
        })
    }

    /// Evaluate every currency over its full rolling history.
    pub fn detect(&self, full: &BTreeMap<CurrencyCode, RollingSeries>) -> ModelOutput<RegimeRow> {
        let output: ModelOutput<RegimeRow> = full
            .iter()
            .map(|(currency, series)| (currency.clone(), self.evaluate(series)))
            .collect();
        info!(
            "regime: {} currencies, {} flagged",
            output.len(),
            output.rows().iter().filter(|r| r.flag_regime).count()
        );
        output
    }
}
