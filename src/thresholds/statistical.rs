use crate::core::currency::CurrencyCode;
use crate::core::outcome::{ModelOutput, SkipReason};
use crate::volatility::rolling::RollingSeries;
use crate::volatility::stats::percentile;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Statistical threshold of one currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalRow {
    pub currency: CurrencyCode,
    pub percentile: f64,
    /// Percentile of the historical rolling-volatility distribution.
    pub threshold: f64,
    /// Latest defined rolling volatility over the full series.
    pub latest_vol: f64,
    pub flag: bool,
}

/// Upper-percentile threshold on historical rolling volatility.
#[derive(Debug, Clone, Copy)]
pub struct StatisticalThreshold {
    percentile: f64,
}

impl StatisticalThreshold {
    pub fn new(percentile: f64) -> Self {
        Self { percentile }
    }

    /// Threshold and flag for one currency.
    pub fn evaluate(
        &self,
        currency: &CurrencyCode,
        historical: &RollingSeries,
        full: Option<&RollingSeries>,
    ) -> Result<StatisticalRow, SkipReason> {
        let threshold =
            percentile(&historical.defined(), self.percentile).ok_or(SkipReason::NoDefinedVolatility)?;
        let latest_vol = full
            .and_then(|s| s.latest())
            .ok_or(SkipReason::NoDefinedVolatility)?;
        Ok(StatisticalRow {
            currency: currency.clone(),
            percentile: self.percentile,
            threshold,
            latest_vol,
            flag: latest_vol > threshold,
        })
    }

    /// Evaluate every currency with a historical rolling series.
    pub fn compute(
        &self,
        historical: &BTreeMap<CurrencyCode, RollingSeries>,
        full: &BTreeMap<CurrencyCode, RollingSeries>,
    ) -> ModelOutput<StatisticalRow> {
        let output: ModelOutput<StatisticalRow> = historical
            .iter()
            .map(|(currency, series)| {
                (
                    currency.clone(),
                    self.evaluate(currency, series, full.get(currency)),
                )
            })
            .collect();
        info!(
            "statistical p{}: {} thresholds, {} skipped",
            self.percentile,
            output.len(),
            output.skipped().len()
        );
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn series(ccy: &str, values: &[Option<f64>]) -> RollingSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        RollingSeries {
            currency: CurrencyCode::new(ccy),
            points: values
                .iter()
                .enumerate()
                .map(|(i, v)| (start + chrono::Duration::days(i as i64), *v))
                .collect(),
        }
    }

    #[test]
    fn test_flag_when_latest_exceeds_percentile() {
        let hist = series("EURUSD", &[None, Some(0.1), Some(0.2), Some(0.3), Some(0.4), Some(0.5)]);
        let full = series("EURUSD", &[None, Some(0.1), Some(0.2), Some(0.3), Some(0.4), Some(0.5), Some(0.9)]);
        let row = StatisticalThreshold::new(95.0)
            .evaluate(&CurrencyCode::new("EURUSD"), &hist, Some(&full))
            .unwrap();
        // h = 4 * 0.95 = 3.8 → 0.4 + 0.8 * 0.1
        assert!((row.threshold - 0.48).abs() < 1e-12);
        assert_eq!(row.latest_vol, 0.9);
        assert!(row.flag);
    }

    #[test]
    fn test_latest_uses_full_series_last_defined() {
        let hist = series("EURUSD", &[Some(0.5), Some(0.5)]);
        let full = series("EURUSD", &[Some(0.5), Some(0.5), Some(0.1), None]);
        let row = StatisticalThreshold::new(95.0)
            .evaluate(&CurrencyCode::new("EURUSD"), &hist, Some(&full))
            .unwrap();
        assert_eq!(row.latest_vol, 0.1);
        assert!(!row.flag);
    }

    #[test]
    fn test_undefined_history_is_skipped() {
        let mut historical = BTreeMap::new();
        historical.insert(CurrencyCode::new("EURUSD"), series("EURUSD", &[None, None]));
        historical.insert(CurrencyCode::new("GBPUSD"), series("GBPUSD", &[Some(0.2)]));
        let full = historical.clone();

        let output = StatisticalThreshold::new(95.0).compute(&historical, &full);
        assert_eq!(output.len(), 1);
        assert_eq!(output.rows()[0].currency.as_str(), "GBPUSD");
        assert_eq!(
            output.skip_reason(&CurrencyCode::new("EURUSD")),
            Some(&SkipReason::NoDefinedVolatility)
        );
    }
}
