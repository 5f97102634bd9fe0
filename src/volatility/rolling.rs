use crate::config::AnalysisConfig;
use crate::core::currency::CurrencyCode;
use crate::core::observation::ObservationSet;
use crate::volatility::stats::sample_std;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Annualized rolling volatility of one currency, aligned to its dates.
///
/// `None` marks positions where the trailing window is incomplete or
/// contains a missing return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingSeries {
    pub currency: CurrencyCode,
    pub points: Vec<(NaiveDate, Option<f64>)>,
}

impl RollingSeries {
    /// The defined values, in date order.
    pub fn defined(&self) -> Vec<f64> {
        self.points.iter().filter_map(|(_, v)| *v).collect()
    }

    /// Most recent defined value.
    pub fn latest(&self) -> Option<f64> {
        self.latest_point().map(|(_, v)| v)
    }

    /// Most recent defined value with its date.
    pub fn latest_point(&self) -> Option<(NaiveDate, f64)> {
        self.points
            .iter()
            .rev()
            .find_map(|(d, v)| v.map(|v| (*d, v)))
    }
}

/// Trailing-window standard deviation of log-returns, annualized.
///
/// # Examples
///
/// ```
/// use fx_threshold_engine::volatility::rolling::RollingVolatility;
///
/// let rv = RollingVolatility::new(3, 1.0);
/// let out = rv.series(&[Some(1.0), Some(2.0), Some(3.0), Some(5.0)]);
/// assert_eq!(out[0], None);
/// assert_eq!(out[1], None);
/// assert_eq!(out[2], Some(1.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollingVolatility {
    window: usize,
    annualization: f64,
}

impl RollingVolatility {
    pub fn new(window: usize, annualization: f64) -> Self {
        Self {
            window,
            annualization,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.rolling_window, config.annualization())
    }

    /// Rolling volatility for one chronologically ordered return series.
    ///
    /// Position `i` is `stdev(values[i-W+1..=i]) × annualization` when all
    /// `W` values are present, `None` otherwise.
    pub fn series(&self, values: &[Option<f64>]) -> Vec<Option<f64>> {
        let w = self.window;
        let mut out = vec![None; values.len()];
        if w == 0 || values.len() < w {
            return out;
        }
        for end in (w - 1)..values.len() {
            let window: Option<Vec<f64>> = values[end + 1 - w..=end].iter().copied().collect();
            out[end] = window
                .and_then(|v| sample_std(&v))
                .map(|sd| sd * self.annualization);
        }
        out
    }

    /// Rolling volatility for every currency in the set.
    ///
    /// Always recomputed from the observations; nothing is carried between
    /// calls.
    pub fn compute(&self, set: &ObservationSet) -> BTreeMap<CurrencyCode, RollingSeries> {
        set.by_currency()
            .into_iter()
            .map(|(currency, series)| {
                let returns: Vec<Option<f64>> = series.iter().map(|o| o.log_return()).collect();
                let vols = self.series(&returns);
                let points = series.iter().map(|o| o.date()).zip(vols).collect();
                let rolling = RollingSeries {
                    currency: currency.clone(),
                    points,
                };
                (currency, rolling)
            })
            .collect()
    }
}
