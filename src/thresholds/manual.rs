use crate::core::currency::CurrencyCode;
use crate::core::observation::ObservationSet;
use crate::core::outcome::{ModelOutput, SkipReason};
use crate::volatility::stats::mean;
use serde::{Deserialize, Serialize};

/// One half-open volatility band `[lower, upper)` and its deviation threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManualBand {
    pub group: u8,
    pub lower: f64,
    pub upper: f64,
    pub threshold: f64,
}

impl ManualBand {
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value < self.upper
    }
}

/// Result of classifying one average volatility.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManualClassification {
    pub group: u8,
    pub threshold: f64,
}

/// The fixed, ordered partition of `[0, ∞)` used for manual thresholds.
///
/// # Examples
///
/// ```
/// use fx_threshold_engine::thresholds::manual::ManualBands;
///
/// let bands = ManualBands::default();
/// assert_eq!(bands.classify(0.07).group, 2);
/// assert_eq!(bands.classify(5.0).threshold, 0.70);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualBands {
    bands: [ManualBand; 4],
}

impl Default for ManualBands {
    fn default() -> Self {
        Self {
            bands: [
                ManualBand { group: 1, lower: 0.00, upper: 0.07, threshold: 0.07 },
                ManualBand { group: 2, lower: 0.07, upper: 0.50, threshold: 0.50 },
                ManualBand { group: 3, lower: 0.50, upper: 0.60, threshold: 0.60 },
                ManualBand { group: 4, lower: 0.60, upper: f64::INFINITY, threshold: 0.70 },
            ],
        }
    }
}

impl ManualBands {
    pub fn bands(&self) -> &[ManualBand; 4] {
        &self.bands
    }

    /// First band containing `value`; the last band when none does.
    pub fn classify(&self, value: f64) -> ManualClassification {
        let band = self
            .bands
            .iter()
            .find(|b| b.contains(value))
            .unwrap_or(&self.bands[3]);
        ManualClassification {
            group: band.group,
            threshold: band.threshold,
        }
    }
}

/// Manual classification of one currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualRow {
    pub currency: CurrencyCode,
    /// Mean daily OHLC volatility over the historical window.
    pub avg_volatility_ohlc: f64,
    /// `avg_volatility_ohlc` annualized.
    pub avg_ann_vol: f64,
    pub manual_group: u8,
    pub manual_threshold: f64,
}

/// Assigns each currency to a manual band from its average OHLC volatility.
#[derive(Debug, Clone)]
pub struct ManualBandClassifier {
    bands: ManualBands,
    annualization: f64,
}

impl ManualBandClassifier {
    pub fn new(bands: ManualBands, annualization: f64) -> Self {
        Self {
            bands,
            annualization,
        }
    }

    /// Classify every currency present in the historical window.
    pub fn classify(&self, historical: &ObservationSet) -> ModelOutput<ManualRow> {
        historical
            .by_currency()
            .into_iter()
            .map(|(currency, series)| {
                let vols: Vec<f64> = series.iter().map(|o| o.volatility_ohlc()).collect();
                let outcome = mean(&vols)
                    .ok_or(SkipReason::InsufficientData {
                        required: 1,
                        available: 0,
                    })
                    .map(|avg| {
                        let avg_ann_vol = avg * self.annualization;
                        let class = self.bands.classify(avg_ann_vol);
                        ManualRow {
                            currency: currency.clone(),
                            avg_volatility_ohlc: avg,
                            avg_ann_vol,
                            manual_group: class.group,
                            manual_threshold: class.threshold,
                        }
                    });
                (currency, outcome)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::observation::Observation;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    #[test]
    fn test_lower_bounds_inclusive() {
        let bands = ManualBands::default();
        assert_eq!(bands.classify(0.0).group, 1);
        assert_eq!(bands.classify(0.0699).group, 1);
        assert_eq!(bands.classify(0.07).group, 2);
        assert_eq!(bands.classify(0.50).group, 3);
        assert_eq!(bands.classify(0.60).group, 4);
        assert_eq!(bands.classify(1e9).group, 4);
    }

    #[test]
    fn test_thresholds_per_band() {
        let bands = ManualBands::default();
        let got: Vec<f64> = [0.01, 0.2, 0.55, 0.9]
            .iter()
            .map(|v| bands.classify(*v).threshold)
            .collect();
        assert_eq!(got, vec![0.07, 0.50, 0.60, 0.70]);
    }

    #[test]
    fn test_bands_are_contiguous() {
        let bands = ManualBands::default();
        for pair in bands.bands().windows(2) {
            assert_eq!(pair[0].upper, pair[1].lower);
        }
        assert_eq!(bands.bands()[0].lower, 0.0);
        assert!(bands.bands()[3].upper.is_infinite());
    }

    #[test]
    fn test_classify_annualizes_average() {
        let mut set = ObservationSet::new();
        let d = |n| NaiveDate::from_ymd_opt(2024, 1, n).unwrap();
        set.add(Observation::new(d(1), "EURUSD".into(), None, 0.002));
        set.add(Observation::new(d(2), "EURUSD".into(), Some(0.001), 0.004));
        set.add(Observation::new(d(1), "INRUSD".into(), None, 0.05));

        let classifier = ManualBandClassifier::new(ManualBands::default(), 252f64.sqrt());
        let output = classifier.classify(&set);
        assert_eq!(output.len(), 2);

        let eur = &output.rows()[0];
        assert_eq!(eur.currency.as_str(), "EURUSD");
        assert_relative_eq!(eur.avg_ann_vol, 0.003 * 252f64.sqrt(), epsilon = 1e-12);
        assert_eq!(eur.manual_group, 1);

        let inr = &output.rows()[1];
        assert_eq!(inr.manual_group, 4);
        assert_eq!(inr.manual_threshold, 0.70);
    }
}
