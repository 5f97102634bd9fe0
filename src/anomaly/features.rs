use crate::core::currency::CurrencyCode;
use crate::core::observation::ObservationSet;
use crate::core::outcome::{ModelOutput, SkipReason};
use crate::volatility::stats::{excess_kurtosis, sample_std, skewness};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

pub const FEATURE_COUNT: usize = 3;

/// Distribution summary of one currency's historical returns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub annualized_vol: f64,
    pub skewness: f64,
    pub kurtosis: f64,
}

impl FeatureVector {
    /// Compute the features of a return sample.
    pub fn from_returns(returns: &[f64], annualization: f64) -> Result<Self, SkipReason> {
        if returns.len() < 2 {
            return Err(SkipReason::InsufficientData {
                required: 2,
                available: returns.len(),
            });
        }
        let vol = sample_std(returns).ok_or(SkipReason::DegenerateVariance)?;
        let skew = skewness(returns).ok_or(SkipReason::DegenerateVariance)?;
        let kurt = excess_kurtosis(returns).ok_or(SkipReason::DegenerateVariance)?;
        Ok(Self {
            annualized_vol: vol * annualization,
            skewness: skew,
            kurtosis: kurt,
        })
    }

    pub fn as_array(&self) -> [f64; FEATURE_COUNT] {
        [self.annualized_vol, self.skewness, self.kurtosis]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub currency: CurrencyCode,
    pub features: FeatureVector,
}

/// Feature table over the historical window's non-null returns.
pub fn feature_table(historical: &ObservationSet, annualization: f64) -> ModelOutput<FeatureRow> {
    historical
        .returns_by_currency()
        .into_iter()
        .map(|(currency, returns)| {
            let outcome = FeatureVector::from_returns(&returns, annualization).map(|features| FeatureRow {
                currency: currency.clone(),
                features,
            });
            (currency, outcome)
        })
        .collect()
}

/// Stack feature rows into an `n × 3` matrix.
pub fn to_matrix(rows: &[FeatureRow]) -> Array2<f64> {
    Array2::from_shape_fn((rows.len(), FEATURE_COUNT), |(i, j)| {
        rows[i].features.as_array()[j]
    })
}
