//! Cross-sectional anomaly detection.
//!
//! Every currency is summarized by a `(volatility, skewness, kurtosis)`
//! feature vector and two unsupervised detectors are fitted on, and applied
//! to, the same table:
//! - [`IsolationForest`]: short average isolation path ⇒ anomalous
//! - [`OneClassSvm`]: non-positive RBF decision value ⇒ anomalous

pub mod features;
pub mod isolation_forest;
pub mod one_class_svm;

pub use features::{FeatureRow, FeatureVector};
pub use isolation_forest::IsolationForest;
pub use one_class_svm::OneClassSvm;

use crate::config::AnalysisConfig;
use crate::core::currency::CurrencyCode;
use crate::core::observation::ObservationSet;
use crate::core::outcome::{SkipReason, SkippedCurrency};
use log::{info, warn};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest table the detectors are fitted on.
pub const MIN_CURRENCIES: usize = 2;

#[derive(Debug, Error)]
pub enum AnomalyError {
    #[error("empty training data")]
    EmptyData,
    #[error("detector used before fit")]
    NotFitted,
    #[error("expected {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("solver did not converge after {0} iterations")]
    ConvergenceFailed(usize),
}

impl From<AnomalyError> for SkipReason {
    fn from(e: AnomalyError) -> Self {
        SkipReason::FitFailed {
            reason: e.to_string(),
        }
    }
}

/// Per-row output of one detector.
#[derive(Debug, Clone)]
pub struct AnomalyResult {
    pub is_anomaly: Vec<bool>,
    /// Detector-specific score: isolation score for the forest, decision
    /// value for the SVM.
    pub scores: Vec<f64>,
}

impl AnomalyResult {
    pub fn new(is_anomaly: Vec<bool>, scores: Vec<f64>) -> Self {
        Self { is_anomaly, scores }
    }

    pub fn anomaly_count(&self) -> usize {
        self.is_anomaly.iter().filter(|&&x| x).count()
    }
}

/// A detector fitted on a feature matrix.
pub trait MultivariateDetector {
    fn fit(&mut self, data: &Array2<f64>) -> Result<(), AnomalyError>;

    fn detect(&self, data: &Array2<f64>) -> Result<AnomalyResult, AnomalyError>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFlags {
    pub isolation_score: f64,
    pub flag_if: bool,
    pub ocsvm_decision: f64,
    pub flag_ocsvm: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRow {
    pub currency: CurrencyCode,
    pub features: FeatureVector,
    /// `None` when detection was skipped for the whole table.
    pub flags: Option<AnomalyFlags>,
}

impl AnomalyRow {
    pub fn flag_if(&self) -> bool {
        self.flags.is_some_and(|f| f.flag_if)
    }

    pub fn flag_ocsvm(&self) -> bool {
        self.flags.is_some_and(|f| f.flag_ocsvm)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub rows: Vec<AnomalyRow>,
    /// Currencies without a valid feature vector.
    pub excluded: Vec<SkippedCurrency>,
    /// Set when the detectors were not run at all.
    pub skipped: Option<SkipReason>,
}

impl AnomalyReport {
    pub fn row(&self, currency: &CurrencyCode) -> Option<&AnomalyRow> {
        self.rows.iter().find(|r| &r.currency == currency)
    }
}

/// Runs both detectors over the historical feature table.
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    pub seed: u64,
    pub trees: usize,
    pub nu: f64,
    pub max_svm_iterations: usize,
    annualization: f64,
}

impl AnomalyDetector {
    pub fn new(seed: u64, trees: usize, nu: f64, annualization: f64) -> Self {
        Self {
            seed,
            trees,
            nu,
            max_svm_iterations: one_class_svm::DEFAULT_MAX_ITERATIONS,
            annualization,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(
            config.anomaly_seed,
            config.isolation_trees,
            config.ocsvm_nu,
            config.annualization(),
        )
    }

    pub fn detect(&self, historical: &ObservationSet) -> AnomalyReport {
        let table = features::feature_table(historical, self.annualization);
        let excluded = table.skipped().to_vec();
        let valid = table.rows();

        let flags = if valid.len() < MIN_CURRENCIES {
            Err(SkipReason::InsufficientCurrencies {
                required: MIN_CURRENCIES,
                available: valid.len(),
            })
        } else {
            self.fit_predict(&features::to_matrix(valid))
        };

        let (flags, skipped) = match flags {
            Ok(flags) => (flags.into_iter().map(Some).collect::<Vec<_>>(), None),
            Err(reason) => {
                warn!("anomaly detection skipped: {}", reason);
                (vec![None; valid.len()], Some(reason))
            }
        };

        let rows: Vec<AnomalyRow> = valid
            .iter()
            .zip(flags)
            .map(|(row, flags)| AnomalyRow {
                currency: row.currency.clone(),
                features: row.features,
                flags,
            })
            .collect();

        info!(
            "anomaly: {} currencies, {} IF flags, {} OCSVM flags",
            rows.len(),
            rows.iter().filter(|r| r.flag_if()).count(),
            rows.iter().filter(|r| r.flag_ocsvm()).count()
        );

        AnomalyReport {
            rows,
            excluded,
            skipped,
        }
    }

    fn fit_predict(&self, data: &Array2<f64>) -> Result<Vec<AnomalyFlags>, SkipReason> {
        let mut forest = IsolationForest::new(self.trees, self.seed);
        let mut svm = OneClassSvm::new(self.nu).with_max_iterations(self.max_svm_iterations);

        let forest_result = run(&mut forest, data)?;
        let svm_result = run(&mut svm, data)?;

        Ok((0..data.nrows())
            .map(|i| AnomalyFlags {
                isolation_score: forest_result.scores[i],
                flag_if: forest_result.is_anomaly[i],
                ocsvm_decision: svm_result.scores[i],
                flag_ocsvm: svm_result.is_anomaly[i],
            })
            .collect())
    }
}

fn run(detector: &mut dyn MultivariateDetector, data: &Array2<f64>) -> Result<AnomalyResult, SkipReason> {
    detector.fit(data)?;
    let result = detector.detect(data)?;
    info!("{}: {} of {} anomalous", detector.name(), result.anomaly_count(), data.nrows());
    Ok(result)
}
