//! Run-time configuration for a threshold analysis.
//!
//! Everything has a default matching the desk's reference setup, so an
//! empty JSON object is a valid configuration file.

use crate::core::currency::{QuoteError, QuoteRateTable};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const MIN_PERCENTILE: f64 = 90.0;
pub const MAX_PERCENTILE: f64 = 99.0;
/// Upper bound on `lookback_days` (one century).
pub const MAX_LOOKBACK_DAYS: i64 = 36_500;

/// Errors from building or validating an [`AnalysisConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("percentile must be within [90, 99], got {0}")]
    PercentileOutOfRange(f64),
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },
    #[error("lookback_days must be within [0, 36500], got {0}")]
    LookbackOutOfRange(i64),
    #[error("ocsvm nu must be within (0, 1], got {0}")]
    InvalidNu(f64),
    #[error(transparent)]
    Quote(#[from] QuoteError),
    #[error("cannot read config '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parameters shared by every model in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Upper percentile of historical rolling volatility used as the
    /// statistical threshold.
    pub percentile: f64,
    /// Trailing window for rolling volatility, in observations.
    pub rolling_window: usize,
    /// Trading days per year; volatility is scaled by its square root.
    pub trading_days: f64,
    /// Days held out of calibration at the end of the data.
    pub lookback_days: i64,
    /// Minimum non-null historical returns for a GARCH fit.
    pub garch_min_observations: usize,
    /// Current volatility must exceed the forecast by this factor to flag.
    pub garch_slack: f64,
    /// Absolute z-score above which a regime shift is flagged.
    pub regime_z_threshold: f64,
    /// Seed for the isolation forest.
    pub anomaly_seed: u64,
    /// Number of isolation trees.
    pub isolation_trees: usize,
    /// Outlier-fraction bound for the one-class SVM.
    pub ocsvm_nu: f64,
    /// Currency → spot rate divisors for the trade backtest.
    pub quote_rates: QuoteRateTable,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            percentile: 95.0,
            rolling_window: 60,
            trading_days: 252.0,
            lookback_days: 7,
            garch_min_observations: 100,
            garch_slack: 1.5,
            regime_z_threshold: 2.0,
            anomaly_seed: 42,
            isolation_trees: 100,
            ocsvm_nu: 0.1,
            quote_rates: QuoteRateTable::default(),
        }
    }
}

impl AnalysisConfig {
    /// Read a JSON configuration file and validate it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: AnalysisConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Same configuration with a different percentile.
    pub fn with_percentile(mut self, percentile: f64) -> Result<Self, ConfigError> {
        self.percentile = percentile;
        self.validate()?;
        Ok(self)
    }

    /// Square-root-of-time annualization factor (√252 by default).
    pub fn annualization(&self) -> f64 {
        self.trading_days.sqrt()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_PERCENTILE..=MAX_PERCENTILE).contains(&self.percentile) {
            return Err(ConfigError::PercentileOutOfRange(self.percentile));
        }
        let positives = [
            ("rolling_window", self.rolling_window as f64),
            ("trading_days", self.trading_days),
            ("garch_min_observations", self.garch_min_observations as f64),
            ("garch_slack", self.garch_slack),
            ("regime_z_threshold", self.regime_z_threshold),
            ("isolation_trees", self.isolation_trees as f64),
        ];
        for (name, value) in positives {
            if !(value > 0.0) || !value.is_finite() {
                return Err(ConfigError::NonPositive { name, value });
            }
        }
        if !(0..=MAX_LOOKBACK_DAYS).contains(&self.lookback_days) {
            return Err(ConfigError::LookbackOutOfRange(self.lookback_days));
        }
        if !(self.ocsvm_nu > 0.0 && self.ocsvm_nu <= 1.0) {
            return Err(ConfigError::InvalidNu(self.ocsvm_nu));
        }
        self.quote_rates.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults_are_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_relative_eq!(config.annualization(), 252f64.sqrt());
    }

    #[test]
    fn test_percentile_range() {
        assert!(AnalysisConfig::default().with_percentile(90.0).is_ok());
        assert!(AnalysisConfig::default().with_percentile(99.0).is_ok());
        assert!(matches!(
            AnalysisConfig::default().with_percentile(89.0),
            Err(ConfigError::PercentileOutOfRange(_))
        ));
        assert!(AnalysisConfig::default().with_percentile(99.5).is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{"percentile": 97, "quote_rates": {"EURUSD": 1.1}}"#).unwrap();
        assert_eq!(config.percentile, 97.0);
        assert_eq!(config.rolling_window, 60);
        assert_eq!(config.quote_rates.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, br#"{"garch_slack": 2.0}"#).unwrap();
        let config = AnalysisConfig::from_file(file.path()).unwrap();
        assert_eq!(config.garch_slack, 2.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = AnalysisConfig {
            garch_slack: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive { name: "garch_slack", .. })
        ));

        let config = AnalysisConfig {
            ocsvm_nu: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidNu(_))));
    }

    #[test]
    fn test_lookback_bounds() {
        let at_limit = AnalysisConfig {
            lookback_days: MAX_LOOKBACK_DAYS,
            ..Default::default()
        };
        assert!(at_limit.validate().is_ok());

        for lookback_days in [-1, MAX_LOOKBACK_DAYS + 1, 9_000_000_000_000] {
            let config = AnalysisConfig {
                lookback_days,
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::LookbackOutOfRange(v)) if v == lookback_days
            ));
        }
    }
}
