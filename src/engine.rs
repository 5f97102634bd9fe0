//! End-to-end threshold run: rolling volatility, every model, the
//! comparison table and, given trades, the backtest.

use crate::anomaly::{AnomalyDetector, AnomalyReport};
use crate::comparison::backtest::{BacktestReport, TradeBacktester};
use crate::comparison::comparator::{manual_vs_statistical, ComparisonRow, ModelComparator, ThresholdComparison};
use crate::config::AnalysisConfig;
use crate::core::observation::ObservationSet;
use crate::core::outcome::{ModelOutput, SkippedCurrency};
use crate::core::trade::TradeSet;
use crate::thresholds::manual::{ManualBandClassifier, ManualBands, ManualRow};
use crate::thresholds::regime::{RegimeDetector, RegimeRow};
use crate::thresholds::statistical::{StatisticalRow, StatisticalThreshold};
use crate::volatility::garch::{GarchForecaster, GarchRow};
use crate::volatility::rolling::RollingVolatility;
use chrono::NaiveDate;
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Every per-currency view produced from one observation file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdReport {
    pub percentile: f64,
    pub max_date: Option<NaiveDate>,
    /// Last date of the historical calibration window.
    pub cutoff: Option<NaiveDate>,
    /// Statistical threshold and latest-volatility flag per currency.
    pub summary: ModelOutput<StatisticalRow>,
    pub manual: ModelOutput<ManualRow>,
    /// Manual vs statistical thresholds; also the backtest's threshold table.
    pub thresholds: Vec<ThresholdComparison>,
    pub garch: ModelOutput<GarchRow>,
    pub anomaly: AnomalyReport,
    pub regime: ModelOutput<RegimeRow>,
    pub comparison: Vec<ComparisonRow>,
}

/// Stateless driver tying the models together.
pub struct ThresholdEngine;

impl ThresholdEngine {
    pub fn run(observations: &ObservationSet, config: &AnalysisConfig) -> ThresholdReport {
        let annualization = config.annualization();
        let historical = observations.historical(config.lookback_days);
        info!(
            "run: {} observations, {} in historical window (cutoff {:?})",
            observations.len(),
            historical.len(),
            observations.cutoff(config.lookback_days)
        );

        let rolling = RollingVolatility::from_config(config);
        let full_vol = rolling.compute(observations);
        let hist_vol = rolling.compute(&historical);

        let summary = StatisticalThreshold::new(config.percentile).compute(&hist_vol, &full_vol);
        let manual = ManualBandClassifier::new(ManualBands::default(), annualization).classify(&historical);
        let thresholds = manual_vs_statistical(&manual, &summary);
        let garch = GarchForecaster::from_config(config).forecast(observations, &historical, &full_vol);
        let anomaly = AnomalyDetector::from_config(config).detect(&historical);
        let regime = RegimeDetector::new(config.regime_z_threshold).detect(&full_vol);
        let comparison = ModelComparator::compare(&thresholds, &garch, &anomaly, &regime);

        ThresholdReport {
            percentile: config.percentile,
            max_date: observations.max_date(),
            cutoff: observations.cutoff(config.lookback_days),
            summary,
            manual,
            thresholds,
            garch,
            anomaly,
            regime,
            comparison,
        }
    }

    /// Convert the report's threshold table into deviation percentages and
    /// flag every trade.
    pub fn backtest(report: &ThresholdReport, trades: &TradeSet, config: &AnalysisConfig) -> BacktestReport {
        TradeBacktester::new(&report.thresholds, &config.quote_rates).run(trades)
    }
}

fn write_skipped(f: &mut fmt::Formatter<'_>, skipped: &[SkippedCurrency]) -> fmt::Result {
    for s in skipped {
        writeln!(f, "  skipped {}: {}", s.currency, s.reason)?;
    }
    Ok(())
}

fn opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.4}", v))
}

impl fmt::Display for ThresholdReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Summary (p{}) ===", self.percentile)?;
        if let (Some(max), Some(cutoff)) = (self.max_date, self.cutoff) {
            writeln!(f, "Latest date: {}   Historical cutoff: {}", max, cutoff)?;
        }
        writeln!(f, "{:<10} {:>12} {:>10} {:>6}", "Currency", "Threshold", "LatestVol", "Flag")?;
        for r in self.summary.rows() {
            writeln!(
                f,
                "{:<10} {:>12.4} {:>10.4} {:>6}",
                r.currency.as_str(),
                r.threshold,
                r.latest_vol,
                r.flag
            )?;
        }
        write_skipped(f, self.summary.skipped())?;

        writeln!(f, "\n=== Manual vs Statistical Thresholds ===")?;
        writeln!(
            f,
            "{:<10} {:>10} {:>10} {:>5} {:>8} {:>8} {:>10} {:>7} {:>7}",
            "Currency", "AvgOHLC", "AvgAnnVol", "Group", "Manual", "Stat", "CurrentVol", "F_Man", "F_Stat"
        )?;
        for r in &self.thresholds {
            writeln!(
                f,
                "{:<10} {:>10.4} {:>10.4} {:>5} {:>8.4} {:>8} {:>10} {:>7} {:>7}",
                r.currency.as_str(),
                r.avg_volatility_ohlc,
                r.avg_ann_vol,
                r.manual_group,
                r.manual_threshold,
                opt(r.statistical_threshold),
                opt(r.current_vol),
                r.flag_manual,
                r.flag_statistical
            )?;
        }
        write_skipped(f, self.manual.skipped())?;

        writeln!(f, "\n=== GARCH(1,1) Forecast ===")?;
        writeln!(f, "{:<10} {:>10} {:>10} {:>6}", "Currency", "Forecast", "CurrentVol", "Flag")?;
        for r in self.garch.rows() {
            writeln!(
                f,
                "{:<10} {:>10.4} {:>10.4} {:>6}",
                r.currency.as_str(),
                r.garch_forecast,
                r.current_vol,
                r.flag_garch
            )?;
        }
        write_skipped(f, self.garch.skipped())?;

        writeln!(f, "\n=== ML Anomaly Detection ===")?;
        writeln!(
            f,
            "{:<10} {:>8} {:>8} {:>8} {:>7} {:>7}",
            "Currency", "Vol", "Skew", "Kurt", "IF", "OCSVM"
        )?;
        for r in &self.anomaly.rows {
            let (flag_if, flag_ocsvm) = match r.flags {
                Some(flags) => (flags.flag_if.to_string(), flags.flag_ocsvm.to_string()),
                None => ("-".to_string(), "-".to_string()),
            };
            writeln!(
                f,
                "{:<10} {:>8.4} {:>8.4} {:>8.4} {:>7} {:>7}",
                r.currency.as_str(),
                r.features.annualized_vol,
                r.features.skewness,
                r.features.kurtosis,
                flag_if,
                flag_ocsvm
            )?;
        }
        write_skipped(f, &self.anomaly.excluded)?;
        if let Some(reason) = &self.anomaly.skipped {
            writeln!(f, "  detection skipped: {}", reason)?;
        }

        writeln!(f, "\n=== Regime Shift Detection ===")?;
        writeln!(f, "{:<10} {:>8} {:>6}", "Currency", "ZScore", "Flag")?;
        for r in self.regime.rows() {
            writeln!(
                f,
                "{:<10} {:>8} {:>6}",
                r.currency.as_str(),
                opt(r.z_score),
                r.flag_regime
            )?;
        }
        write_skipped(f, self.regime.skipped())?;

        writeln!(f, "\n=== Model Comparison ===")?;
        writeln!(
            f,
            "{:<10} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7}",
            "Currency", "Manual", "Stat", "GARCH", "IF", "OCSVM", "Regime"
        )?;
        for r in &self.comparison {
            writeln!(
                f,
                "{:<10} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7}",
                r.currency.as_str(),
                r.flag_manual,
                r.flag_statistical,
                r.flag_garch,
                r.flag_if,
                r.flag_ocsvm,
                r.flag_regime
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::currency::CurrencyCode;
    use crate::core::trade::Trade;
    use crate::simulation::synthetic::{generate_observations, SyntheticConfig};

    fn report() -> (ThresholdReport, AnalysisConfig) {
        let config = AnalysisConfig::default();
        let observations = generate_observations(&SyntheticConfig {
            days: 300,
            ..SyntheticConfig::default()
        });
        (ThresholdEngine::run(&observations, &config), config)
    }

    #[test]
    fn test_run_covers_every_currency() {
        let (report, _) = report();
        assert_eq!(report.summary.len(), 6);
        assert_eq!(report.thresholds.len(), 6);
        assert_eq!(report.garch.len(), 6);
        assert_eq!(report.regime.len(), 6);
        assert_eq!(report.anomaly.rows.len(), 6);
        assert!(report.anomaly.skipped.is_none());
        assert_eq!(report.comparison.len(), 6);
    }

    #[test]
    fn test_cutoff_is_lookback_before_latest() {
        let (report, config) = report();
        let max = report.max_date.unwrap();
        assert_eq!(report.cutoff, Some(max - chrono::Duration::days(config.lookback_days)));
    }

    #[test]
    fn test_backtest_uses_threshold_table() {
        let (report, config) = report();
        let row = &report.thresholds[0];
        let trades: TradeSet = vec![
            Trade::new(report.max_date.unwrap(), row.currency.clone(), 1.0, 1.0, 1e6),
            Trade::new(report.max_date.unwrap(), CurrencyCode::new("XAUUSD"), 1.0, 1.0, 1e6),
        ]
        .into_iter()
        .collect();

        let bt = ThresholdEngine::backtest(&report, &trades, &config);
        assert_eq!(bt.counts.flag_manual, 1);
        assert_eq!(bt.counts.flag_stat, 1);
        assert_eq!(bt.unmatched_instruments, vec![CurrencyCode::new("XAUUSD")]);
    }

    #[test]
    fn test_display_lists_all_views() {
        let (report, _) = report();
        let text = report.to_string();
        for header in [
            "Summary",
            "Manual vs Statistical",
            "GARCH(1,1)",
            "ML Anomaly",
            "Regime Shift",
            "Model Comparison",
        ] {
            assert!(text.contains(header), "missing {}", header);
        }
    }
}
