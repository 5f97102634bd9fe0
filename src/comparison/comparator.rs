use crate::anomaly::AnomalyReport;
use crate::core::currency::CurrencyCode;
use crate::core::outcome::ModelOutput;
use crate::thresholds::manual::ManualRow;
use crate::thresholds::regime::RegimeRow;
use crate::thresholds::statistical::StatisticalRow;
use crate::volatility::garch::GarchRow;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Manual and statistical thresholds side by side for one currency.
///
/// This is the threshold table the trade backtester converts into
/// deviation percentages. Every manual row appears; the statistical side is
/// `None` when the currency has no statistical threshold (for example, a
/// history shorter than the rolling window).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdComparison {
    pub currency: CurrencyCode,
    pub avg_volatility_ohlc: f64,
    pub avg_ann_vol: f64,
    pub manual_group: u8,
    pub manual_threshold: f64,
    pub statistical_threshold: Option<f64>,
    pub current_vol: Option<f64>,
    pub flag_manual: bool,
    pub flag_statistical: bool,
}

/// Left-join statistical rows onto manual rows. Currencies without a
/// manual row are left out; those without a statistical row keep their
/// manual threshold and are never flagged.
pub fn manual_vs_statistical(
    manual: &ModelOutput<ManualRow>,
    statistical: &ModelOutput<StatisticalRow>,
) -> Vec<ThresholdComparison> {
    let stats: BTreeMap<&CurrencyCode, &StatisticalRow> =
        statistical.rows().iter().map(|r| (&r.currency, r)).collect();

    manual
        .rows()
        .iter()
        .map(|m| {
            let s = stats.get(&m.currency);
            let current_vol = s.map(|s| s.latest_vol);
            ThresholdComparison {
                currency: m.currency.clone(),
                avg_volatility_ohlc: m.avg_volatility_ohlc,
                avg_ann_vol: m.avg_ann_vol,
                manual_group: m.manual_group,
                manual_threshold: m.manual_threshold,
                statistical_threshold: s.map(|s| s.threshold),
                current_vol,
                flag_manual: current_vol.map_or(false, |v| v > m.manual_threshold),
                flag_statistical: s.map_or(false, |s| s.flag),
            }
        })
        .collect()
}

/// Every model's flag for one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub currency: CurrencyCode,
    pub flag_manual: bool,
    pub flag_statistical: bool,
    pub flag_garch: bool,
    pub flag_if: bool,
    pub flag_ocsvm: bool,
    pub flag_regime: bool,
}

impl ComparisonRow {
    fn new(currency: CurrencyCode) -> Self {
        Self {
            currency,
            flag_manual: false,
            flag_statistical: false,
            flag_garch: false,
            flag_if: false,
            flag_ocsvm: false,
            flag_regime: false,
        }
    }

    /// Number of models flagging this currency.
    pub fn flag_count(&self) -> usize {
        [
            self.flag_manual,
            self.flag_statistical,
            self.flag_garch,
            self.flag_if,
            self.flag_ocsvm,
            self.flag_regime,
        ]
        .iter()
        .filter(|&&f| f)
        .count()
    }
}

/// Outer-joins per-model flags on currency. A currency absent from a model
/// gets `false` for that model.
pub struct ModelComparator;

impl ModelComparator {
    pub fn compare(
        thresholds: &[ThresholdComparison],
        garch: &ModelOutput<GarchRow>,
        anomaly: &AnomalyReport,
        regime: &ModelOutput<RegimeRow>,
    ) -> Vec<ComparisonRow> {
        let mut table: BTreeMap<CurrencyCode, ComparisonRow> = BTreeMap::new();

        for row in thresholds {
            let e = entry(&mut table, &row.currency);
            e.flag_manual = row.flag_manual;
            e.flag_statistical = row.flag_statistical;
        }
        for row in garch.rows() {
            entry(&mut table, &row.currency).flag_garch = row.flag_garch;
        }
        for row in &anomaly.rows {
            let e = entry(&mut table, &row.currency);
            e.flag_if = row.flag_if();
            e.flag_ocsvm = row.flag_ocsvm();
        }
        for row in regime.rows() {
            entry(&mut table, &row.currency).flag_regime = row.flag_regime;
        }

        let rows: Vec<ComparisonRow> = table.into_values().collect();
        info!(
            "comparison: {} currencies, {} flagged by at least one model",
            rows.len(),
            rows.iter().filter(|r| r.flag_count() > 0).count()
        );
        rows
    }
}

fn entry<'a>(
    table: &'a mut BTreeMap<CurrencyCode, ComparisonRow>,
    currency: &CurrencyCode,
) -> &'a mut ComparisonRow {
    table
        .entry(currency.clone())
        .or_insert_with(|| ComparisonRow::new(currency.clone()))
}
