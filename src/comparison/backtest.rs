//! Trade-level backtest of volatility thresholds.
//!
//! Manual and statistical thresholds are annualized volatilities in rate
//! units. Dividing by the instrument's quote rate turns them into deviation
//! percentages that can be compared directly with each trade's
//! `|DeviationPct|`.

use super::comparator::ThresholdComparison;
use crate::core::currency::{CurrencyCode, QuoteLookup, QuoteRateTable};
use crate::core::trade::{Trade, TradeSet};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Deviation-percentage thresholds for one currency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviationThresholds {
    pub manual_pct: f64,
    /// `None` when the currency has no statistical threshold.
    pub stat_pct: Option<f64>,
    pub quote: QuoteLookup,
}

impl DeviationThresholds {
    pub fn from_comparison(row: &ThresholdComparison, quotes: &QuoteRateTable) -> Self {
        let quote = quotes.lookup(&row.currency);
        if quote.is_fallback() {
            warn!("no quote rate for {}, using divisor 1", row.currency);
        }
        Self {
            manual_pct: quote.convert(row.manual_threshold),
            stat_pct: row.statistical_threshold.map(|t| quote.convert(t)),
            quote,
        }
    }
}

/// Result of joining a trade's instrument to the threshold table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ThresholdMatch {
    Matched(DeviationThresholds),
    Unmatched,
}

impl ThresholdMatch {
    pub fn thresholds(&self) -> Option<&DeviationThresholds> {
        match self {
            ThresholdMatch::Matched(t) => Some(t),
            ThresholdMatch::Unmatched => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRow {
    pub trade: Trade,
    pub abs_dev: f64,
    pub thresholds: ThresholdMatch,
    pub flag_manual: bool,
    pub flag_stat: bool,
}

impl TradeRow {
    pub fn key(&self) -> String {
        self.trade.key()
    }
}

/// Number of trades each model flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagCounts {
    pub flag_manual: usize,
    pub flag_stat: usize,
}

/// Per-trade backtest output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub rows: Vec<TradeRow>,
    pub counts: FlagCounts,
    /// Instruments with no threshold row, in sorted order.
    pub unmatched_instruments: Vec<CurrencyCode>,
}

impl BacktestReport {
    /// First trade whose key is `key`.
    pub fn detail(&self, key: &str) -> Option<TradeDetail<'_>> {
        self.rows
            .iter()
            .find(|r| r.key() == key)
            .map(|row| TradeDetail { row })
    }

    /// Distinct trade keys in first-seen order.
    pub fn keys(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.rows
            .iter()
            .map(|r| r.key())
            .filter(|k| seen.insert(k.clone()))
            .collect()
    }
}

impl fmt::Display for BacktestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Trade Backtest (% Deviation) ===")?;
        writeln!(
            f,
            "{:<10} {:<10} {:>12} {:>12} {:>10} {:>10} {:>10} {:>7} {:>7}",
            "Date", "Instrument", "DealRate", "MarketRate", "AbsDev", "ManualPct", "StatPct", "Manual", "Stat"
        )?;
        for row in &self.rows {
            let (manual, stat) = match row.thresholds.thresholds() {
                Some(t) => (format!("{:.5}", t.manual_pct), pct(t.stat_pct)),
                None => ("-".to_string(), "-".to_string()),
            };
            writeln!(
                f,
                "{:<10} {:<10} {:>12.5} {:>12.5} {:>10.5} {:>10} {:>10} {:>7} {:>7}",
                row.trade.trade_date().format("%Y-%m-%d").to_string(),
                row.trade.instrument().as_str(),
                row.trade.deal_rate(),
                row.trade.all_in_market_rate(),
                row.abs_dev,
                manual,
                stat,
                row.flag_manual,
                row.flag_stat
            )?;
        }
        writeln!(f, "\nTrades Flagged:")?;
        writeln!(f, "  Flag_Manual: {}", self.counts.flag_manual)?;
        writeln!(f, "  Flag_Stat:   {}", self.counts.flag_stat)?;
        if !self.unmatched_instruments.is_empty() {
            let names: Vec<&str> = self.unmatched_instruments.iter().map(|c| c.as_str()).collect();
            writeln!(f, "  Unmatched instruments: {}", names.join(", "))?;
        }
        Ok(())
    }
}

fn pct(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.5}", v))
}

/// Explanation of a single trade's flags.
#[derive(Debug, Clone, Copy)]
pub struct TradeDetail<'a> {
    pub row: &'a TradeRow,
}

impl fmt::Display for TradeDetail<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let row = self.row;
        writeln!(f, "Details for {}", row.key())?;
        writeln!(f, "- Deal Rate: {}", row.trade.deal_rate())?;
        writeln!(f, "- Market Rate: {}", row.trade.all_in_market_rate())?;
        writeln!(f, "- % Deviation: {:.5}", row.abs_dev)?;
        match row.thresholds {
            ThresholdMatch::Matched(t) => {
                writeln!(f, "- Manual Threshold (%): {:.5}", t.manual_pct)?;
                writeln!(f, "- Statistical Threshold (%): {}", pct(t.stat_pct))?;
                if t.quote.is_fallback() {
                    writeln!(f, "- Quote rate: none (divisor 1)")?;
                } else {
                    writeln!(f, "- Quote rate: {}", t.quote.divisor())?;
                }
            }
            ThresholdMatch::Unmatched => {
                writeln!(f, "- Thresholds: none for {}", row.trade.instrument())?;
            }
        }
        writeln!(f, "- Manual Flag: {}", row.flag_manual)?;
        write!(f, "- Statistical Flag: {}", row.flag_stat)
    }
}

/// Flags trades whose absolute deviation exceeds the converted thresholds.
#[derive(Debug, Clone)]
pub struct TradeBacktester {
    thresholds: BTreeMap<CurrencyCode, DeviationThresholds>,
}

impl TradeBacktester {
    pub fn new(table: &[ThresholdComparison], quotes: &QuoteRateTable) -> Self {
        let thresholds = table
            .iter()
            .map(|row| (row.currency.clone(), DeviationThresholds::from_comparison(row, quotes)))
            .collect();
        Self { thresholds }
    }

    pub fn thresholds(&self, currency: &CurrencyCode) -> ThresholdMatch {
        match self.thresholds.get(currency) {
            Some(t) => ThresholdMatch::Matched(*t),
            None => ThresholdMatch::Unmatched,
        }
    }

    pub fn evaluate(&self, trade: &Trade) -> TradeRow {
        let abs_dev = trade.abs_dev();
        let thresholds = self.thresholds(trade.instrument());
        let (flag_manual, flag_stat) = match &thresholds {
            ThresholdMatch::Matched(t) => (
                abs_dev > t.manual_pct,
                t.stat_pct.map_or(false, |s| abs_dev > s),
            ),
            ThresholdMatch::Unmatched => (false, false),
        };
        TradeRow {
            trade: trade.clone(),
            abs_dev,
            thresholds,
            flag_manual,
            flag_stat,
        }
    }

    pub fn run(&self, trades: &TradeSet) -> BacktestReport {
        let rows: Vec<TradeRow> = trades.trades().iter().map(|t| self.evaluate(t)).collect();

        let counts = FlagCounts {
            flag_manual: rows.iter().filter(|r| r.flag_manual).count(),
            flag_stat: rows.iter().filter(|r| r.flag_stat).count(),
        };

        let unmatched_instruments: Vec<CurrencyCode> = rows
            .iter()
            .filter(|r| r.thresholds == ThresholdMatch::Unmatched)
            .map(|r| r.trade.instrument().clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        for instrument in &unmatched_instruments {
            warn!("no threshold row for instrument {}", instrument);
        }

        info!(
            "backtest: {} trades, {} manual flags, {} statistical flags",
            rows.len(),
            counts.flag_manual,
            counts.flag_stat
        );

        BacktestReport {
            rows,
            counts,
            unmatched_instruments,
        }
    }
}
