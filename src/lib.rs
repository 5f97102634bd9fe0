//! # fx-threshold-engine
//!
//! FX volatility thresholding and trade deviation backtesting.
//!
//! Given daily log-returns and OHLC volatility per currency pair, the engine
//! derives several independent "is this currency's volatility abnormal"
//! signals, merges them into one comparison table and converts the
//! volatility thresholds into deviation percentages for checking individual
//! trades.
//!
//! ## Architecture
//!
//! - **core** — Observations, trades, currency labels, quote rates, CSV I/O
//! - **volatility** — Rolling volatility, descriptive statistics, GARCH(1,1)
//! - **thresholds** — Manual bands, statistical percentiles, regime z-scores
//! - **anomaly** — Isolation forest and one-class SVM on return features
//! - **comparison** — Cross-model flag table and trade backtest
//! - **engine** — End-to-end run producing every view
//! - **simulation** — Seeded synthetic data for tests and benchmarks

pub mod anomaly;
pub mod comparison;
pub mod config;
pub mod core;
pub mod engine;
pub mod simulation;
pub mod thresholds;
pub mod volatility;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::comparison::backtest::{BacktestReport, TradeBacktester};
    pub use crate::comparison::comparator::{ComparisonRow, ModelComparator};
    pub use crate::config::AnalysisConfig;
    pub use crate::core::currency::{CurrencyCode, QuoteRateTable};
    pub use crate::core::observation::{Observation, ObservationSet};
    pub use crate::core::outcome::{ModelOutput, SkipReason};
    pub use crate::core::trade::{Trade, TradeSet};
    pub use crate::engine::{ThresholdEngine, ThresholdReport};
}
