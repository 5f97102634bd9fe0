//! Cross-model comparison and trade backtesting.

pub mod backtest;
pub mod comparator;
