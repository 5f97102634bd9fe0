//! Per-currency volatility thresholds: fixed manual bands, historical
//! percentiles and z-score regime shifts.

pub mod manual;
pub mod regime;
pub mod statistical;
