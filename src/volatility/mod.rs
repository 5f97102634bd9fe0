//! Volatility estimation: descriptive statistics, rolling volatility and
//! GARCH(1,1) forecasting.

pub mod garch;
pub mod rolling;
pub mod stats;
