//! Synthetic FX data for testing and benchmarking.
//!
//! Generates seeded GARCH(1,1) return paths per currency so that every
//! model in the engine has realistic, reproducible input.

use crate::core::currency::CurrencyCode;
use crate::core::observation::{Observation, ObservationSet};
use crate::core::trade::{Trade, TradeSet};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Configuration for generating an FX observation table.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Currencies to generate.
    pub currencies: Vec<CurrencyCode>,
    /// Business days per currency.
    pub days: usize,
    /// First calendar date (moved forward to a weekday if needed).
    pub start: NaiveDate,
    /// GARCH constant term of the daily variance.
    pub omega: f64,
    /// ARCH coefficient.
    pub alpha: f64,
    /// GARCH coefficient.
    pub beta: f64,
    /// RNG seed; the same seed always produces the same table.
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            currencies: ["EURUSD", "GBPUSD", "JPYUSD", "INRUSD", "EURJPY", "INRJPY"]
                .into_iter()
                .map(CurrencyCode::new)
                .collect(),
            days: 500,
            start: NaiveDate::from_ymd_opt(2022, 1, 3).unwrap_or_default(),
            omega: 2e-6,
            alpha: 0.08,
            beta: 0.9,
            seed: 42,
        }
    }
}

/// Standard normal draw via Box-Muller.
pub fn standard_normal(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Simulate `n` GARCH(1,1) returns with zero mean.
///
/// Returns the return path and the conditional volatility that produced
/// each return.
pub fn garch_path(
    n: usize,
    omega: f64,
    alpha: f64,
    beta: f64,
    rng: &mut impl Rng,
) -> (Vec<f64>, Vec<f64>) {
    let persistence = alpha + beta;
    let mut sigma2 = if persistence < 1.0 {
        omega / (1.0 - persistence)
    } else {
        omega * 100.0
    };
    let mut returns = Vec::with_capacity(n);
    let mut vols = Vec::with_capacity(n);
    for _ in 0..n {
        let sigma = sigma2.sqrt();
        let r = sigma * standard_normal(rng);
        returns.push(r);
        vols.push(sigma);
        sigma2 = omega + alpha * r * r + beta * sigma2;
    }
    (returns, vols)
}

/// The next `n` business days starting at `start` (inclusive).
pub fn business_days(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(n);
    let mut d = start;
    while days.len() < n {
        if !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(d);
        }
        d += Duration::days(1);
    }
    days
}

/// Generate an FX observation table.
///
/// The first row of each currency has no log-return, like a price series
/// converted to returns. `VolatilityOHLC` is the conditional volatility
/// perturbed by ±20% noise.
pub fn generate_observations(config: &SyntheticConfig) -> ObservationSet {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let dates = business_days(config.start, config.days);
    let mut set = ObservationSet::new();

    for currency in &config.currencies {
        let (returns, vols) = garch_path(config.days, config.omega, config.alpha, config.beta, &mut rng);
        for (i, date) in dates.iter().enumerate() {
            let log_return = if i == 0 { None } else { Some(returns[i]) };
            let noise = rng.gen_range(0.8..1.2);
            set.add(Observation::new(
                *date,
                currency.clone(),
                log_return,
                vols[i] * noise,
            ));
        }
    }

    set
}

/// Generate a trade table against the given instruments.
///
/// Deviations are drawn uniformly from ±`max_deviation`.
pub fn generate_trades(
    instruments: &[CurrencyCode],
    count: usize,
    start: NaiveDate,
    max_deviation: f64,
    seed: u64,
) -> TradeSet {
    let mut rng = StdRng::seed_from_u64(seed);
    let dates = business_days(start, count.max(1));
    let mut set = TradeSet::new();
    if instruments.is_empty() {
        return set;
    }

    for date in dates.into_iter().take(count) {
        let instrument = instruments[rng.gen_range(0..instruments.len())].clone();
        let market = rng.gen_range(0.5..160.0);
        let deviation = rng.gen_range(-max_deviation..max_deviation);
        let deal = market * (1.0 + deviation);
        set.add(Trade::new(date, instrument, deal, market, deviation));
    }

    set
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_shape() {
        let config = SyntheticConfig {
            currencies: vec![CurrencyCode::new("EURUSD"), CurrencyCode::new("GBPUSD")],
            days: 120,
            ..Default::default()
        };
        let set = generate_observations(&config);
        assert_eq!(set.len(), 240);
        assert_eq!(set.currencies().len(), 2);

        let groups = set.by_currency();
        for series in groups.values() {
            assert_eq!(series.len(), 120);
            assert!(series[0].log_return().is_none());
            assert!(series[1..].iter().all(|o| o.log_return().is_some()));
            assert!(series.iter().all(|o| o.volatility_ohlc() > 0.0));
        }
    }

    #[test]
    fn test_generation_is_seeded() {
        let config = SyntheticConfig {
            days: 50,
            ..Default::default()
        };
        let a = generate_observations(&config);
        let b = generate_observations(&config);
        assert_eq!(a.observations(), b.observations());
    }

    #[test]
    fn test_business_days_skip_weekends() {
        // 2024-01-05 is a Friday
        let start = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let days = business_days(start, 2);
        assert_eq!(days[1], NaiveDate::from_ymd_opt(2024, 1, 8).unwrap());
    }

    #[test]
    fn test_trade_generation() {
        let instruments = vec![CurrencyCode::new("EURUSD")];
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let trades = generate_trades(&instruments, 10, start, 0.1, 7);
        assert_eq!(trades.len(), 10);
        assert!(trades.trades().iter().all(|t| t.abs_dev() <= 0.1));
    }
}
