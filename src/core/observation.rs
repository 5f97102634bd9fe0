use crate::core::currency::CurrencyCode;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One daily FX data point for one currency.
///
/// `log_return` is `None` where the source had no value, which normally only
/// happens on the first row of a series. `volatility_ohlc` is the daily
/// range-based volatility estimate supplied with the data.
///
/// # Examples
///
/// ```
/// use fx_threshold_engine::core::currency::CurrencyCode;
/// use fx_threshold_engine::core::observation::Observation;
/// use chrono::NaiveDate;
///
/// let obs = Observation::new(
///     NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
///     CurrencyCode::new("EURUSD"),
///     Some(0.0012),
///     0.004,
/// );
/// assert_eq!(obs.currency().as_str(), "EURUSD");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    date: NaiveDate,
    currency: CurrencyCode,
    log_return: Option<f64>,
    volatility_ohlc: f64,
}

impl Observation {
    pub fn new(
        date: NaiveDate,
        currency: CurrencyCode,
        log_return: Option<f64>,
        volatility_ohlc: f64,
    ) -> Self {
        Self {
            date,
            currency,
            log_return,
            volatility_ohlc,
        }
    }

    // --- Accessors ---

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    pub fn log_return(&self) -> Option<f64> {
        self.log_return
    }

    pub fn volatility_ohlc(&self) -> f64 {
        self.volatility_ohlc
    }
}

/// The full FX input table.
///
/// Rows are kept in load order; per-currency views returned by
/// [`by_currency`](Self::by_currency) are sorted chronologically, which is
/// the only ordering any model depends on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservationSet {
    observations: Vec<Observation>,
}

impl ObservationSet {
    pub fn new() -> Self {
        Self {
            observations: Vec::new(),
        }
    }

    pub fn add(&mut self, observation: Observation) {
        self.observations.push(observation);
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Latest date across every currency.
    pub fn max_date(&self) -> Option<NaiveDate> {
        self.observations.iter().map(|o| o.date()).max()
    }

    /// Last date included in the historical window: `max_date - lookback_days`.
    ///
    /// `None` for an empty set or when the subtraction leaves chrono's date
    /// range.
    pub fn cutoff(&self, lookback_days: i64) -> Option<NaiveDate> {
        let lookback = Duration::try_days(lookback_days)?;
        self.max_date()?.checked_sub_signed(lookback)
    }

    /// The calibration subset: every row dated on or before the cutoff.
    ///
    /// Thresholds are fitted on this window so the most recent days stay
    /// out of calibration and can be evaluated against it.
    pub fn historical(&self, lookback_days: i64) -> ObservationSet {
        match self.cutoff(lookback_days) {
            Some(cutoff) => self
                .observations
                .iter()
                .filter(|o| o.date() <= cutoff)
                .cloned()
                .collect(),
            None => ObservationSet::new(),
        }
    }

    /// All unique currencies, sorted.
    pub fn currencies(&self) -> Vec<CurrencyCode> {
        let mut currencies: Vec<CurrencyCode> = self
            .observations
            .iter()
            .map(|o| o.currency().clone())
            .collect();
        currencies.sort();
        currencies.dedup();
        currencies
    }

    /// Rows grouped by currency, each group sorted by date.
    pub fn by_currency(&self) -> BTreeMap<CurrencyCode, Vec<&Observation>> {
        let mut groups: BTreeMap<CurrencyCode, Vec<&Observation>> = BTreeMap::new();
        for obs in &self.observations {
            groups.entry(obs.currency().clone()).or_default().push(obs);
        }
        for series in groups.values_mut() {
            series.sort_by_key(|o| o.date());
        }
        groups
    }

    /// Non-null log-returns per currency in chronological order.
    pub fn returns_by_currency(&self) -> BTreeMap<CurrencyCode, Vec<f64>> {
        self.by_currency()
            .into_iter()
            .map(|(currency, series)| {
                let returns = series.iter().filter_map(|o| o.log_return()).collect();
                (currency, returns)
            })
            .collect()
    }
}

impl FromIterator<Observation> for ObservationSet {
    fn from_iter<T: IntoIterator<Item = Observation>>(iter: T) -> Self {
        Self {
            observations: iter.into_iter().collect(),
        }
    }
}
