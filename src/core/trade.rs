use crate::core::currency::CurrencyCode;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// An executed FX trade to be checked against volatility thresholds.
///
/// `deviation_pct` is the signed relative gap between the deal rate and the
/// all-in market rate. Only its magnitude is compared with thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    trade_date: NaiveDate,
    instrument: CurrencyCode,
    deal_rate: f64,
    all_in_market_rate: f64,
    deviation_pct: f64,
}

impl Trade {
    pub fn new(
        trade_date: NaiveDate,
        instrument: CurrencyCode,
        deal_rate: f64,
        all_in_market_rate: f64,
        deviation_pct: f64,
    ) -> Self {
        Self {
            trade_date,
            instrument,
            deal_rate,
            all_in_market_rate,
            deviation_pct,
        }
    }

    // --- Accessors ---

    pub fn trade_date(&self) -> NaiveDate {
        self.trade_date
    }

    pub fn instrument(&self) -> &CurrencyCode {
        &self.instrument
    }

    pub fn deal_rate(&self) -> f64 {
        self.deal_rate
    }

    pub fn all_in_market_rate(&self) -> f64 {
        self.all_in_market_rate
    }

    pub fn deviation_pct(&self) -> f64 {
        self.deviation_pct
    }

    /// Absolute deviation, the quantity compared with thresholds.
    pub fn abs_dev(&self) -> f64 {
        self.deviation_pct.abs()
    }

    /// Human-readable key used to select a trade for the detail view,
    /// e.g. `EURUSD on 2024-03-01`.
    pub fn key(&self) -> String {
        format!("{} on {}", self.instrument, self.trade_date.format("%Y-%m-%d"))
    }
}

/// The trade input table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeSet {
    trades: Vec<Trade>,
}

impl TradeSet {
    pub fn new() -> Self {
        Self { trades: Vec::new() }
    }

    pub fn add(&mut self, trade: Trade) {
        self.trades.push(trade);
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }
}

impl FromIterator<Trade> for TradeSet {
    fn from_iter<T: IntoIterator<Item = Trade>>(iter: T) -> Self {
        Self {
            trades: iter.into_iter().collect(),
        }
    }
}
