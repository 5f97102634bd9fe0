//! CSV loading for FX observations and trades.
//!
//! Any structural problem (missing column, unparsable field, duplicate
//! observation) aborts the load: nothing downstream can be trusted once a
//! row has been misread.

use crate::core::currency::CurrencyCode;
use crate::core::observation::{Observation, ObservationSet};
use crate::core::trade::{Trade, TradeSet};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;

pub const FX_COLUMNS: [&str; 4] = ["Date", "Currency", "LogReturn", "VolatilityOHLC"];
pub const TRADE_COLUMNS: [&str; 5] = [
    "TradeDate",
    "Instrument",
    "DealRate",
    "AllInMarketRate",
    "DeviationPct",
];

/// Errors raised while reading an input table.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing required column '{0}'")]
    MissingColumn(String),
    #[error("row {row}: column '{column}' has invalid value '{value}' ({reason})")]
    InvalidField {
        row: usize,
        column: String,
        value: String,
        reason: String,
    },
    #[error("row {row}: duplicate observation for {currency} on {date}")]
    DuplicateObservation {
        row: usize,
        currency: CurrencyCode,
        date: NaiveDate,
    },
}

/// Load the FX observation table from a CSV file.
pub fn load_observations(path: impl AsRef<Path>) -> Result<ObservationSet, LoadError> {
    read_observations(open(path.as_ref())?)
}

/// Load the trade table from a CSV file.
pub fn load_trades(path: impl AsRef<Path>) -> Result<TradeSet, LoadError> {
    read_trades(open(path.as_ref())?)
}

fn open(path: &Path) -> Result<File, LoadError> {
    File::open(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// One row of the FX table as it appears on disk.
#[derive(Debug, Serialize, Deserialize)]
struct FxRecord {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Currency")]
    currency: String,
    #[serde(rename = "LogReturn")]
    log_return: String,
    #[serde(rename = "VolatilityOHLC")]
    volatility_ohlc: f64,
}

/// One row of the trade table as it appears on disk.
#[derive(Debug, Serialize, Deserialize)]
struct TradeRecord {
    #[serde(rename = "TradeDate")]
    trade_date: String,
    #[serde(rename = "Instrument")]
    instrument: String,
    #[serde(rename = "DealRate")]
    deal_rate: f64,
    #[serde(rename = "AllInMarketRate")]
    all_in_market_rate: f64,
    #[serde(rename = "DeviationPct")]
    deviation_pct: f64,
}

/// Parse FX observations from any CSV source with a header row.
///
/// Columns are matched by name, so extra columns and column order do not
/// matter. `LogReturn` may be empty or `NaN`.
pub fn read_observations<R: Read>(source: R) -> Result<ObservationSet, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(source);
    let headers = reader.headers()?.clone();
    require_columns(&headers, &FX_COLUMNS)?;

    let mut set = ObservationSet::new();
    let mut seen: HashSet<(CurrencyCode, NaiveDate)> = HashSet::new();

    for (i, result) in reader.records().enumerate() {
        let record = result?;
        let row = i + 1;
        let fx: FxRecord = record
            .deserialize(Some(&headers))
            .map_err(|e| field_error(e, &headers, &record, row))?;

        let date = parse_date(&fx.date, row, FX_COLUMNS[0])?;
        let currency = label(fx.currency, row, FX_COLUMNS[1])?;
        let log_return = parse_optional_f64(&fx.log_return, row, FX_COLUMNS[2])?;
        finite(fx.volatility_ohlc, row, FX_COLUMNS[3])?;

        if !seen.insert((currency.clone(), date)) {
            return Err(LoadError::DuplicateObservation {
                row,
                currency,
                date,
            });
        }
        set.add(Observation::new(date, currency, log_return, fx.volatility_ohlc));
    }

    Ok(set)
}

/// Parse trades from any CSV source with a header row.
pub fn read_trades<R: Read>(source: R) -> Result<TradeSet, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(source);
    let headers = reader.headers()?.clone();
    require_columns(&headers, &TRADE_COLUMNS)?;

    let mut set = TradeSet::new();
    for (i, result) in reader.records().enumerate() {
        let record = result?;
        let row = i + 1;
        let t: TradeRecord = record
            .deserialize(Some(&headers))
            .map_err(|e| field_error(e, &headers, &record, row))?;

        let trade_date = parse_date(&t.trade_date, row, TRADE_COLUMNS[0])?;
        let instrument = label(t.instrument, row, TRADE_COLUMNS[1])?;
        finite(t.deal_rate, row, TRADE_COLUMNS[2])?;
        finite(t.all_in_market_rate, row, TRADE_COLUMNS[3])?;
        finite(t.deviation_pct, row, TRADE_COLUMNS[4])?;

        set.add(Trade::new(
            trade_date,
            instrument,
            t.deal_rate,
            t.all_in_market_rate,
            t.deviation_pct,
        ));
    }

    Ok(set)
}

/// Write observations in the layout [`read_observations`] accepts.
pub fn write_observations<W: Write>(set: &ObservationSet, sink: W) -> Result<(), LoadError> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(sink);
    writer.write_record(FX_COLUMNS)?;
    for o in set.observations() {
        writer.serialize(FxRecord {
            date: format_date(o.date()),
            currency: o.currency().to_string(),
            log_return: o.log_return().map(|r| r.to_string()).unwrap_or_default(),
            volatility_ohlc: o.volatility_ohlc(),
        })?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Write trades in the layout [`read_trades`] accepts.
pub fn write_trades<W: Write>(set: &TradeSet, sink: W) -> Result<(), LoadError> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(sink);
    writer.write_record(TRADE_COLUMNS)?;
    for t in set.trades() {
        writer.serialize(TradeRecord {
            trade_date: format_date(t.trade_date()),
            instrument: t.instrument().to_string(),
            deal_rate: t.deal_rate(),
            all_in_market_rate: t.all_in_market_rate(),
            deviation_pct: t.deviation_pct(),
        })?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

fn require_columns(headers: &csv::StringRecord, required: &[&str]) -> Result<(), LoadError> {
    match required.iter().find(|name| !headers.iter().any(|h| h == **name)) {
        Some(name) => Err(LoadError::MissingColumn((*name).to_string())),
        None => Ok(()),
    }
}

/// Attach row and column context to a field-level deserialization error.
fn field_error(err: csv::Error, headers: &csv::StringRecord, record: &csv::StringRecord, row: usize) -> LoadError {
    if let csv::ErrorKind::Deserialize { err: de, .. } = err.kind() {
        if let Some(idx) = de.field() {
            let idx = idx as usize;
            return invalid(
                row,
                headers.get(idx).unwrap_or(""),
                record.get(idx).unwrap_or(""),
                de.kind().to_string(),
            );
        }
    }
    LoadError::Csv(err)
}

fn invalid(row: usize, column: &str, value: &str, reason: impl Into<String>) -> LoadError {
    LoadError::InvalidField {
        row,
        column: column.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn label(value: String, row: usize, column: &str) -> Result<CurrencyCode, LoadError> {
    if value.is_empty() {
        return Err(invalid(row, column, &value, "empty label"));
    }
    Ok(CurrencyCode::new(value))
}

fn finite(value: f64, row: usize, column: &str) -> Result<(), LoadError> {
    if !value.is_finite() {
        return Err(invalid(row, column, &value.to_string(), "not a finite number"));
    }
    Ok(())
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Dates may carry a trailing `00:00:00` time.
fn parse_date(value: &str, row: usize, column: &str) -> Result<NaiveDate, LoadError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").map(|dt| dt.date()))
        .map_err(|e| invalid(row, column, value, e.to_string()))
}

/// Empty and `NaN` are missing; anything else must be a finite number.
fn parse_optional_f64(value: &str, row: usize, column: &str) -> Result<Option<f64>, LoadError> {
    if value.is_empty() || value.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    let parsed: f64 = value
        .parse()
        .map_err(|e: std::num::ParseFloatError| invalid(row, column, value, e.to_string()))?;
    finite(parsed, row, column)?;
    Ok(Some(parsed))
}
