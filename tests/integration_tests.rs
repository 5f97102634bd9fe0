use approx::assert_relative_eq;
use chrono::{Duration, NaiveDate};
use fx_threshold_engine::comparison::backtest::ThresholdMatch;
use fx_threshold_engine::config::AnalysisConfig;
use fx_threshold_engine::core::currency::{CurrencyCode, QuoteLookup};
use fx_threshold_engine::core::loader::{load_observations, load_trades, write_observations, LoadError};
use fx_threshold_engine::core::observation::{Observation, ObservationSet};
use fx_threshold_engine::core::outcome::SkipReason;
use fx_threshold_engine::core::trade::{Trade, TradeSet};
use fx_threshold_engine::engine::{ThresholdEngine, ThresholdReport};
use fx_threshold_engine::simulation::synthetic::{generate_observations, generate_trades, SyntheticConfig};
use std::fs;
use std::io::Write;

fn synthetic(days: usize) -> ObservationSet {
    generate_observations(&SyntheticConfig {
        days,
        ..SyntheticConfig::default()
    })
}

/// Full pipeline: synthetic observations → every model → comparison → backtest.
#[test]
fn full_pipeline_on_synthetic_data() {
    let config = AnalysisConfig::default();
    let observations = synthetic(400);
    let report = ThresholdEngine::run(&observations, &config);

    // Every currency has enough history for every model
    assert_eq!(report.summary.len(), 6);
    assert!(report.summary.skipped().is_empty());
    assert_eq!(report.thresholds.len(), 6);
    assert_eq!(report.garch.len(), 6);
    assert_eq!(report.regime.len(), 6);
    assert!(report.anomaly.skipped.is_none());
    assert!(report.anomaly.rows.iter().all(|r| r.flags.is_some()));

    // Comparison rows are sorted and consistent with the per-model views
    let names: Vec<&str> = report.comparison.iter().map(|r| r.currency.as_str()).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
    for row in &report.comparison {
        let garch = report.garch.rows().iter().find(|g| g.currency == row.currency).unwrap();
        assert_eq!(row.flag_garch, garch.flag_garch);
        let regime = report.regime.rows().iter().find(|g| g.currency == row.currency).unwrap();
        assert_eq!(row.flag_regime, regime.flag_regime);
    }

    for t in &report.thresholds {
        let stat = t.statistical_threshold.unwrap();
        let current = t.current_vol.unwrap();
        assert!(stat > 0.0);
        assert!((1..=4).contains(&t.manual_group));
        assert_eq!(t.flag_statistical, current > stat);
        assert_eq!(t.flag_manual, current > t.manual_threshold);
    }

    let instruments: Vec<CurrencyCode> = observations.currencies();
    let trades = generate_trades(&instruments, 50, report.max_date.unwrap(), 0.5, 9);
    let backtest = ThresholdEngine::backtest(&report, &trades, &config);
    assert_eq!(backtest.rows.len(), 50);
    assert!(backtest.unmatched_instruments.is_empty());
    assert_eq!(
        backtest.counts.flag_manual,
        backtest.rows.iter().filter(|r| r.flag_manual).count()
    );
}

#[test]
fn historical_window_excludes_last_week() {
    let config = AnalysisConfig::default();
    let observations = synthetic(200);
    let max = observations.max_date().unwrap();
    let historical = observations.historical(config.lookback_days);

    assert!(historical.observations().iter().all(|o| o.date() <= max - Duration::days(7)));
    assert!(historical.len() < observations.len());
}

#[test]
fn garch_boundary_at_one_hundred_returns() {
    // Global window: days 0..=107, cutoff day 100. GBPUSD starts on day 0
    // (100 historical returns), EURUSD on day 1 (99).
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let base = synthetic(120);
    let source = base.by_currency();
    let series = &source[&CurrencyCode::new("EURUSD")];

    let mut set = ObservationSet::new();
    for (ccy, first_day) in [("GBPUSD", 0i64), ("EURUSD", 1)] {
        for (k, day) in (first_day..108).enumerate() {
            let o = series[k];
            let log_return = if k == 0 { None } else { o.log_return() };
            set.add(Observation::new(
                start + Duration::days(day),
                CurrencyCode::new(ccy),
                log_return,
                o.volatility_ohlc(),
            ));
        }
    }

    let report = ThresholdEngine::run(&set, &AnalysisConfig::default());
    assert_eq!(
        report.garch.skip_reason(&CurrencyCode::new("EURUSD")),
        Some(&SkipReason::InsufficientData {
            required: 100,
            available: 99
        })
    );
    assert!(report.garch.skip_reason(&CurrencyCode::new("GBPUSD")).is_none());
    assert!(report.garch.rows().iter().any(|r| r.currency.as_str() == "GBPUSD"));
}

#[test]
fn single_currency_skips_anomaly_detection() {
    let observations = generate_observations(&SyntheticConfig {
        currencies: vec![CurrencyCode::new("EURUSD")],
        days: 150,
        ..SyntheticConfig::default()
    });
    let report = ThresholdEngine::run(&observations, &AnalysisConfig::default());

    assert!(matches!(
        report.anomaly.skipped,
        Some(SkipReason::InsufficientCurrencies { available: 1, .. })
    ));
    assert!(report.comparison.iter().all(|r| !r.flag_if && !r.flag_ocsvm));
}

#[test]
fn backtest_conversion_example() {
    let mut report = ThresholdEngine::run(&synthetic(150), &AnalysisConfig::default());
    let eur = report
        .thresholds
        .iter_mut()
        .find(|t| t.currency.as_str() == "EURUSD")
        .unwrap();
    eur.manual_threshold = 0.07;
    eur.statistical_threshold = Some(0.07);

    let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let trades: TradeSet = vec![
        Trade::new(date, CurrencyCode::new("EURUSD"), 1.0, 1.0, 0.08),
        Trade::new(date, CurrencyCode::new("EURUSD"), 1.0, 1.0, -0.05),
        Trade::new(date, CurrencyCode::new("CHFUSD"), 1.0, 1.0, 0.9),
    ]
    .into_iter()
    .collect();

    let backtest = ThresholdEngine::backtest(&report, &trades, &AnalysisConfig::default());

    match backtest.rows[0].thresholds {
        ThresholdMatch::Matched(t) => {
            assert_relative_eq!(t.manual_pct, 0.0654, epsilon = 1e-4);
            assert_eq!(t.quote, QuoteLookup::Quoted(1.07));
        }
        ThresholdMatch::Unmatched => panic!("EURUSD should match"),
    }
    assert!(backtest.rows[0].flag_manual);
    assert!(!backtest.rows[1].flag_manual);
    assert_eq!(backtest.rows[2].thresholds, ThresholdMatch::Unmatched);
    assert!(!backtest.rows[2].flag_manual && !backtest.rows[2].flag_stat);
}

#[test]
fn short_history_keeps_manual_threshold_in_backtest() {
    // GBPUSD has the full history; EURUSD only 40 days, less than the
    // 60-observation rolling window, so it gets no statistical threshold.
    let base = synthetic(150);
    let max = base.max_date().unwrap();
    let set: ObservationSet = base
        .observations()
        .iter()
        .filter(|o| match o.currency().as_str() {
            "GBPUSD" => true,
            "EURUSD" => o.date() > max - Duration::days(40),
            _ => false,
        })
        .cloned()
        .collect();

    let config = AnalysisConfig::default();
    let report = ThresholdEngine::run(&set, &config);
    let eurusd = CurrencyCode::new("EURUSD");
    assert!(report.summary.skip_reason(&eurusd).is_some());

    let eur = report.thresholds.iter().find(|t| t.currency == eurusd).unwrap();
    assert_eq!(eur.statistical_threshold, None);
    assert!(!eur.flag_statistical);
    let manual = eur.manual_threshold;

    // Above every manual band once converted (0.7 / 1.07 < 1).
    let trades: TradeSet = vec![Trade::new(max, eurusd.clone(), 1.0, 1.0, 1.0)].into_iter().collect();
    let backtest = ThresholdEngine::backtest(&report, &trades, &config);
    let row = &backtest.rows[0];
    match row.thresholds {
        ThresholdMatch::Matched(t) => {
            assert_relative_eq!(t.manual_pct, manual / 1.07);
            assert_eq!(t.stat_pct, None);
        }
        ThresholdMatch::Unmatched => panic!("EURUSD has a manual threshold"),
    }
    assert!(row.flag_manual);
    assert!(!row.flag_stat);
    assert!(backtest.unmatched_instruments.is_empty());
}

#[test]
fn huge_lookback_is_rejected_not_panicking() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(br#"{"lookback_days": 9000000000000}"#).unwrap();
    assert!(AnalysisConfig::from_file(file.path()).is_err());

    // Bypassing validation still cannot panic: the cutoff is undefined and
    // the historical window is empty.
    let config = AnalysisConfig {
        lookback_days: 9_000_000_000_000,
        ..AnalysisConfig::default()
    };
    let report = ThresholdEngine::run(&synthetic(150), &config);
    assert_eq!(report.cutoff, None);
    assert!(report.summary.is_empty());
}

#[test]
fn unquoted_currency_backtests_with_divisor_one() {
    let observations = generate_observations(&SyntheticConfig {
        currencies: vec![CurrencyCode::new("CHFUSD"), CurrencyCode::new("EURUSD")],
        days: 150,
        ..SyntheticConfig::default()
    });
    let config = AnalysisConfig::default();
    let report = ThresholdEngine::run(&observations, &config);
    let chf = report.thresholds.iter().find(|t| t.currency.as_str() == "CHFUSD").unwrap();

    let trades: TradeSet = vec![Trade::new(
        report.max_date.unwrap(),
        CurrencyCode::new("CHFUSD"),
        1.0,
        1.0,
        0.01,
    )]
    .into_iter()
    .collect();
    let backtest = ThresholdEngine::backtest(&report, &trades, &config);
    let t = backtest.rows[0].thresholds.thresholds().unwrap();
    assert!(t.quote.is_fallback());
    assert_eq!(t.manual_pct, chf.manual_threshold);
    assert_eq!(t.stat_pct, chf.statistical_threshold);
}

#[test]
fn csv_files_round_trip_through_engine() {
    let dir = tempfile::tempdir().unwrap();
    let fx_path = dir.path().join("fx.csv");
    let observations = synthetic(150);
    write_observations(&observations, fs::File::create(&fx_path).unwrap()).unwrap();

    let loaded = load_observations(&fx_path).unwrap();
    assert_eq!(loaded.len(), observations.len());

    let config = AnalysisConfig::default();
    let from_file = ThresholdEngine::run(&loaded, &config);
    let in_memory = ThresholdEngine::run(&observations, &config);
    assert_eq!(from_file.summary, in_memory.summary);
    assert_eq!(from_file.comparison, in_memory.comparison);

    let trades_path = dir.path().join("trades.csv");
    let mut f = fs::File::create(&trades_path).unwrap();
    writeln!(f, "TradeDate,Instrument,DealRate,AllInMarketRate,DeviationPct").unwrap();
    writeln!(f, "2024-03-01,EURUSD,1.0712,1.0705,0.08").unwrap();
    writeln!(f, "2024-03-04,GBPUSD,1.2650,1.2651,-0.0001").unwrap();
    drop(f);

    let trades = load_trades(&trades_path).unwrap();
    let backtest = ThresholdEngine::backtest(&from_file, &trades, &config);
    assert_eq!(backtest.rows.len(), 2);
    assert!(backtest.detail("GBPUSD on 2024-03-04").is_some());
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        load_observations(dir.path().join("absent.csv")),
        Err(LoadError::Io { .. })
    ));
}

#[test]
fn report_serializes_to_json() {
    let report = ThresholdEngine::run(&synthetic(150), &AnalysisConfig::default());
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["percentile"], 95.0);
    assert_eq!(json["comparison"].as_array().unwrap().len(), 6);
    assert!(json["summary"]["rows"].is_array());
    assert!(json["anomaly"]["rows"][0]["features"]["kurtosis"].is_number());

    let back: ThresholdReport = serde_json::from_value(json).unwrap();
    assert_eq!(back.comparison, report.comparison);
}

#[test]
fn percentile_override_changes_thresholds() {
    let observations = synthetic(300);
    let p90 = ThresholdEngine::run(&observations, &AnalysisConfig::default().with_percentile(90.0).unwrap());
    let p99 = ThresholdEngine::run(&observations, &AnalysisConfig::default().with_percentile(99.0).unwrap());

    for (lo, hi) in p90.summary.rows().iter().zip(p99.summary.rows()) {
        assert_eq!(lo.currency, hi.currency);
        assert!(lo.threshold <= hi.threshold);
    }
    assert!(AnalysisConfig::default().with_percentile(89.9).is_err());
}
