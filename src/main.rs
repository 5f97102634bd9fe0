//! fx-threshold-engine CLI
//!
//! Run the volatility threshold models and the trade backtest from the
//! command line.
//!
//! # Usage
//!
//! ```bash
//! # Every threshold view for an FX file
//! fx-threshold-engine analyze --fx fx.csv
//!
//! # Output as JSON, 99th percentile
//! fx-threshold-engine analyze --fx fx.csv --percentile 99 --format json
//!
//! # Backtest trades and explain one of them
//! fx-threshold-engine backtest --fx fx.csv --trades trades.csv --explain "EURUSD on 2024-03-01"
//!
//! # Generate synthetic input files
//! fx-threshold-engine generate --days 500 --output fx.csv --trades 200 --trades-output trades.csv
//! ```

use fx_threshold_engine::config::AnalysisConfig;
use fx_threshold_engine::core::currency::CurrencyCode;
use fx_threshold_engine::core::loader::{load_observations, load_trades, write_observations, write_trades};
use fx_threshold_engine::core::observation::ObservationSet;
use fx_threshold_engine::comparison::backtest::{BacktestReport, TradeRow};
use fx_threshold_engine::engine::{ThresholdEngine, ThresholdReport};
use fx_threshold_engine::simulation::synthetic::{generate_observations, generate_trades, SyntheticConfig};
use std::fs::File;
use std::io;
use std::process;

fn print_usage() {
    eprintln!(
        r#"fx-threshold-engine — FX volatility thresholds, anomaly flags and trade backtesting

USAGE:
    fx-threshold-engine <COMMAND> [OPTIONS]

COMMANDS:
    analyze     Compute every threshold view for an FX observation file
    backtest    Flag trades against manual and statistical thresholds
    generate    Generate synthetic FX observations (and trades)
    help        Show this message

OPTIONS (analyze, backtest):
    --fx <FILE>          FX CSV: Date,Currency,LogReturn,VolatilityOHLC
    --config <FILE>      JSON analysis configuration
    --percentile <P>     Statistical percentile, 90-99 (default: 95)
    --format <FORMAT>    Output format: text (default) or json

OPTIONS (backtest):
    --trades <FILE>      Trade CSV: TradeDate,Instrument,DealRate,AllInMarketRate,DeviationPct
    --explain <KEY>      Show details for one trade, e.g. "EURUSD on 2024-03-01"

OPTIONS (generate):
    --currencies <LIST>  Comma-separated currency pairs (default: six majors)
    --days <N>           Business days per currency (default: 500)
    --seed <N>           RNG seed (default: 42)
    --output <FILE>      Write FX CSV to file instead of stdout
    --trades <N>         Also generate N trades
    --trades-output <FILE>  Trade CSV path (required with --trades)

EXAMPLES:
    fx-threshold-engine analyze --fx fx.csv
    fx-threshold-engine analyze --fx fx.csv --percentile 99 --format json
    fx-threshold-engine backtest --fx fx.csv --trades trades.csv
    fx-threshold-engine generate --days 300 --output fx.csv --trades 100 --trades-output trades.csv"#
    );
}

fn value(args: &[String], i: usize, flag: &str, what: &str) -> String {
    args.get(i).cloned().unwrap_or_else(|| {
        eprintln!("{} requires {}", flag, what);
        process::exit(1);
    })
}

fn number<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> T {
    args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
        eprintln!("{} requires a number", flag);
        process::exit(1);
    })
}

/// Options shared by `analyze` and `backtest`.
struct AnalysisArgs {
    fx_path: Option<String>,
    config_path: Option<String>,
    percentile: Option<f64>,
    format: String,
}

impl AnalysisArgs {
    fn new() -> Self {
        Self {
            fx_path: None,
            config_path: None,
            percentile: None,
            format: "text".to_string(),
        }
    }

    /// Consume a shared option at `args[*i]`; `false` if it is not one.
    fn accept(&mut self, args: &[String], i: &mut usize) -> bool {
        match args[*i].as_str() {
            "--fx" => {
                *i += 1;
                self.fx_path = Some(value(args, *i, "--fx", "a file path"));
            }
            "--config" => {
                *i += 1;
                self.config_path = Some(value(args, *i, "--config", "a file path"));
            }
            "--percentile" => {
                *i += 1;
                self.percentile = Some(number(args, *i, "--percentile"));
            }
            "--format" => {
                *i += 1;
                self.format = value(args, *i, "--format", "'text' or 'json'");
            }
            _ => return false,
        }
        true
    }

    fn config(&self) -> AnalysisConfig {
        let config = match &self.config_path {
            Some(path) => AnalysisConfig::from_file(path).unwrap_or_else(|e| {
                eprintln!("Error loading config: {}", e);
                process::exit(1);
            }),
            None => AnalysisConfig::default(),
        };
        match self.percentile {
            Some(p) => config.with_percentile(p).unwrap_or_else(|e| {
                eprintln!("Error: {}", e);
                process::exit(1);
            }),
            None => config,
        }
    }

    fn observations(&self) -> ObservationSet {
        let path = self.fx_path.as_deref().unwrap_or_else(|| {
            eprintln!("Error: --fx <FILE> is required");
            process::exit(1);
        });
        let set = load_observations(path).unwrap_or_else(|e| {
            eprintln!("Error reading FX data: {}", e);
            process::exit(1);
        });
        if set.is_empty() {
            eprintln!("Error: '{}' contains no observations", path);
            process::exit(1);
        }
        set
    }

    fn run(&self) -> (ThresholdReport, AnalysisConfig) {
        let config = self.config();
        let observations = self.observations();
        (ThresholdEngine::run(&observations, &config), config)
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    let json = serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        eprintln!("Error serializing output: {}", e);
        process::exit(1);
    });
    println!("{}", json);
}

fn cmd_analyze(args: &[String]) {
    let mut opts = AnalysisArgs::new();
    let mut i = 0;
    while i < args.len() {
        if !opts.accept(args, &mut i) {
            eprintln!("Unknown option: {}", args[i]);
            process::exit(1);
        }
        i += 1;
    }

    let (report, _) = opts.run();
    if opts.format == "json" {
        print_json(&report);
    } else {
        print!("{}", report);
    }
}

fn cmd_backtest(args: &[String]) {
    let mut opts = AnalysisArgs::new();
    let mut trades_path = None;
    let mut explain = None;
    let mut i = 0;
    while i < args.len() {
        if !opts.accept(args, &mut i) {
            match args[i].as_str() {
                "--trades" => {
                    i += 1;
                    trades_path = Some(value(args, i, "--trades", "a file path"));
                }
                "--explain" => {
                    i += 1;
                    explain = Some(value(args, i, "--explain", "a trade key"));
                }
                _ => {
                    eprintln!("Unknown option: {}", args[i]);
                    process::exit(1);
                }
            }
        }
        i += 1;
    }

    let trades_path = trades_path.unwrap_or_else(|| {
        eprintln!("Error: --trades <FILE> is required");
        process::exit(1);
    });
    let trades = load_trades(&trades_path).unwrap_or_else(|e| {
        eprintln!("Error reading trades: {}", e);
        process::exit(1);
    });

    let (report, config) = opts.run();
    let backtest = ThresholdEngine::backtest(&report, &trades, &config);

    let detail = explain.as_deref().map(|key| {
        backtest.detail(key).unwrap_or_else(|| {
            eprintln!("No trade with key '{}'", key);
            process::exit(1);
        })
    });

    if opts.format == "json" {
        #[derive(serde::Serialize)]
        struct BacktestOutput<'a> {
            #[serde(flatten)]
            backtest: &'a BacktestReport,
            #[serde(skip_serializing_if = "Option::is_none")]
            detail: Option<&'a TradeRow>,
        }
        print_json(&BacktestOutput {
            backtest: &backtest,
            detail: detail.map(|d| d.row),
        });
    } else {
        print!("{}", backtest);
        if let Some(detail) = detail {
            println!("\n{}", detail);
        }
    }
}

fn cmd_generate(args: &[String]) {
    let mut config = SyntheticConfig::default();
    let mut output_path: Option<String> = None;
    let mut trade_count: Option<usize> = None;
    let mut trades_output: Option<String> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--currencies" => {
                i += 1;
                config.currencies = value(args, i, "--currencies", "a comma-separated list")
                    .split(',')
                    .map(|s| CurrencyCode::new(s.trim()))
                    .collect();
            }
            "--days" => {
                i += 1;
                config.days = number(args, i, "--days");
            }
            "--seed" => {
                i += 1;
                config.seed = number(args, i, "--seed");
            }
            "--output" => {
                i += 1;
                output_path = Some(value(args, i, "--output", "a file path"));
            }
            "--trades" => {
                i += 1;
                trade_count = Some(number(args, i, "--trades"));
            }
            "--trades-output" => {
                i += 1;
                trades_output = Some(value(args, i, "--trades-output", "a file path"));
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let set = generate_observations(&config);
    let written = match &output_path {
        Some(path) => File::create(path)
            .map_err(|e| e.to_string())
            .and_then(|f| write_observations(&set, f).map_err(|e| e.to_string())),
        None => write_observations(&set, io::stdout().lock()).map_err(|e| e.to_string()),
    };
    if let Err(e) = written {
        eprintln!("Error writing FX data: {}", e);
        process::exit(1);
    }
    if let Some(path) = &output_path {
        eprintln!(
            "Generated {} observations across {} currencies → {}",
            set.len(),
            config.currencies.len(),
            path
        );
    }

    if let Some(count) = trade_count {
        let path = trades_output.unwrap_or_else(|| {
            eprintln!("Error: --trades requires --trades-output <FILE>");
            process::exit(1);
        });
        let start = set.max_date().unwrap_or(config.start);
        let trades = generate_trades(&config.currencies, count, start, 0.5, config.seed.wrapping_add(1));
        let written = File::create(&path)
            .map_err(|e| e.to_string())
            .and_then(|f| write_trades(&trades, f).map_err(|e| e.to_string()));
        if let Err(e) = written {
            eprintln!("Error writing trades to '{}': {}", path, e);
            process::exit(1);
        }
        eprintln!("Generated {} trades → {}", trades.len(), path);
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let command = args[1].as_str();
    let rest = &args[2..];

    match command {
        "analyze" => cmd_analyze(rest),
        "backtest" => cmd_backtest(rest),
        "generate" => cmd_generate(rest),
        "help" | "--help" | "-h" => print_usage(),
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            process::exit(1);
        }
    }
}
