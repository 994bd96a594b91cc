//! CLI definition and dispatch.

use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::{CsvAdapter, parse_timestamp};
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{BacktestConfig, ExecutionPrice, run_backtest};
use crate::domain::config_validation::{
    validate_backtest_config, validate_indicator_params, validate_signal_config,
};
use crate::domain::error::SignalbotError;
use crate::domain::indicator::{EnrichedBar, IndicatorParams, compute_indicators};
use crate::domain::metrics::Metrics;
use crate::domain::signal::{SignalConfig, SignalKind, TrendFilter, generate_signals};
use crate::domain::sweep::{best_by_total_return, run_sweep, threshold_grid};
use crate::domain::validation::{DataWarning, inspect, validate_prices, validate_timeline};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_OUTPUT_DIR: &str = "output";

#[derive(Parser, Debug)]
#[command(
    name = "signalbot",
    about = "RSI signal generation and fee-aware long-only backtesting"
)]
pub struct Cli {
    /// Log at debug level (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Where to find bars and how to window them.
#[derive(Args, Debug, Clone, Default)]
pub struct DataArgs {
    /// Symbol to load (defaults to [data] symbol)
    #[arg(long)]
    pub symbol: Option<String>,
    /// Earliest bar to include
    #[arg(long, value_parser = parse_time_arg)]
    pub start: Option<NaiveDateTime>,
    /// Latest bar to include
    #[arg(long, value_parser = parse_time_arg)]
    pub end: Option<NaiveDateTime>,
    /// Read indicator columns from the file instead of computing them
    #[arg(long)]
    pub precomputed: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Label every bar with an entry/exit signal
    Signals {
        #[arg(short, long)]
        config: PathBuf,
        #[command(flatten)]
        data: DataArgs,
        /// Output directory for signals.csv
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Generate signals and simulate them
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[command(flatten)]
        data: DataArgs,
        /// Output directory for the CSV report
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file and, optionally, its data
    Validate {
        #[arg(short, long)]
        config: PathBuf,
        /// Also load the configured symbol and report data-quality findings
        #[arg(long)]
        check_data: bool,
    },
    /// List symbols available in the data directory
    ListSymbols {
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Data directory (overrides [data] dir)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Backtest a grid of RSI thresholds in parallel
    Sweep {
        #[arg(short, long)]
        config: PathBuf,
        #[command(flatten)]
        data: DataArgs,
        /// Oversold thresholds to try
        #[arg(long, value_delimiter = ',', default_values_t = vec![25.0, 30.0, 35.0])]
        oversold: Vec<f64>,
        /// Overbought thresholds to try
        #[arg(long, value_delimiter = ',', default_values_t = vec![65.0, 70.0, 75.0])]
        overbought: Vec<f64>,
        /// Number of ranked cases to print
        #[arg(long, default_value_t = 5)]
        top: usize,
        /// Output directory for sweep.csv
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Install the global tracing subscriber, logging to stderr.
pub fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Signals {
            config,
            data,
            output,
        } => run_signals(&config, &data, output.as_deref()),
        Command::Backtest {
            config,
            data,
            output,
        } => run_backtest_command(&config, &data, output.as_deref()),
        Command::Validate { config, check_data } => run_validate(&config, check_data),
        Command::ListSymbols { config, dir } => run_list_symbols(config.as_deref(), dir),
        Command::Sweep {
            config,
            data,
            oversold,
            overbought,
            top,
            output,
        } => run_sweep_command(&config, &data, &oversold, &overbought, top, output.as_deref()),
    }
}

fn report_error(err: &SignalbotError) -> ExitCode {
    tracing::debug!(?err, "command failed");
    eprintln!("error: {err}");
    err.into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, SignalbotError> {
    tracing::info!(path = %path.display(), "loading config");
    FileConfigAdapter::from_file(path)
}

/// Everything a run needs, resolved and validated from one INI file.
pub struct RunSettings {
    pub signal: SignalConfig,
    pub backtest: BacktestConfig,
    pub indicators: IndicatorParams,
}

pub fn build_settings(adapter: &dyn ConfigPort) -> Result<RunSettings, SignalbotError> {
    let signal = build_signal_config(adapter)?;
    let backtest = build_backtest_config(adapter)?;
    let indicators = build_indicator_params(adapter)?;
    validate_signal_config(&signal)?;
    validate_backtest_config(&backtest)?;
    validate_indicator_params(&indicators)?;
    Ok(RunSettings {
        signal,
        backtest,
        indicators,
    })
}

pub fn build_signal_config(adapter: &dyn ConfigPort) -> Result<SignalConfig, SignalbotError> {
    let defaults = SignalConfig::default();
    Ok(SignalConfig {
        oversold: read_f64(adapter, "signals", "oversold", defaults.oversold)?,
        overbought: read_f64(adapter, "signals", "overbought", defaults.overbought)?,
        trend_ema_period: read_usize(
            adapter,
            "signals",
            "trend_ema_period",
            defaults.trend_ema_period,
        )?,
        trend_filter: read_parsed::<TrendFilter>(
            adapter,
            "signals",
            "trend_filter",
            defaults.trend_filter,
        )?,
        macd_confirm: read_bool(adapter, "signals", "macd_confirm", defaults.macd_confirm)?,
        divergence_lookback: read_usize(
            adapter,
            "signals",
            "divergence_lookback",
            defaults.divergence_lookback,
        )?,
    })
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, SignalbotError> {
    let defaults = BacktestConfig::default();
    Ok(BacktestConfig {
        fee_rate: read_f64(adapter, "backtest", "fee_rate", defaults.fee_rate)?,
        slippage_rate: read_f64(adapter, "backtest", "slippage_rate", defaults.slippage_rate)?,
        starting_equity: read_f64(
            adapter,
            "backtest",
            "starting_equity",
            defaults.starting_equity,
        )?,
        execution_price: read_parsed::<ExecutionPrice>(
            adapter,
            "backtest",
            "execution_price",
            defaults.execution_price,
        )?,
    })
}

pub fn build_indicator_params(adapter: &dyn ConfigPort) -> Result<IndicatorParams, SignalbotError> {
    let d = IndicatorParams::default();
    Ok(IndicatorParams {
        rsi_period: read_usize(adapter, "indicators", "rsi_period", d.rsi_period)?,
        ema_fast_period: read_usize(adapter, "indicators", "ema_fast_period", d.ema_fast_period)?,
        trend_ema_period: read_usize(adapter, "signals", "trend_ema_period", d.trend_ema_period)?,
        macd_fast: read_usize(adapter, "indicators", "macd_fast", d.macd_fast)?,
        macd_slow: read_usize(adapter, "indicators", "macd_slow", d.macd_slow)?,
        macd_signal: read_usize(adapter, "indicators", "macd_signal", d.macd_signal)?,
        bb_period: read_usize(adapter, "indicators", "bb_period", d.bb_period)?,
        bb_stddev: read_f64(adapter, "indicators", "bb_stddev", d.bb_stddev)?,
    })
}

fn read_f64(
    adapter: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, SignalbotError> {
    if let Some(raw) = adapter.get_string(section, key) {
        if raw.trim().parse::<f64>().is_err() {
            return Err(SignalbotError::invalid(
                section,
                key,
                format!("expected a number, got '{raw}'"),
            ));
        }
    }
    Ok(adapter.get_double(section, key, default))
}

fn read_usize(
    adapter: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, SignalbotError> {
    if let Some(raw) = adapter.get_string(section, key) {
        if raw.trim().parse::<usize>().is_err() {
            return Err(SignalbotError::invalid(
                section,
                key,
                format!("expected a non-negative integer, got '{raw}'"),
            ));
        }
    }
    let value = adapter.get_int(section, key, default as i64);
    usize::try_from(value)
        .map_err(|_| SignalbotError::invalid(section, key, format!("{value} is out of range")))
}

fn read_bool(
    adapter: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: bool,
) -> Result<bool, SignalbotError> {
    // An unrecognised value falls back to whichever default is passed in.
    if adapter.has_key(section, key)
        && adapter.get_bool(section, key, true) != adapter.get_bool(section, key, false)
    {
        return Err(SignalbotError::invalid(section, key, "expected true or false"));
    }
    Ok(adapter.get_bool(section, key, default))
}

fn read_parsed<T>(
    adapter: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: T,
) -> Result<T, SignalbotError>
where
    T: FromStr<Err = String>,
{
    match adapter.get_string(section, key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|reason| SignalbotError::invalid(section, key, reason)),
        None => Ok(default),
    }
}

fn parse_time_arg(value: &str) -> Result<NaiveDateTime, String> {
    parse_timestamp(value).ok_or_else(|| {
        format!("invalid timestamp '{value}' (expected YYYY-MM-DD[ HH:MM:SS])")
    })
}

pub fn resolve_data_dir(override_dir: Option<PathBuf>, config: Option<&dyn ConfigPort>) -> PathBuf {
    override_dir
        .or_else(|| config.and_then(|c| c.get_string("data", "dir")).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

pub fn resolve_symbol(
    symbol_override: Option<&str>,
    config: &dyn ConfigPort,
) -> Result<String, SignalbotError> {
    symbol_override
        .map(str::to_string)
        .or_else(|| config.get_string("data", "symbol"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SignalbotError::ConfigMissing {
            section: "data".into(),
            key: "symbol".into(),
        })
}

/// Load the configured symbol and annotate it with indicators.
pub fn load_bars(
    data_port: &dyn DataPort,
    symbol: &str,
    data: &DataArgs,
    params: &IndicatorParams,
) -> Result<Vec<EnrichedBar>, SignalbotError> {
    let bars = if data.precomputed {
        data_port.fetch_enriched(symbol, data.start, data.end)?
    } else {
        let ohlcv = data_port.fetch_ohlcv(symbol, data.start, data.end)?;
        compute_indicators(&ohlcv, params)
    };
    tracing::info!(symbol, bars = bars.len(), precomputed = data.precomputed, "bars loaded");
    Ok(bars)
}

fn prepare(
    config_path: &Path,
    data: &DataArgs,
) -> Result<(RunSettings, String, Vec<EnrichedBar>), SignalbotError> {
    // Stage 1: Load and validate config
    let adapter = load_config(config_path)?;
    let settings = build_settings(&adapter)?;

    // Stage 2: Load data
    let symbol = resolve_symbol(data.symbol.as_deref(), &adapter)?;
    let data_port = CsvAdapter::new(resolve_data_dir(None, Some(&adapter as &dyn ConfigPort)));
    let bars = load_bars(&data_port, &symbol, data, &settings.indicators)?;
    Ok((settings, symbol, bars))
}

fn run_signals(config_path: &Path, data: &DataArgs, output: Option<&Path>) -> ExitCode {
    let (settings, symbol, bars) = match prepare(config_path, data) {
        Ok(p) => p,
        Err(e) => return report_error(&e),
    };

    let signals = match generate_signals(&bars, &settings.signal) {
        Ok(s) => s,
        Err(e) => return report_error(&e),
    };

    let output = output.unwrap_or(Path::new(DEFAULT_OUTPUT_DIR));
    if let Err(e) = CsvReportAdapter::new().write_signals(&signals, output) {
        return report_error(&e);
    }

    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for sb in &signals {
        *counts.entry(sb.signal.kind.as_str()).or_default() += 1;
    }

    println!("=== Signals: {symbol} ===");
    println!("Bars:             {}", signals.len());
    for kind in [
        SignalKind::LongEntry,
        SignalKind::LongExit,
        SignalKind::Hold,
        SignalKind::None,
    ] {
        println!(
            "{:<17} {}",
            format!("{}:", kind.as_str()),
            counts.get(kind.as_str()).copied().unwrap_or(0)
        );
    }
    println!("Written to:       {}", output.display());
    ExitCode::SUCCESS
}

fn run_backtest_command(config_path: &Path, data: &DataArgs, output: Option<&Path>) -> ExitCode {
    let (settings, symbol, bars) = match prepare(config_path, data) {
        Ok(p) => p,
        Err(e) => return report_error(&e),
    };

    // Stage 3: Signals, then simulation
    let signals = match generate_signals(&bars, &settings.signal) {
        Ok(s) => s,
        Err(e) => return report_error(&e),
    };
    let result = match run_backtest(&signals, &settings.backtest) {
        Ok(r) => r,
        Err(e) => return report_error(&e),
    };

    // Stage 4: Console summary
    print_summary(&symbol, &result.metrics, &result.warnings);

    // Stage 5: Report
    let output = output.unwrap_or(Path::new(DEFAULT_OUTPUT_DIR));
    match CsvReportAdapter::new().write(&result, &signals, output) {
        Ok(()) => {
            println!("\nReport written to: {}", output.display());
            ExitCode::SUCCESS
        }
        Err(e) => report_error(&e),
    }
}

pub fn print_summary(symbol: &str, metrics: &Metrics, warnings: &[DataWarning]) {
    println!("=== Backtest: {symbol} ===");
    println!("Starting Equity:  {:.2}", metrics.starting_equity);
    println!("Final Equity:     {:.2}", metrics.final_equity);
    println!("Total Return:     {:.2}%", metrics.total_return * 100.0);
    println!("Max Drawdown:     -{:.2}%", metrics.max_drawdown * 100.0);
    println!("Total Trades:     {}", metrics.trade_count);
    println!("Win Rate:         {:.1}%", metrics.win_rate * 100.0);
    println!("Avg Return:       {:.2}%", metrics.avg_return * 100.0);
    println!("Profit Factor:    {:.2}", metrics.profit_factor);
    println!("Exposure:         {:.1}%", metrics.exposure * 100.0);
    println!("Fees + Slippage:  {:.2}", metrics.total_fees + metrics.total_slippage);
    if !warnings.is_empty() {
        println!("Data Warnings:    {}", warnings.len());
    }
}

fn run_validate(config_path: &Path, check_data: bool) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(e) => return report_error(&e),
    };
    let settings = match build_settings(&adapter) {
        Ok(s) => s,
        Err(e) => return report_error(&e),
    };

    let (signal, backtest) = (&settings.signal, &settings.backtest);
    println!("[signals]");
    println!("  oversold/overbought: {}/{}", signal.oversold, signal.overbought);
    println!(
        "  trend filter:        {:?} (EMA {})",
        signal.trend_filter, signal.trend_ema_period
    );
    println!("  macd confirm:        {}", signal.macd_confirm);
    println!("  divergence lookback: {}", signal.divergence_lookback);
    println!("[backtest]");
    println!(
        "  fee/slippage rate:   {}/{}",
        backtest.fee_rate, backtest.slippage_rate
    );
    println!("  starting equity:     {}", backtest.starting_equity);
    println!("  execution price:     {}", backtest.execution_price);

    if check_data {
        let symbol = match resolve_symbol(None, &adapter) {
            Ok(s) => s,
            Err(e) => return report_error(&e),
        };
        let data_port = CsvAdapter::new(resolve_data_dir(None, Some(&adapter as &dyn ConfigPort)));
        let bars = match load_bars(&data_port, &symbol, &DataArgs::default(), &settings.indicators) {
            Ok(b) => b,
            Err(e) => return report_error(&e),
        };
        let check_open = settings.backtest.execution_price == ExecutionPrice::NextBarOpen;
        let checked = validate_timeline(bars.iter().map(|b| &b.ohlcv))
            .and_then(|()| validate_prices(bars.iter().map(|b| &b.ohlcv), check_open));
        if let Err(e) = checked {
            return report_error(&e);
        }

        let warnings = inspect(&bars);
        println!("[data]");
        println!("  {symbol}: {} bars, {} warning(s)", bars.len(), warnings.len());
        for warning in &warnings {
            println!("  - {warning}");
        }
    }

    println!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_list_symbols(config_path: Option<&Path>, dir: Option<PathBuf>) -> ExitCode {
    let config = match config_path.map(load_config).transpose() {
        Ok(c) => c,
        Err(e) => return report_error(&e),
    };

    let data_dir = resolve_data_dir(dir, config.as_ref().map(|c| c as &dyn ConfigPort));
    let symbols = match CsvAdapter::new(data_dir.clone()).list_symbols() {
        Ok(s) => s,
        Err(e) => return report_error(&e),
    };

    if symbols.is_empty() {
        eprintln!("No symbols found in {}", data_dir.display());
    } else {
        for symbol in &symbols {
            println!("{symbol}");
        }
        eprintln!("{} symbols found", symbols.len());
    }
    ExitCode::SUCCESS
}

fn run_sweep_command(
    config_path: &Path,
    data: &DataArgs,
    oversold: &[f64],
    overbought: &[f64],
    top: usize,
    output: Option<&Path>,
) -> ExitCode {
    let (settings, symbol, bars) = match prepare(config_path, data) {
        Ok(p) => p,
        Err(e) => return report_error(&e),
    };

    let cases = threshold_grid(&settings.signal, &settings.backtest, oversold, overbought);
    if cases.is_empty() {
        let err = SignalbotError::invalid(
            "signals",
            "oversold",
            "sweep grid is empty (every oversold value is at or above every overbought value)",
        );
        return report_error(&err);
    }

    let outcomes = run_sweep(&bars, &cases);
    for outcome in &outcomes {
        if let Err(e) = &outcome.result {
            tracing::warn!(case = %outcome.label, error = %e, "sweep case failed");
        }
    }

    if let Some(dir) = output {
        if let Err(e) = CsvReportAdapter::new().write_sweep(&outcomes, dir) {
            return report_error(&e);
        }
    }

    let ranked = best_by_total_return(&outcomes);
    println!("=== Sweep: {symbol}, {} cases ===", outcomes.len());
    for (rank, outcome) in ranked.iter().take(top).enumerate() {
        if let Ok(result) = &outcome.result {
            let m = &result.metrics;
            println!(
                "{:>2}. {:<32} return {:>8.2}%  drawdown {:>6.2}%  trades {:>4}  win {:>5.1}%",
                rank + 1,
                outcome.label,
                m.total_return * 100.0,
                m.max_drawdown * 100.0,
                m.trade_count,
                m.win_rate * 100.0,
            );
        }
    }

    if ranked.is_empty() {
        eprintln!("error: every sweep case failed");
        return ExitCode::from(3);
    }
    ExitCode::SUCCESS
}
