//! CSV report adapter implementing ReportPort.
//!
//! Writes `signals.csv`, `trades.csv`, `equity.csv` and `metrics.csv` into an
//! output directory, plus `sweep.csv` for parameter sweeps. `signals.csv`
//! keeps the indicator and candlestick pattern columns, so it can be read
//! back through the CSV data adapter.

use std::fs;
use std::path::Path;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::SignalbotError;
use crate::domain::metrics::Metrics;
use crate::domain::signal::SignalBar;
use crate::domain::sweep::SweepOutcome;
use crate::ports::report_port::ReportPort;
use chrono::NaiveDateTime;

pub const SIGNALS_FILE: &str = "signals.csv";
pub const TRADES_FILE: &str = "trades.csv";
pub const EQUITY_FILE: &str = "equity.csv";
pub const METRICS_FILE: &str = "metrics.csv";
pub const SWEEP_FILE: &str = "sweep.csv";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SIGNAL_HEADER: [&str; 22] = [
    "timestamp",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "rsi",
    "ema_fast",
    "ema_slow",
    "macd",
    "macd_signal",
    "macd_hist",
    "bb_upper",
    "bb_mid",
    "bb_lower",
    "signal",
    "signal_strength",
    "divergence",
    "doji",
    "hammer",
    "shooting_star",
    "engulfing",
];

const TRADE_HEADER: [&str; 12] = [
    "entry_time",
    "entry_price",
    "exit_time",
    "exit_price",
    "quantity",
    "fees",
    "slippage",
    "gross_return",
    "net_return",
    "pnl",
    "holding_period",
    "exit_reason",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        CsvReportAdapter
    }

    fn write_trades(&self, result: &BacktestResult, dir: &Path) -> Result<(), SignalbotError> {
        let mut wtr = csv::Writer::from_path(dir.join(TRADES_FILE))?;
        wtr.write_record(TRADE_HEADER)?;
        for t in &result.trades {
            wtr.write_record([
                fmt_time(t.entry_time),
                t.entry_price.to_string(),
                fmt_time(t.exit_time),
                t.exit_price.to_string(),
                t.quantity.to_string(),
                t.fees.to_string(),
                t.slippage.to_string(),
                t.gross_return.to_string(),
                t.net_return.to_string(),
                t.pnl.to_string(),
                t.holding_period.to_string(),
                t.exit_reason.to_string(),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_equity(&self, result: &BacktestResult, dir: &Path) -> Result<(), SignalbotError> {
        let mut wtr = csv::Writer::from_path(dir.join(EQUITY_FILE))?;
        wtr.write_record(["timestamp", "equity"])?;
        for point in &result.equity_curve {
            wtr.write_record([fmt_time(point.timestamp), point.equity.to_string()])?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_metrics(&self, result: &BacktestResult, dir: &Path) -> Result<(), SignalbotError> {
        let mut wtr = csv::Writer::from_path(dir.join(METRICS_FILE))?;
        wtr.write_record(["metric", "value"])?;
        for (name, value) in result.metrics.to_pairs() {
            wtr.write_record([name.to_string(), value.to_string()])?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(
        &self,
        result: &BacktestResult,
        signals: &[SignalBar],
        output_dir: &Path,
    ) -> Result<(), SignalbotError> {
        self.write_signals(signals, output_dir)?;
        self.write_trades(result, output_dir)?;
        self.write_equity(result, output_dir)?;
        self.write_metrics(result, output_dir)?;
        tracing::info!(dir = %output_dir.display(), "report written");
        Ok(())
    }

    fn write_signals(
        &self,
        signals: &[SignalBar],
        output_dir: &Path,
    ) -> Result<(), SignalbotError> {
        fs::create_dir_all(output_dir)?;
        let mut wtr = csv::Writer::from_path(output_dir.join(SIGNALS_FILE))?;
        wtr.write_record(SIGNAL_HEADER)?;
        for sb in signals {
            let bar = &sb.bar.ohlcv;
            let ind = &sb.bar.indicators;
            wtr.write_record([
                fmt_time(bar.timestamp),
                bar.open.to_string(),
                bar.high.to_string(),
                bar.low.to_string(),
                bar.close.to_string(),
                bar.volume.to_string(),
                fmt_opt(ind.rsi),
                fmt_opt(ind.ema_fast),
                fmt_opt(ind.ema_slow),
                fmt_opt(ind.macd),
                fmt_opt(ind.macd_signal),
                fmt_opt(ind.macd_hist),
                fmt_opt(ind.bb_upper),
                fmt_opt(ind.bb_mid),
                fmt_opt(ind.bb_lower),
                sb.signal.kind.to_string(),
                sb.signal.strength.to_string(),
                sb.signal.divergence.to_string(),
                ind.patterns.doji.to_string(),
                ind.patterns.hammer.to_string(),
                ind.patterns.shooting_star.to_string(),
                ind.patterns.engulfing.to_string(),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_sweep(
        &self,
        outcomes: &[SweepOutcome],
        output_dir: &Path,
    ) -> Result<(), SignalbotError> {
        fs::create_dir_all(output_dir)?;
        let mut wtr = csv::Writer::from_path(output_dir.join(SWEEP_FILE))?;

        let mut header = vec!["case".to_string(), "error".to_string()];
        header.extend(
            Metrics::empty(0.0)
                .to_pairs()
                .into_iter()
                .map(|(name, _)| name.to_string()),
        );
        wtr.write_record(&header)?;

        for outcome in outcomes {
            let mut record = vec![outcome.label.clone()];
            match &outcome.result {
                Ok(result) => {
                    record.push(String::new());
                    record.extend(result.metrics.to_pairs().into_iter().map(|(_, v)| v.to_string()));
                }
                Err(e) => {
                    record.push(e.to_string());
                    record.resize(header.len(), String::new());
                }
            }
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

fn fmt_time(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
