//! Backtest engine: walks a labeled series once, holding at most one long
//! position, and produces trades, a per-bar equity curve and metrics.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;

use super::config_validation::validate_backtest_config;
use super::error::SignalbotError;
use super::execution::{EntryResult, enter_long, exit_position};
use super::metrics::Metrics;
use super::portfolio::{EquityPoint, Portfolio};
use super::position::{ExitReason, Trade};
use super::signal::{SignalBar, SignalKind};
use super::validation::{DataWarning, inspect, validate_prices, validate_timeline};

/// Which price an order triggered on a bar fills at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPrice {
    SameBarClose,
    NextBarOpen,
}

impl ExecutionPrice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionPrice::SameBarClose => "same-bar-close",
            ExecutionPrice::NextBarOpen => "next-bar-open",
        }
    }
}

impl fmt::Display for ExecutionPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionPrice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "same-bar-close" | "close" => Ok(ExecutionPrice::SameBarClose),
            "next-bar-open" | "open" => Ok(ExecutionPrice::NextBarOpen),
            other => Err(format!(
                "unknown execution price '{other}' (expected same-bar-close|next-bar-open)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub fee_rate: f64,
    pub slippage_rate: f64,
    pub starting_equity: f64,
    pub execution_price: ExecutionPrice,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            fee_rate: 0.0007,
            slippage_rate: 0.0005,
            starting_equity: 10_000.0,
            execution_price: ExecutionPrice::SameBarClose,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub metrics: Metrics,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub warnings: Vec<DataWarning>,
}

/// Run one simulation over `bars`.
///
/// Signals that disagree with the simulator's own position state (an exit
/// while flat, an entry while long) are ignored.
pub fn run_backtest(
    bars: &[SignalBar],
    config: &BacktestConfig,
) -> Result<BacktestResult, SignalbotError> {
    validate_backtest_config(config)?;
    validate_timeline(bars.iter().map(|b| &b.bar.ohlcv))?;
    validate_prices(
        bars.iter().map(|b| &b.bar.ohlcv),
        config.execution_price == ExecutionPrice::NextBarOpen,
    )?;

    if bars.is_empty() {
        tracing::info!("no bars to simulate");
        return Ok(BacktestResult {
            metrics: Metrics::empty(config.starting_equity),
            trades: Vec::new(),
            equity_curve: Vec::new(),
            warnings: Vec::new(),
        });
    }

    let warnings = inspect(bars);
    let last = bars.len() - 1;
    let mut portfolio = Portfolio::new(config.starting_equity);
    let mut pending: Option<SignalKind> = None;

    for (index, signal_bar) in bars.iter().enumerate() {
        let bar = &signal_bar.bar.ohlcv;
        let mut long_this_bar = portfolio.is_long();

        if let Some(kind) = pending.take() {
            apply_signal(&mut portfolio, kind, index, last, bar.timestamp, bar.open, config);
            long_this_bar |= portfolio.is_long();
        }

        let kind = signal_bar.signal.kind;
        match config.execution_price {
            ExecutionPrice::SameBarClose => {
                apply_signal(&mut portfolio, kind, index, last, bar.timestamp, bar.close, config);
            }
            ExecutionPrice::NextBarOpen => {
                if index < last && matches!(kind, SignalKind::LongEntry | SignalKind::LongExit) {
                    pending = Some(kind);
                }
            }
        }
        long_this_bar |= portfolio.is_long();

        if index == last && portfolio.is_long() {
            if let Some(trade) = exit_position(
                &mut portfolio,
                index,
                bar.timestamp,
                bar.close,
                ExitReason::EndOfData,
                config,
            ) {
                tracing::debug!(
                    exit_time = %trade.exit_time,
                    net_return = trade.net_return,
                    "forced close at end of data"
                );
            }
        }

        if long_this_bar {
            portfolio.bars_long += 1;
        }
        let equity = portfolio.mark(bar.close);
        portfolio.record_equity(bar.timestamp, equity);
    }

    let metrics = Metrics::compute(
        &portfolio.trades,
        &portfolio.equity_curve,
        config.starting_equity,
        portfolio.bars_long,
    );

    tracing::info!(
        bars = bars.len(),
        trades = metrics.trade_count,
        total_return = metrics.total_return,
        max_drawdown = metrics.max_drawdown,
        warnings = warnings.len(),
        "backtest complete"
    );

    Ok(BacktestResult {
        metrics,
        trades: portfolio.trades,
        equity_curve: portfolio.equity_curve,
        warnings,
    })
}

fn apply_signal(
    portfolio: &mut Portfolio,
    kind: SignalKind,
    index: usize,
    last: usize,
    timestamp: NaiveDateTime,
    price: f64,
    config: &BacktestConfig,
) {
    match kind {
        SignalKind::LongEntry if index == last => {
            tracing::trace!(%timestamp, "entry on final bar skipped");
        }
        SignalKind::LongEntry => match enter_long(portfolio, index, timestamp, price, config) {
            EntryResult::Entered { quantity, .. } => {
                tracing::debug!(%timestamp, price, quantity, "entered long");
            }
            EntryResult::AlreadyLong => {
                tracing::trace!(%timestamp, "entry while long ignored");
            }
            EntryResult::NoCapital => {
                tracing::trace!(%timestamp, "entry without capital ignored");
            }
        },
        SignalKind::LongExit => {
            match exit_position(portfolio, index, timestamp, price, ExitReason::Signal, config) {
                Some(trade) => {
                    tracing::debug!(
                        %timestamp,
                        price,
                        net_return = trade.net_return,
                        "exited long"
                    );
                }
                None => tracing::trace!(%timestamp, "exit while flat ignored"),
            }
        }
        SignalKind::Hold | SignalKind::None => {}
    }
}
