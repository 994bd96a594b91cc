//! Parameter sweep: many independent signal + backtest runs over one dataset.

use std::cmp::Ordering;

use rayon::prelude::*;

use super::backtest::{BacktestConfig, BacktestResult, run_backtest};
use super::error::SignalbotError;
use super::indicator::EnrichedBar;
use super::signal::{SignalConfig, generate_signals};

#[derive(Debug, Clone, PartialEq)]
pub struct SweepCase {
    pub label: String,
    pub signal: SignalConfig,
    pub backtest: BacktestConfig,
}

#[derive(Debug)]
pub struct SweepOutcome {
    pub label: String,
    pub result: Result<BacktestResult, SignalbotError>,
}

impl SweepOutcome {
    pub fn total_return(&self) -> Option<f64> {
        self.result.as_ref().ok().map(|r| r.metrics.total_return)
    }
}

/// Evaluate every case in parallel. Output order matches `cases`.
pub fn run_sweep(bars: &[EnrichedBar], cases: &[SweepCase]) -> Vec<SweepOutcome> {
    tracing::info!(cases = cases.len(), bars = bars.len(), "starting sweep");
    cases
        .par_iter()
        .map(|case| SweepOutcome {
            label: case.label.clone(),
            result: evaluate(bars, case),
        })
        .collect()
}

fn evaluate(bars: &[EnrichedBar], case: &SweepCase) -> Result<BacktestResult, SignalbotError> {
    let signals = generate_signals(bars, &case.signal)?;
    run_backtest(&signals, &case.backtest)
}

/// Cartesian grid over RSI thresholds; pairs with `oversold >= overbought`
/// are dropped.
pub fn threshold_grid(
    base_signal: &SignalConfig,
    base_backtest: &BacktestConfig,
    oversold: &[f64],
    overbought: &[f64],
) -> Vec<SweepCase> {
    let mut cases = Vec::new();
    for &low in oversold {
        for &high in overbought {
            if low >= high {
                continue;
            }
            cases.push(SweepCase {
                label: format!("oversold={low} overbought={high}"),
                signal: SignalConfig {
                    oversold: low,
                    overbought: high,
                    ..base_signal.clone()
                },
                backtest: base_backtest.clone(),
            });
        }
    }
    cases
}

/// Successful outcomes ordered by total return, best first.
pub fn best_by_total_return(outcomes: &[SweepOutcome]) -> Vec<&SweepOutcome> {
    let mut ranked: Vec<&SweepOutcome> = outcomes.iter().filter(|o| o.result.is_ok()).collect();
    ranked.sort_by(|a, b| {
        b.total_return()
            .partial_cmp(&a.total_return())
            .unwrap_or(Ordering::Equal)
    });
    ranked
}
