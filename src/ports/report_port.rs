//! Report generation port trait.

use std::path::Path;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::SignalbotError;
use crate::domain::signal::SignalBar;
use crate::domain::sweep::SweepOutcome;

/// Port for writing backtest reports.
pub trait ReportPort {
    fn write(
        &self,
        result: &BacktestResult,
        signals: &[SignalBar],
        output_dir: &Path,
    ) -> Result<(), SignalbotError>;

    /// Write only the labeled series.
    fn write_signals(&self, signals: &[SignalBar], output_dir: &Path)
    -> Result<(), SignalbotError>;

    /// One row per sweep case, in case order.
    fn write_sweep(&self, outcomes: &[SweepOutcome], output_dir: &Path)
    -> Result<(), SignalbotError>;
}
