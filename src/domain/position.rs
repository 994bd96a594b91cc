//! Open position and closed trade records.

use chrono::{Duration, NaiveDateTime};
use std::fmt;

/// The single long position the simulator may hold.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub entry_index: usize,
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    pub quantity: f64,
    pub entry_fee: f64,
    pub entry_slippage: f64,
}

impl Position {
    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity * price
    }

    /// Cash spent to open: notional plus entry fee and slippage.
    pub fn cost_basis(&self) -> f64 {
        self.quantity * self.entry_price + self.entry_fee + self.entry_slippage
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Signal,
    /// Forced liquidation at the final bar's close.
    EndOfData,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::Signal => "signal",
            ExitReason::EndOfData => "end_of_data",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    pub exit_time: NaiveDateTime,
    pub exit_price: f64,
    pub quantity: f64,
    /// Entry plus exit fee.
    pub fees: f64,
    /// Entry plus exit slippage cost.
    pub slippage: f64,
    pub gross_return: f64,
    pub net_return: f64,
    pub pnl: f64,
    /// Bars between the entry bar and the exit bar.
    pub holding_period: usize,
    pub exit_reason: ExitReason,
}

impl Trade {
    pub fn duration(&self) -> Duration {
        self.exit_time - self.entry_time
    }

    pub fn holding_hours(&self) -> f64 {
        self.duration().num_seconds() as f64 / 3600.0
    }

    pub fn is_win(&self) -> bool {
        self.net_return > 0.0
    }
}
