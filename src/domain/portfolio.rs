//! Account state and equity tracking for a single-instrument, long-only run.

use chrono::NaiveDateTime;

use super::position::{Position, Trade};

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub cash: f64,
    pub starting_equity: f64,
    pub position: Option<Position>,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    /// Bars during which a position was open at any point.
    pub bars_long: usize,
}

impl Portfolio {
    pub fn new(starting_equity: f64) -> Self {
        Portfolio {
            cash: starting_equity,
            starting_equity,
            position: None,
            trades: Vec::new(),
            equity_curve: Vec::new(),
            bars_long: 0,
        }
    }

    pub fn is_long(&self) -> bool {
        self.position.is_some()
    }

    pub fn open(&mut self, position: Position) {
        self.position = Some(position);
    }

    pub fn take_position(&mut self) -> Option<Position> {
        self.position.take()
    }

    pub fn record_trade(&mut self, trade: Trade) {
        self.trades.push(trade);
    }

    pub fn record_equity(&mut self, timestamp: NaiveDateTime, equity: f64) {
        self.equity_curve.push(EquityPoint { timestamp, equity });
    }

    /// Cash plus the open position marked at `price`.
    pub fn mark(&self, price: f64) -> f64 {
        let position_value = self
            .position
            .as_ref()
            .map(|p| p.market_value(price))
            .unwrap_or(0.0);
        self.cash + position_value
    }
}
