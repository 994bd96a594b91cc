//! Performance metrics over a finished run.
//!
//! All ratios are fractions, not percents. With no trades, every
//! trade-derived figure is 0.0.

use super::portfolio::EquityPoint;
use super::position::Trade;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub trade_count: usize,
    pub win_rate: f64,
    pub total_return: f64,
    pub avg_return: f64,
    pub max_drawdown: f64,
    pub exposure: f64,
    pub starting_equity: f64,
    pub final_equity: f64,
    pub avg_gain: f64,
    /// Positive magnitude.
    pub avg_loss: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    pub profit_factor: f64,
    pub total_fees: f64,
    pub total_slippage: f64,
    pub avg_holding_bars: f64,
    pub median_holding_hours: f64,
}

impl Metrics {
    /// Metrics for a run that saw no bars.
    pub fn empty(starting_equity: f64) -> Self {
        Metrics::compute(&[], &[], starting_equity, 0)
    }

    pub fn compute(
        trades: &[Trade],
        equity_curve: &[EquityPoint],
        starting_equity: f64,
        bars_long: usize,
    ) -> Self {
        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(starting_equity);

        let total_return = if starting_equity > 0.0 {
            final_equity / starting_equity - 1.0
        } else {
            0.0
        };

        let curve: Vec<f64> = equity_curve.iter().map(|p| p.equity).collect();
        let max_drawdown = compute_drawdown(&curve);

        let exposure = if equity_curve.is_empty() {
            0.0
        } else {
            bars_long as f64 / equity_curve.len() as f64
        };

        let mut wins = 0usize;
        let mut losses = 0usize;
        let mut sum_gain = 0.0_f64;
        let mut sum_loss = 0.0_f64;
        let mut gross_profit = 0.0_f64;
        let mut gross_loss = 0.0_f64;
        let mut best_trade = f64::NEG_INFINITY;
        let mut worst_trade = f64::INFINITY;
        let mut total_fees = 0.0_f64;
        let mut total_slippage = 0.0_f64;
        let mut total_holding_bars = 0usize;

        for trade in trades {
            if trade.is_win() {
                wins += 1;
                sum_gain += trade.net_return;
            } else {
                losses += 1;
                sum_loss += trade.net_return.abs();
            }
            if trade.pnl > 0.0 {
                gross_profit += trade.pnl;
            } else {
                gross_loss += trade.pnl.abs();
            }
            best_trade = best_trade.max(trade.net_return);
            worst_trade = worst_trade.min(trade.net_return);
            total_fees += trade.fees;
            total_slippage += trade.slippage;
            total_holding_bars += trade.holding_period;
        }

        let trade_count = trades.len();
        if trade_count == 0 {
            best_trade = 0.0;
            worst_trade = 0.0;
        }

        let win_rate = ratio(wins as f64, trade_count);
        let avg_return = ratio(trades.iter().map(|t| t.net_return).sum(), trade_count);
        let avg_gain = ratio(sum_gain, wins);
        let avg_loss = ratio(sum_loss, losses);
        let avg_holding_bars = ratio(total_holding_bars as f64, trade_count);

        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let mut hours: Vec<f64> = trades.iter().map(Trade::holding_hours).collect();
        let median_holding_hours = median(&mut hours);

        Metrics {
            trade_count,
            win_rate,
            total_return,
            avg_return,
            max_drawdown,
            exposure,
            starting_equity,
            final_equity,
            avg_gain,
            avg_loss,
            best_trade,
            worst_trade,
            profit_factor,
            total_fees,
            total_slippage,
            avg_holding_bars,
            median_holding_hours,
        }
    }

    /// Flat `(name, value)` view, in report order.
    pub fn to_pairs(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("trade_count", self.trade_count as f64),
            ("win_rate", self.win_rate),
            ("total_return", self.total_return),
            ("avg_return", self.avg_return),
            ("max_drawdown", self.max_drawdown),
            ("exposure", self.exposure),
            ("starting_equity", self.starting_equity),
            ("final_equity", self.final_equity),
            ("avg_gain", self.avg_gain),
            ("avg_loss", self.avg_loss),
            ("best_trade", self.best_trade),
            ("worst_trade", self.worst_trade),
            ("profit_factor", self.profit_factor),
            ("total_fees", self.total_fees),
            ("total_slippage", self.total_slippage),
            ("avg_holding_bars", self.avg_holding_bars),
            ("median_holding_hours", self.median_holding_hours),
        ]
    }
}

/// Largest peak-to-trough decline as a fraction of the running peak.
pub fn compute_drawdown(curve: &[f64]) -> f64 {
    let Some(&first) = curve.first() else {
        return 0.0;
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    for &equity in curve {
        if equity > peak {
            peak = equity;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - equity) / peak);
        }
    }
    max_dd
}

fn ratio(numerator: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        numerator / count as f64
    }
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
