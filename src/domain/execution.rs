//! Fill simulation for the single long position.
//!
//! Entries commit the whole of available cash. Fees and slippage are charged
//! per side as a fraction of the traded notional.

use chrono::NaiveDateTime;

use super::backtest::BacktestConfig;
use super::portfolio::Portfolio;
use super::position::{ExitReason, Position, Trade};

/// Fee and slippage cost for one side of a trade.
pub fn side_costs(notional: f64, config: &BacktestConfig) -> (f64, f64) {
    (notional * config.fee_rate, notional * config.slippage_rate)
}

/// Largest quantity whose notional plus per-side costs fits in `cash`.
pub fn all_in_quantity(cash: f64, price: f64, config: &BacktestConfig) -> f64 {
    cash / (price * (1.0 + config.fee_rate + config.slippage_rate))
}

/// Result of an entry attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryResult {
    Entered {
        quantity: f64,
        price: f64,
        fee: f64,
        slippage: f64,
    },
    AlreadyLong,
    NoCapital,
}

/// Open a long position at `price` using all available cash.
pub fn enter_long(
    portfolio: &mut Portfolio,
    index: usize,
    timestamp: NaiveDateTime,
    price: f64,
    config: &BacktestConfig,
) -> EntryResult {
    if portfolio.is_long() {
        return EntryResult::AlreadyLong;
    }
    if portfolio.cash <= 0.0 {
        return EntryResult::NoCapital;
    }

    let quantity = all_in_quantity(portfolio.cash, price, config);
    let notional = quantity * price;
    let (fee, slippage) = side_costs(notional, config);

    portfolio.cash -= notional + fee + slippage;
    // Rounding can leave a sliver below zero.
    if portfolio.cash < 0.0 {
        portfolio.cash = 0.0;
    }

    portfolio.open(Position {
        entry_index: index,
        entry_time: timestamp,
        entry_price: price,
        quantity,
        entry_fee: fee,
        entry_slippage: slippage,
    });

    EntryResult::Entered {
        quantity,
        price,
        fee,
        slippage,
    }
}

/// Close the open position at `price`, crediting net proceeds to cash.
///
/// Returns `None` when flat.
pub fn exit_position(
    portfolio: &mut Portfolio,
    index: usize,
    timestamp: NaiveDateTime,
    price: f64,
    reason: ExitReason,
    config: &BacktestConfig,
) -> Option<Trade> {
    let position = portfolio.take_position()?;

    let notional = position.market_value(price);
    let (exit_fee, exit_slippage) = side_costs(notional, config);
    let proceeds = notional - exit_fee - exit_slippage;
    portfolio.cash += proceeds;

    let cost_basis = position.cost_basis();
    let pnl = proceeds - cost_basis;

    let trade = Trade {
        entry_time: position.entry_time,
        entry_price: position.entry_price,
        exit_time: timestamp,
        exit_price: price,
        quantity: position.quantity,
        fees: position.entry_fee + exit_fee,
        slippage: position.entry_slippage + exit_slippage,
        gross_return: price / position.entry_price - 1.0,
        net_return: pnl / cost_basis,
        pnl,
        holding_period: index.saturating_sub(position.entry_index),
        exit_reason: reason,
    };

    portfolio.record_trade(trade.clone());
    Some(trade)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn ts(hour: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::hours(hour)
    }

    fn frictionless() -> BacktestConfig {
        BacktestConfig {
            fee_rate: 0.0,
            slippage_rate: 0.0,
            starting_equity: 10_000.0,
            ..BacktestConfig::default()
        }
    }

    fn costly() -> BacktestConfig {
        BacktestConfig {
            fee_rate: 0.001,
            slippage_rate: 0.0005,
            starting_equity: 10_000.0,
            ..BacktestConfig::default()
        }
    }

    #[test]
    fn side_costs_scale_with_notional() {
        let (fee, slip) = side_costs(1_000.0, &costly());
        assert!((fee - 1.0).abs() < 1e-12);
        assert!((slip - 0.5).abs() < 1e-12);
    }

    #[test]
    fn frictionless_entry_spends_all_cash() {
        let mut portfolio = Portfolio::new(10_000.0);
        let result = enter_long(&mut portfolio, 0, ts(0), 100.0, &frictionless());

        match result {
            EntryResult::Entered { quantity, fee, .. } => {
                assert!((quantity - 100.0).abs() < 1e-9);
                assert!(fee.abs() < f64::EPSILON);
            }
            other => panic!("expected Entered, got {other:?}"),
        }
        assert!(portfolio.cash.abs() < 1e-9);
        assert!(portfolio.is_long());
    }

    #[test]
    fn costly_entry_reserves_room_for_costs() {
        let config = costly();
        let mut portfolio = Portfolio::new(10_000.0);
        enter_long(&mut portfolio, 0, ts(0), 100.0, &config);

        let pos = portfolio.position.as_ref().unwrap();
        assert!((pos.cost_basis() - 10_000.0).abs() < 1e-6);
        assert!(pos.quantity < 100.0);
        assert!(portfolio.cash.abs() < 1e-6);
    }

    #[test]
    fn second_entry_is_rejected() {
        let config = frictionless();
        let mut portfolio = Portfolio::new(10_000.0);
        enter_long(&mut portfolio, 0, ts(0), 100.0, &config);
        let result = enter_long(&mut portfolio, 1, ts(4), 90.0, &config);
        assert_eq!(result, EntryResult::AlreadyLong);
        assert!((portfolio.position.as_ref().unwrap().entry_price - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn frictionless_round_trip() {
        let config = frictionless();
        let mut portfolio = Portfolio::new(10_000.0);
        enter_long(&mut portfolio, 2, ts(8), 100.0, &config);
        let trade = exit_position(&mut portfolio, 5, ts(20), 110.0, ExitReason::Signal, &config)
            .unwrap();

        assert!((trade.gross_return - 0.1).abs() < 1e-12);
        assert!((trade.net_return - 0.1).abs() < 1e-12);
        assert!((trade.pnl - 1_000.0).abs() < 1e-6);
        assert_eq!(trade.holding_period, 3);
        assert_eq!(trade.exit_reason, ExitReason::Signal);
        assert!((portfolio.cash - 11_000.0).abs() < 1e-6);
        assert!(!portfolio.is_long());
        assert_eq!(portfolio.trades.len(), 1);
    }

    #[test]
    fn costs_reduce_net_return() {
        let config = costly();
        let mut portfolio = Portfolio::new(10_000.0);
        enter_long(&mut portfolio, 0, ts(0), 100.0, &config);
        let trade =
            exit_position(&mut portfolio, 1, ts(4), 110.0, ExitReason::Signal, &config).unwrap();

        let cost = config.fee_rate + config.slippage_rate;
        let expected = 1.1 * (1.0 - cost) / (1.0 + cost) - 1.0;
        assert!((trade.net_return - expected).abs() < 1e-12);
        assert!(trade.net_return < trade.gross_return);
        assert!(trade.fees > 0.0);
        assert!(trade.slippage > 0.0);
        assert!((portfolio.cash - 10_000.0 * (1.0 + expected)).abs() < 1e-6);
    }

    #[test]
    fn flat_exit_returns_none() {
        let mut portfolio = Portfolio::new(10_000.0);
        let trade = exit_position(
            &mut portfolio,
            0,
            ts(0),
            100.0,
            ExitReason::EndOfData,
            &frictionless(),
        );
        assert!(trade.is_none());
        assert!(portfolio.trades.is_empty());
    }

    #[test]
    fn losing_trade_has_negative_pnl() {
        let config = costly();
        let mut portfolio = Portfolio::new(10_000.0);
        enter_long(&mut portfolio, 0, ts(0), 100.0, &config);
        let trade =
            exit_position(&mut portfolio, 1, ts(4), 95.0, ExitReason::Signal, &config).unwrap();
        assert!(trade.pnl < 0.0);
        assert!(trade.net_return < -0.05);
        assert!(!trade.is_win());
    }
}
