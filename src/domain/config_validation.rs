//! Configuration validation.
//!
//! Validates every config struct before a signal pass or backtest runs.

use crate::domain::backtest::BacktestConfig;
use crate::domain::error::SignalbotError;
use crate::domain::indicator::IndicatorParams;
use crate::domain::signal::SignalConfig;

pub fn validate_signal_config(config: &SignalConfig) -> Result<(), SignalbotError> {
    validate_threshold("oversold", config.oversold)?;
    validate_threshold("overbought", config.overbought)?;
    if config.oversold >= config.overbought {
        return Err(SignalbotError::invalid(
            "signals",
            "oversold",
            "oversold must be below overbought",
        ));
    }
    validate_period("signals", "trend_ema_period", config.trend_ema_period)?;
    validate_period("signals", "divergence_lookback", config.divergence_lookback)?;
    Ok(())
}

pub fn validate_backtest_config(config: &BacktestConfig) -> Result<(), SignalbotError> {
    validate_rate("fee_rate", config.fee_rate)?;
    validate_rate("slippage_rate", config.slippage_rate)?;
    if config.fee_rate + config.slippage_rate >= 1.0 {
        return Err(SignalbotError::invalid(
            "backtest",
            "slippage_rate",
            "fee_rate + slippage_rate must be below 1",
        ));
    }
    if !config.starting_equity.is_finite() || config.starting_equity <= 0.0 {
        return Err(SignalbotError::invalid(
            "backtest",
            "starting_equity",
            "starting_equity must be positive",
        ));
    }
    Ok(())
}

pub fn validate_indicator_params(params: &IndicatorParams) -> Result<(), SignalbotError> {
    validate_period("indicators", "rsi_period", params.rsi_period)?;
    validate_period("indicators", "ema_fast_period", params.ema_fast_period)?;
    validate_period("signals", "trend_ema_period", params.trend_ema_period)?;
    validate_period("indicators", "macd_fast", params.macd_fast)?;
    validate_period("indicators", "macd_slow", params.macd_slow)?;
    validate_period("indicators", "macd_signal", params.macd_signal)?;
    validate_period("indicators", "bb_period", params.bb_period)?;
    if params.macd_fast >= params.macd_slow {
        return Err(SignalbotError::invalid(
            "indicators",
            "macd_fast",
            "macd_fast must be below macd_slow",
        ));
    }
    if !params.bb_stddev.is_finite() || params.bb_stddev <= 0.0 {
        return Err(SignalbotError::invalid(
            "indicators",
            "bb_stddev",
            "bb_stddev must be positive",
        ));
    }
    Ok(())
}

fn validate_threshold(key: &str, value: f64) -> Result<(), SignalbotError> {
    if !(0.0..=100.0).contains(&value) {
        return Err(SignalbotError::invalid(
            "signals",
            key,
            format!("{key} must be between 0 and 100"),
        ));
    }
    Ok(())
}

fn validate_period(section: &str, key: &str, value: usize) -> Result<(), SignalbotError> {
    if value == 0 {
        return Err(SignalbotError::invalid(
            section,
            key,
            format!("{key} must be at least 1"),
        ));
    }
    Ok(())
}

fn validate_rate(key: &str, value: f64) -> Result<(), SignalbotError> {
    if !value.is_finite() || value < 0.0 {
        return Err(SignalbotError::invalid(
            "backtest",
            key,
            format!("{key} must be non-negative"),
        ));
    }
    Ok(())
}
