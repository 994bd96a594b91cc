//! Candlestick pattern detection.
//!
//! - Doji: body <= 10% of the range
//! - Hammer: lower shadow >= 2x body, upper shadow <= body, body <= 30% of range
//! - Shooting star: mirror of the hammer
//! - Engulfing: body fully covers the previous opposite-colored body
//!
//! A bar with zero range never matches.

use crate::domain::indicator::CandlePatterns;
use crate::domain::ohlcv::OhlcvBar;

const DOJI_BODY_RATIO: f64 = 0.1;
const SHADOW_RATIO: f64 = 2.0;
const SMALL_BODY_RATIO: f64 = 0.3;

pub fn detect_patterns(bars: &[OhlcvBar]) -> Vec<CandlePatterns> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| CandlePatterns {
            doji: is_doji(bar),
            hammer: is_hammer(bar),
            shooting_star: is_shooting_star(bar),
            engulfing: if i == 0 { 0 } else { engulfing(&bars[i - 1], bar) },
        })
        .collect()
}

pub fn is_doji(bar: &OhlcvBar) -> bool {
    let range = bar.range();
    range > 0.0 && bar.body() <= range * DOJI_BODY_RATIO
}

pub fn is_hammer(bar: &OhlcvBar) -> bool {
    let range = bar.range();
    let body = bar.body();
    range > 0.0
        && bar.lower_shadow() >= SHADOW_RATIO * body
        && bar.upper_shadow() <= body
        && body <= range * SMALL_BODY_RATIO
}

pub fn is_shooting_star(bar: &OhlcvBar) -> bool {
    let range = bar.range();
    let body = bar.body();
    range > 0.0
        && bar.upper_shadow() >= SHADOW_RATIO * body
        && bar.lower_shadow() <= body
        && body <= range * SMALL_BODY_RATIO
}

/// +1 bullish engulfing, -1 bearish engulfing, 0 otherwise.
pub fn engulfing(prev: &OhlcvBar, bar: &OhlcvBar) -> i8 {
    let bullish = bar.close > bar.open
        && prev.close < prev.open
        && bar.close >= prev.open
        && bar.open <= prev.close;
    let bearish = bar.close < bar.open
        && prev.close > prev.open
        && bar.open >= prev.close
        && bar.close <= prev.open;

    if bullish {
        1
    } else if bearish {
        -1
    } else {
        0
    }
}
