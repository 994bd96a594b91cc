//! MACD (Moving Average Convergence Divergence) indicator.
//!
//! MACD Line = EMA(fast) - EMA(slow)
//! Signal Line = EMA(signal) of MACD Line
//! Histogram = MACD Line - Signal Line
//!
//! Default parameters: fast=12, slow=26, signal=9
//! Warmup: the line needs max(fast, slow) - 1 bars, the signal line a further
//! signal - 1 bars.

use crate::domain::indicator::Series;
use crate::domain::indicator::ema::{calculate_ema, ema_of};
use crate::domain::ohlcv::OhlcvBar;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub line: Series,
    pub signal: Series,
    pub histogram: Series,
}

pub fn calculate_macd(
    bars: &[OhlcvBar],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> MacdSeries {
    let n = bars.len();
    let ema_fast = calculate_ema(bars, fast);
    let ema_slow = calculate_ema(bars, slow);

    let line: Series = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();

    let mut signal: Series = vec![None; n];
    if let Some(start) = line.iter().position(Option::is_some) {
        let defined: Vec<f64> = line[start..].iter().flatten().copied().collect();
        for (offset, value) in ema_of(&defined, signal_period).into_iter().enumerate() {
            signal[start + offset] = value;
        }
    }

    let histogram: Series = line
        .iter()
        .zip(&signal)
        .map(|(l, s)| Some((*l)? - (*s)?))
        .collect();

    MacdSeries {
        line,
        signal,
        histogram,
    }
}

pub fn calculate_macd_default(bars: &[OhlcvBar]) -> MacdSeries {
    calculate_macd(bars, DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL)
}
