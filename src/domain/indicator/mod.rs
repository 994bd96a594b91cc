//! Technical indicator implementations.
//!
//! This module provides the indicator-annotated bar table consumed by the
//! signal engine:
//! - `IndicatorRow`: indicator values for one bar, `None` while warming up
//! - `CandlePatterns`: candlestick pattern flags for one bar
//! - `EnrichedBar`: an OHLCV bar plus its indicator row
//! - `IndicatorParams`: periods used by [`compute_indicators`]
//!
//! Every calculator returns one entry per input bar, so series stay aligned
//! with the timeline.

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod patterns;
pub mod rsi;

pub use bollinger::calculate_bollinger;
pub use ema::calculate_ema;
pub use macd::calculate_macd;
pub use patterns::detect_patterns;
pub use rsi::calculate_rsi;

use crate::domain::ohlcv::OhlcvBar;

/// An indicator series aligned to the bar timeline.
pub type Series = Vec<Option<f64>>;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CandlePatterns {
    pub doji: bool,
    pub hammer: bool,
    pub shooting_star: bool,
    /// +1 bullish engulfing, -1 bearish engulfing, 0 none.
    pub engulfing: i8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IndicatorRow {
    pub rsi: Option<f64>,
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_hist: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_mid: Option<f64>,
    pub bb_lower: Option<f64>,
    pub patterns: CandlePatterns,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedBar {
    pub ohlcv: OhlcvBar,
    pub indicators: IndicatorRow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorParams {
    pub rsi_period: usize,
    pub ema_fast_period: usize,
    /// Period of the slow ("trend") EMA.
    pub trend_ema_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bb_period: usize,
    pub bb_stddev: f64,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        IndicatorParams {
            rsi_period: 14,
            ema_fast_period: 12,
            trend_ema_period: 26,
            macd_fast: macd::DEFAULT_FAST,
            macd_slow: macd::DEFAULT_SLOW,
            macd_signal: macd::DEFAULT_SIGNAL,
            bb_period: 20,
            bb_stddev: 2.0,
        }
    }
}

/// Annotate raw bars with every indicator the signal engine reads.
pub fn compute_indicators(bars: &[OhlcvBar], params: &IndicatorParams) -> Vec<EnrichedBar> {
    let rsi = calculate_rsi(bars, params.rsi_period);
    let ema_fast = calculate_ema(bars, params.ema_fast_period);
    let ema_slow = calculate_ema(bars, params.trend_ema_period);
    let macd = calculate_macd(bars, params.macd_fast, params.macd_slow, params.macd_signal);
    let bands = calculate_bollinger(bars, params.bb_period, params.bb_stddev);
    let patterns = detect_patterns(bars);

    bars.iter()
        .enumerate()
        .map(|(i, bar)| EnrichedBar {
            ohlcv: bar.clone(),
            indicators: IndicatorRow {
                rsi: rsi[i],
                ema_fast: ema_fast[i],
                ema_slow: ema_slow[i],
                macd: macd.line[i],
                macd_signal: macd.signal[i],
                macd_hist: macd.histogram[i],
                bb_upper: bands.upper[i],
                bb_mid: bands.middle[i],
                bb_lower: bands.lower[i],
                patterns: patterns[i],
            },
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::test_support::bars_from_closes;
    use super::*;

    #[test]
    fn compute_indicators_preserves_length_and_order() {
        let prices: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        let bars = bars_from_closes(&prices);
        let enriched = compute_indicators(&bars, &IndicatorParams::default());

        assert_eq!(enriched.len(), bars.len());
        for (e, b) in enriched.iter().zip(&bars) {
            assert_eq!(e.ohlcv.timestamp, b.timestamp);
        }
    }

    #[test]
    fn compute_indicators_warmup_only_at_head() {
        let prices: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.3).cos() * 3.0).collect();
        let bars = bars_from_closes(&prices);
        let enriched = compute_indicators(&bars, &IndicatorParams::default());

        let first_rsi = enriched.iter().position(|b| b.indicators.rsi.is_some()).unwrap();
        assert_eq!(first_rsi, 14);
        assert!(enriched[first_rsi..].iter().all(|b| b.indicators.rsi.is_some()));

        let first_hist = enriched
            .iter()
            .position(|b| b.indicators.macd_hist.is_some())
            .unwrap();
        assert_eq!(first_hist, 26 - 1 + 9 - 1);
    }

    #[test]
    fn compute_indicators_empty() {
        let enriched = compute_indicators(&[], &IndicatorParams::default());
        assert!(enriched.is_empty());
    }

    #[test]
    fn default_params() {
        let p = IndicatorParams::default();
        assert_eq!(p.rsi_period, 14);
        assert_eq!(p.ema_fast_period, 12);
        assert_eq!(p.trend_ema_period, 26);
        assert_eq!((p.macd_fast, p.macd_slow, p.macd_signal), (12, 26, 9));
        assert_eq!(p.bb_period, 20);
        assert!((p.bb_stddev - 2.0).abs() < f64::EPSILON);
    }
}
