//! Signal engine: classifies indicator-annotated bars into entry/exit labels.
//!
//! Labels come from an RSI threshold cross confirmed by a trend filter and,
//! optionally, by MACD. The engine keeps its own open/flat cursor purely for
//! labeling (`Hold` vs `None`, trend-invalidation exits). That cursor is
//! advisory: the backtest simulator keeps the authoritative position state and
//! may ignore labels that disagree with it.
//!
//! Every decision for bar `t` reads bars `..=t` only.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use crate::domain::config_validation::validate_signal_config;
use crate::domain::error::SignalbotError;
use crate::domain::indicator::EnrichedBar;
use crate::domain::validation::validate_timeline;

/// Histogram size, as a fraction of close, that saturates the MACD component.
const MACD_SATURATION: f64 = 0.01;
const RSI_WEIGHT: f64 = 0.4;
const TREND_WEIGHT: f64 = 0.35;
const MACD_WEIGHT: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendFilter {
    /// Close above the slow (trend) EMA.
    Close,
    /// Fast EMA above the slow EMA.
    Crossover,
}

impl FromStr for TrendFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "close" => Ok(TrendFilter::Close),
            "crossover" | "ema-cross" => Ok(TrendFilter::Crossover),
            other => Err(format!("unknown trend filter '{other}' (expected close|crossover)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    LongEntry,
    LongExit,
    Hold,
    None,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::LongEntry => "LONG_ENTRY",
            SignalKind::LongExit => "LONG_EXIT",
            SignalKind::Hold => "HOLD",
            SignalKind::None => "NONE",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LONG_ENTRY" => Ok(SignalKind::LongEntry),
            "LONG_EXIT" => Ok(SignalKind::LongExit),
            "HOLD" => Ok(SignalKind::Hold),
            "NONE" | "" => Ok(SignalKind::None),
            other => Err(format!("unknown signal '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Divergence {
    Bullish,
    Bearish,
    None,
}

impl Divergence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Divergence::Bullish => "BULLISH_DIVERGENCE",
            Divergence::Bearish => "BEARISH_DIVERGENCE",
            Divergence::None => "NONE",
        }
    }
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signal {
    pub kind: SignalKind,
    /// Confluence score in [-1, 1]; positive is bullish.
    pub strength: f64,
    pub divergence: Divergence,
}

impl Signal {
    pub fn none() -> Self {
        Signal {
            kind: SignalKind::None,
            strength: 0.0,
            divergence: Divergence::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalBar {
    pub bar: EnrichedBar,
    pub signal: Signal,
}

impl Borrow<EnrichedBar> for SignalBar {
    fn borrow(&self) -> &EnrichedBar {
        &self.bar
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalConfig {
    pub oversold: f64,
    pub overbought: f64,
    /// Period of the EMA carried in the `ema_slow` column.
    pub trend_ema_period: usize,
    pub trend_filter: TrendFilter,
    pub macd_confirm: bool,
    pub divergence_lookback: usize,
}

impl Default for SignalConfig {
    fn default() -> Self {
        SignalConfig {
            oversold: 30.0,
            overbought: 70.0,
            trend_ema_period: 26,
            trend_filter: TrendFilter::Crossover,
            macd_confirm: true,
            divergence_lookback: 14,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Bullish,
    Broken,
    Flat,
}

/// Everything the classifier needs for one bar; absent during warm-up.
#[derive(Debug, Clone, Copy)]
struct Reading {
    rsi: f64,
    prev_rsi: f64,
    trend: Trend,
    macd_ok: bool,
}

/// Produce one signal per input bar, preserving order and length.
pub fn generate_signals(
    bars: &[EnrichedBar],
    config: &SignalConfig,
) -> Result<Vec<SignalBar>, SignalbotError> {
    validate_signal_config(config)?;
    validate_timeline(bars.iter().map(|b| &b.ohlcv))?;

    let mut cursor_open = false;
    let mut out = Vec::with_capacity(bars.len());

    for t in 0..bars.len() {
        let signal = match read(bars, t, config) {
            Some(reading) => {
                let kind = label(&reading, config, &mut cursor_open);
                Signal {
                    kind,
                    strength: signal_strength(&bars[t], reading.trend, config),
                    divergence: detect_divergence(bars, t, config.divergence_lookback),
                }
            }
            None => Signal::none(),
        };
        out.push(SignalBar {
            bar: bars[t].clone(),
            signal,
        });
    }

    tracing::debug!(
        bars = out.len(),
        entries = out
            .iter()
            .filter(|b| b.signal.kind == SignalKind::LongEntry)
            .count(),
        exits = out
            .iter()
            .filter(|b| b.signal.kind == SignalKind::LongExit)
            .count(),
        "signals generated"
    );

    Ok(out)
}

fn read(bars: &[EnrichedBar], t: usize, config: &SignalConfig) -> Option<Reading> {
    let prev = bars.get(t.checked_sub(1)?)?;
    let rsi = bars[t].indicators.rsi?;
    let prev_rsi = prev.indicators.rsi?;
    let trend = trend_at(&bars[t], config.trend_filter)?;
    let macd_ok = if config.macd_confirm {
        macd_confirms(bars, t)?
    } else {
        true
    };
    Some(Reading {
        rsi,
        prev_rsi,
        trend,
        macd_ok,
    })
}

fn label(reading: &Reading, config: &SignalConfig, cursor_open: &mut bool) -> SignalKind {
    let crossed_up = reading.prev_rsi < config.oversold && reading.rsi >= config.oversold;
    let crossed_down = reading.prev_rsi > config.overbought && reading.rsi <= config.overbought;

    if *cursor_open {
        if crossed_down || reading.trend == Trend::Broken {
            *cursor_open = false;
            SignalKind::LongExit
        } else {
            SignalKind::Hold
        }
    } else if crossed_up && reading.trend == Trend::Bullish && reading.macd_ok {
        *cursor_open = true;
        SignalKind::LongEntry
    } else if crossed_down {
        SignalKind::LongExit
    } else {
        SignalKind::None
    }
}

pub fn trend_at(bar: &EnrichedBar, filter: TrendFilter) -> Option<Trend> {
    let slow = bar.indicators.ema_slow?;
    let reference = match filter {
        TrendFilter::Close => bar.ohlcv.close,
        TrendFilter::Crossover => bar.indicators.ema_fast?,
    };
    Some(if reference > slow {
        Trend::Bullish
    } else if reference < slow {
        Trend::Broken
    } else {
        Trend::Flat
    })
}

/// MACD line above its signal line, or the histogram rising.
fn macd_confirms(bars: &[EnrichedBar], t: usize) -> Option<bool> {
    let ind = &bars[t].indicators;
    let (line, signal, hist) = (ind.macd?, ind.macd_signal?, ind.macd_hist?);
    let rising = t
        .checked_sub(1)
        .and_then(|p| bars[p].indicators.macd_hist)
        .is_some_and(|prev| hist > prev);
    Some(line > signal || rising)
}

/// Weighted RSI extremity, trend alignment and MACD histogram, in [-1, 1].
pub fn signal_strength(bar: &EnrichedBar, trend: Trend, config: &SignalConfig) -> f64 {
    let ind = &bar.indicators;
    let half_band = (config.overbought - config.oversold) / 2.0;
    let rsi_c = match ind.rsi {
        Some(rsi) if half_band > 0.0 => ((50.0 - rsi) / half_band).clamp(-1.0, 1.0),
        _ => 0.0,
    };
    let trend_c = match trend {
        Trend::Bullish => 1.0,
        Trend::Broken => -1.0,
        Trend::Flat => 0.0,
    };
    let close = bar.ohlcv.close;
    let macd_c = match ind.macd_hist {
        Some(hist) if close > 0.0 => (hist / (MACD_SATURATION * close)).tanh(),
        _ => 0.0,
    };

    (RSI_WEIGHT * rsi_c + TREND_WEIGHT * trend_c + MACD_WEIGHT * macd_c).clamp(-1.0, 1.0)
}

/// Compare bar `t` against the lowest/highest close of the `lookback` bars
/// before it. A new low with a higher RSI is bullish; a new high with a
/// lower RSI is bearish. Equal extremes resolve to the most recent one.
pub fn detect_divergence(bars: &[EnrichedBar], t: usize, lookback: usize) -> Divergence {
    let Some(rsi) = bars[t].indicators.rsi else {
        return Divergence::None;
    };
    let close = bars[t].ohlcv.close;
    let start = t.saturating_sub(lookback);

    let mut low: Option<(f64, f64)> = None;
    let mut high: Option<(f64, f64)> = None;
    for bar in &bars[start..t] {
        let Some(r) = bar.indicators.rsi else {
            continue;
        };
        let c = bar.ohlcv.close;
        if low.is_none_or(|(lc, _)| c <= lc) {
            low = Some((c, r));
        }
        if high.is_none_or(|(hc, _)| c >= hc) {
            high = Some((c, r));
        }
    }

    match (low, high) {
        (Some((lc, lr)), _) if close < lc && rsi > lr => Divergence::Bullish,
        (_, Some((hc, hr))) if close > hc && rsi < hr => Divergence::Bearish,
        _ => Divergence::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::IndicatorRow;
    use crate::domain::ohlcv::OhlcvBar;
    use chrono::{Duration, NaiveDate};

    /// Bars with a bullish EMA stack and MACD above signal unless overridden.
    fn bars_with_rsi(rsi: &[Option<f64>]) -> Vec<EnrichedBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        rsi.iter()
            .enumerate()
            .map(|(i, &r)| EnrichedBar {
                ohlcv: OhlcvBar {
                    timestamp: start + Duration::hours(4 * i as i64),
                    open: 100.0,
                    high: 101.0,
                    low: 99.0,
                    close: 100.0,
                    volume: 10.0,
                },
                indicators: IndicatorRow {
                    rsi: r,
                    ema_fast: Some(101.0),
                    ema_slow: Some(100.0),
                    macd: Some(0.5),
                    macd_signal: Some(0.2),
                    macd_hist: Some(0.3),
                    ..IndicatorRow::default()
                },
            })
            .collect()
    }

    fn kinds(out: &[SignalBar]) -> Vec<SignalKind> {
        out.iter().map(|b| b.signal.kind).collect()
    }

    fn config(oversold: f64, overbought: f64) -> SignalConfig {
        SignalConfig {
            oversold,
            overbought,
            ..SignalConfig::default()
        }
    }

    #[test]
    fn entry_fires_on_upward_cross_only() {
        let bars = bars_with_rsi(&[Some(28.0), Some(24.0), Some(22.0), Some(26.0), Some(31.0)]);
        let out = generate_signals(&bars, &config(25.0, 70.0)).unwrap();
        assert_eq!(
            kinds(&out),
            vec![
                SignalKind::None,
                SignalKind::None,
                SignalKind::None,
                SignalKind::LongEntry,
                SignalKind::Hold,
            ]
        );
    }

    #[test]
    fn threshold_tie_counts_as_cross() {
        let bars = bars_with_rsi(&[Some(20.0), Some(30.0), Some(75.0), Some(70.0)]);
        let out = generate_signals(&bars, &config(30.0, 70.0)).unwrap();
        assert_eq!(
            kinds(&out),
            vec![
                SignalKind::None,
                SignalKind::LongEntry,
                SignalKind::Hold,
                SignalKind::LongExit,
            ]
        );
    }

    #[test]
    fn warmup_yields_none() {
        let bars = bars_with_rsi(&[None, None, Some(20.0), Some(35.0)]);
        let out = generate_signals(&bars, &SignalConfig::default()).unwrap();
        assert_eq!(out[0].signal, Signal::none());
        assert_eq!(out[1].signal, Signal::none());
        assert_eq!(out[2].signal, Signal::none());
        assert_eq!(out[3].signal.kind, SignalKind::LongEntry);
    }

    #[test]
    fn undefined_trend_blocks_entry() {
        let mut bars = bars_with_rsi(&[Some(20.0), Some(35.0)]);
        bars[1].indicators.ema_slow = None;
        let out = generate_signals(&bars, &SignalConfig::default()).unwrap();
        assert_eq!(out[1].signal, Signal::none());
    }

    #[test]
    fn bearish_trend_blocks_entry() {
        let mut bars = bars_with_rsi(&[Some(20.0), Some(35.0)]);
        bars[1].indicators.ema_fast = Some(99.0);
        let out = generate_signals(&bars, &SignalConfig::default()).unwrap();
        assert_eq!(out[1].signal.kind, SignalKind::None);
    }

    #[test]
    fn close_trend_filter_uses_close() {
        let mut bars = bars_with_rsi(&[Some(20.0), Some(35.0)]);
        bars[1].indicators.ema_fast = Some(90.0);
        bars[1].indicators.ema_slow = Some(95.0);
        let cfg = SignalConfig {
            trend_filter: TrendFilter::Close,
            ..SignalConfig::default()
        };
        let out = generate_signals(&bars, &cfg).unwrap();
        assert_eq!(out[1].signal.kind, SignalKind::LongEntry);
    }

    #[test]
    fn macd_confirmation_required_when_enabled() {
        let mut bars = bars_with_rsi(&[Some(20.0), Some(35.0)]);
        bars[1].indicators.macd = Some(0.1);
        bars[1].indicators.macd_signal = Some(0.2);
        bars[1].indicators.macd_hist = Some(0.1);
        bars[0].indicators.macd_hist = Some(0.3);
        let out = generate_signals(&bars, &SignalConfig::default()).unwrap();
        assert_eq!(out[1].signal.kind, SignalKind::None);

        let cfg = SignalConfig {
            macd_confirm: false,
            ..SignalConfig::default()
        };
        let out = generate_signals(&bars, &cfg).unwrap();
        assert_eq!(out[1].signal.kind, SignalKind::LongEntry);
    }

    #[test]
    fn rising_histogram_confirms() {
        let mut bars = bars_with_rsi(&[Some(20.0), Some(35.0)]);
        bars[0].indicators.macd_hist = Some(-0.4);
        bars[1].indicators.macd = Some(-0.3);
        bars[1].indicators.macd_signal = Some(-0.1);
        bars[1].indicators.macd_hist = Some(-0.2);
        let out = generate_signals(&bars, &SignalConfig::default()).unwrap();
        assert_eq!(out[1].signal.kind, SignalKind::LongEntry);
    }

    #[test]
    fn trend_invalidation_exits_open_cursor() {
        let mut bars = bars_with_rsi(&[Some(20.0), Some(35.0), Some(45.0), Some(50.0)]);
        bars[3].indicators.ema_fast = Some(98.0);
        let out = generate_signals(&bars, &SignalConfig::default()).unwrap();
        assert_eq!(
            kinds(&out),
            vec![
                SignalKind::None,
                SignalKind::LongEntry,
                SignalKind::Hold,
                SignalKind::LongExit,
            ]
        );
    }

    #[test]
    fn broken_trend_while_flat_is_none() {
        let mut bars = bars_with_rsi(&[Some(40.0), Some(45.0)]);
        bars[1].indicators.ema_fast = Some(98.0);
        let out = generate_signals(&bars, &SignalConfig::default()).unwrap();
        assert_eq!(out[1].signal.kind, SignalKind::None);
    }

    #[test]
    fn overbought_cross_while_flat_is_advisory_exit() {
        let bars = bars_with_rsi(&[Some(80.0), Some(65.0)]);
        let out = generate_signals(&bars, &SignalConfig::default()).unwrap();
        assert_eq!(out[1].signal.kind, SignalKind::LongExit);
    }

    #[test]
    fn second_entry_while_cursor_open_is_hold() {
        let bars = bars_with_rsi(&[Some(20.0), Some(35.0), Some(25.0), Some(35.0)]);
        let out = generate_signals(&bars, &SignalConfig::default()).unwrap();
        assert_eq!(out[3].signal.kind, SignalKind::Hold);
    }

    #[test]
    fn output_preserves_rows() {
        let bars = bars_with_rsi(&[None, Some(20.0), Some(35.0), Some(50.0), Some(75.0)]);
        let out = generate_signals(&bars, &SignalConfig::default()).unwrap();
        assert_eq!(out.len(), bars.len());
        for (o, b) in out.iter().zip(&bars) {
            assert_eq!(o.bar, *b);
        }
    }

    #[test]
    fn empty_input_is_empty_output() {
        let out = generate_signals(&[], &SignalConfig::default()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn rejects_non_monotonic_timestamps() {
        let mut bars = bars_with_rsi(&[Some(20.0), Some(35.0), Some(40.0)]);
        bars[2].ohlcv.timestamp = bars[1].ohlcv.timestamp;
        let err = generate_signals(&bars, &SignalConfig::default()).unwrap_err();
        assert!(matches!(err, SignalbotError::NonMonotonicTimestamp { row: 2, .. }));
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let bars = bars_with_rsi(&[Some(20.0)]);
        let err = generate_signals(&bars, &config(70.0, 30.0)).unwrap_err();
        assert!(matches!(err, SignalbotError::ConfigInvalid { key, .. } if key == "oversold"));
    }

    #[test]
    fn bullish_divergence_on_second_low() {
        let closes = [100.0, 95.0, 98.0, 99.0, 93.0];
        let rsi = [50.0, 25.0, 40.0, 45.0, 32.0];
        let mut bars = bars_with_rsi(&rsi.map(Some));
        for (bar, close) in bars.iter_mut().zip(closes) {
            bar.ohlcv.close = close;
            bar.ohlcv.low = close - 1.0;
        }
        assert_eq!(detect_divergence(&bars, 4, 5), Divergence::Bullish);
        assert_eq!(detect_divergence(&bars, 1, 5), Divergence::None);
    }

    #[test]
    fn bearish_divergence_on_second_high() {
        let closes = [100.0, 110.0, 104.0, 106.0, 112.0];
        let rsi = [50.0, 75.0, 60.0, 62.0, 68.0];
        let mut bars = bars_with_rsi(&rsi.map(Some));
        for (bar, close) in bars.iter_mut().zip(closes) {
            bar.ohlcv.close = close;
            bar.ohlcv.high = close + 1.0;
        }
        assert_eq!(detect_divergence(&bars, 4, 4), Divergence::Bearish);
    }

    #[test]
    fn divergence_respects_lookback() {
        let closes = [100.0, 95.0, 98.0, 99.0, 93.0];
        let rsi = [50.0, 25.0, 40.0, 45.0, 32.0];
        let mut bars = bars_with_rsi(&rsi.map(Some));
        for (bar, close) in bars.iter_mut().zip(closes) {
            bar.ohlcv.close = close;
        }
        // window [2, 3] lows at 98 with rsi 40: new low but weaker rsi
        assert_eq!(detect_divergence(&bars, 4, 2), Divergence::None);
    }

    #[test]
    fn strength_is_bounded_and_signed() {
        let bars = bars_with_rsi(&[Some(10.0), Some(90.0)]);
        let cfg = SignalConfig::default();
        let bullish = signal_strength(&bars[0], Trend::Bullish, &cfg);
        let bearish = signal_strength(&bars[1], Trend::Broken, &cfg);
        assert!(bullish > 0.0 && bullish <= 1.0);
        assert!(bearish < 0.0 && bearish >= -1.0);
    }

    #[test]
    fn strength_neutral_at_midline() {
        let mut bars = bars_with_rsi(&[Some(50.0)]);
        bars[0].indicators.macd_hist = Some(0.0);
        let s = signal_strength(&bars[0], Trend::Flat, &SignalConfig::default());
        approx::assert_abs_diff_eq!(s, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn signal_kind_round_trips_labels() {
        for kind in [
            SignalKind::LongEntry,
            SignalKind::LongExit,
            SignalKind::Hold,
            SignalKind::None,
        ] {
            assert_eq!(kind.as_str().parse::<SignalKind>().unwrap(), kind);
        }
        assert!("BUY".parse::<SignalKind>().is_err());
    }

    #[test]
    fn trend_filter_parses() {
        assert_eq!("close".parse::<TrendFilter>().unwrap(), TrendFilter::Close);
        assert_eq!(
            "Crossover".parse::<TrendFilter>().unwrap(),
            TrendFilter::Crossover
        );
        assert!("sma".parse::<TrendFilter>().is_err());
    }
}
