#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use signalbot::domain::error::SignalbotError;
use signalbot::domain::indicator::{EnrichedBar, IndicatorParams, IndicatorRow, compute_indicators};
pub use signalbot::domain::ohlcv::OhlcvBar;
use signalbot::domain::signal::{Signal, SignalBar, SignalKind};
use signalbot::ports::data_port::DataPort;
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<OhlcvBar>, SignalbotError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(SignalbotError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(symbol)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|b| start.is_none_or(|s| b.timestamp >= s))
            .filter(|b| end.is_none_or(|e| b.timestamp <= e))
            .collect())
    }

    fn fetch_enriched(
        &self,
        symbol: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<EnrichedBar>, SignalbotError> {
        let bars = self.fetch_ohlcv(symbol, start, end)?;
        Ok(compute_indicators(&bars, &IndicatorParams::default()))
    }

    fn list_symbols(&self) -> Result<Vec<String>, SignalbotError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

pub fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Timestamp of the `i`-th four-hour bar.
pub fn ts(i: usize) -> NaiveDateTime {
    epoch() + Duration::hours(4 * i as i64)
}

/// A bar whose open is the previous close.
pub fn make_bar(i: usize, open: f64, close: f64) -> OhlcvBar {
    OhlcvBar {
        timestamp: ts(i),
        open,
        high: open.max(close) * 1.002,
        low: open.min(close) * 0.998,
        close,
        volume: 1_000.0,
    }
}

pub fn bars_from_closes(closes: &[f64]) -> Vec<OhlcvBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            make_bar(i, open, close)
        })
        .collect()
}

/// Slow uptrend with a strong oscillation, enough to produce RSI crosses.
pub fn wave_closes(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            100.0 + 0.08 * t + 9.0 * (t / 7.0).sin() + 2.5 * (t / 2.3).cos()
        })
        .collect()
}

pub fn enriched_wave(n: usize) -> Vec<EnrichedBar> {
    compute_indicators(&bars_from_closes(&wave_closes(n)), &IndicatorParams::default())
}

/// Hand-labeled bars for driving the simulator directly.
pub fn labeled(closes: &[f64], kinds: &[SignalKind]) -> Vec<SignalBar> {
    bars_from_closes(closes)
        .into_iter()
        .zip(kinds)
        .map(|(ohlcv, &kind)| SignalBar {
            bar: EnrichedBar {
                ohlcv,
                indicators: IndicatorRow {
                    rsi: Some(50.0),
                    ..IndicatorRow::default()
                },
            },
            signal: Signal {
                kind,
                ..Signal::none()
            },
        })
        .collect()
}

pub fn ohlcv_csv(bars: &[OhlcvBar]) -> String {
    let mut out = String::from("timestamp,open,high,low,close,volume\n");
    for b in bars {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            b.timestamp.format("%Y-%m-%d %H:%M:%S"),
            b.open,
            b.high,
            b.low,
            b.close,
            b.volume
        ));
    }
    out
}
