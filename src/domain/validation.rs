//! Input validation and data-quality inspection.
//!
//! Validation failures are fatal and reported before any walk begins.
//! Data-quality findings are advisory: the pipeline keeps going and the
//! affected bars simply classify as `NONE`.

use chrono::{Duration, NaiveDateTime};
use std::borrow::Borrow;
use std::fmt;

use crate::domain::error::SignalbotError;
use crate::domain::indicator::EnrichedBar;
use crate::domain::ohlcv::OhlcvBar;

/// Share of bars without RSI above which the warm-up is flagged.
const MAX_WARMUP_SHARE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub enum DataWarning {
    Gap {
        after: NaiveDateTime,
        before: NaiveDateTime,
        missing_bars: i64,
    },
    ExcessiveWarmup {
        undefined: usize,
        total: usize,
    },
    IndicatorHole {
        row: usize,
        timestamp: NaiveDateTime,
    },
    InconsistentBar {
        row: usize,
        timestamp: NaiveDateTime,
    },
}

impl fmt::Display for DataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataWarning::Gap {
                after,
                before,
                missing_bars,
            } => write!(f, "gap of {missing_bars} bar(s) between {after} and {before}"),
            DataWarning::ExcessiveWarmup { undefined, total } => {
                write!(f, "{undefined} of {total} bars have no RSI value")
            }
            DataWarning::IndicatorHole { row, timestamp } => {
                write!(f, "undefined indicator after warm-up at row {row} ({timestamp})")
            }
            DataWarning::InconsistentBar { row, timestamp } => {
                write!(f, "inconsistent OHLC values at row {row} ({timestamp})")
            }
        }
    }
}

/// Timestamps must be unique and strictly increasing.
pub fn validate_timeline<'a, I>(bars: I) -> Result<(), SignalbotError>
where
    I: IntoIterator<Item = &'a OhlcvBar>,
{
    let mut previous: Option<NaiveDateTime> = None;
    for (row, bar) in bars.into_iter().enumerate() {
        if let Some(prev) = previous {
            if bar.timestamp <= prev {
                return Err(SignalbotError::NonMonotonicTimestamp {
                    row,
                    previous: prev,
                    current: bar.timestamp,
                });
            }
        }
        previous = Some(bar.timestamp);
    }
    Ok(())
}

/// Closes (and opens, when fills use them) must be finite and positive.
pub fn validate_prices<'a, I>(bars: I, check_open: bool) -> Result<(), SignalbotError>
where
    I: IntoIterator<Item = &'a OhlcvBar>,
{
    for (row, bar) in bars.into_iter().enumerate() {
        let mut fields = vec![("close", bar.close)];
        if check_open {
            fields.push(("open", bar.open));
        }
        for (field, value) in fields {
            if !value.is_finite() || value <= 0.0 {
                return Err(SignalbotError::InvalidPrice {
                    row,
                    timestamp: bar.timestamp,
                    field,
                    value,
                });
            }
        }
    }
    Ok(())
}

/// Collect advisory findings about an indicator-annotated table.
pub fn inspect<B: Borrow<EnrichedBar>>(bars: &[B]) -> Vec<DataWarning> {
    let bars: Vec<&EnrichedBar> = bars.iter().map(Borrow::borrow).collect();
    let mut warnings = Vec::new();

    if let Some(step) = nominal_step(&bars) {
        for pair in bars.windows(2) {
            let (a, b) = (pair[0].ohlcv.timestamp, pair[1].ohlcv.timestamp);
            let delta = b - a;
            if delta >= step * 2 {
                warnings.push(DataWarning::Gap {
                    after: a,
                    before: b,
                    missing_bars: delta.num_seconds() / step.num_seconds() - 1,
                });
            }
        }
    }

    let undefined = bars.iter().filter(|b| b.indicators.rsi.is_none()).count();
    if !bars.is_empty() && undefined as f64 / bars.len() as f64 > MAX_WARMUP_SHARE {
        warnings.push(DataWarning::ExcessiveWarmup {
            undefined,
            total: bars.len(),
        });
    }

    if let Some(first) = bars.iter().position(|b| b.indicators.rsi.is_some()) {
        for (offset, bar) in bars[first..].iter().enumerate() {
            if bar.indicators.rsi.is_none() {
                warnings.push(DataWarning::IndicatorHole {
                    row: first + offset,
                    timestamp: bar.ohlcv.timestamp,
                });
            }
        }
    }

    for (row, bar) in bars.iter().enumerate() {
        if !bar.ohlcv.is_consistent() {
            warnings.push(DataWarning::InconsistentBar {
                row,
                timestamp: bar.ohlcv.timestamp,
            });
        }
    }

    for warning in &warnings {
        tracing::warn!(%warning, "data quality");
    }

    warnings
}

/// Smallest positive spacing between consecutive bars.
fn nominal_step(bars: &[&EnrichedBar]) -> Option<Duration> {
    bars.windows(2)
        .map(|w| w[1].ohlcv.timestamp - w[0].ohlcv.timestamp)
        .filter(|d| d.num_seconds() > 0)
        .min()
}
