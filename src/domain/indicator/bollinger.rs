//! Bollinger Bands indicator.
//!
//! Bollinger Bands consist of:
//! - Middle: Simple Moving Average (SMA) over n periods
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//!
//! Where StdDev is population standard deviation (divides by N, not N-1).
//!
//! Default parameters: period=20, multiplier=2.0
//! Warmup: first (period-1) bars are undefined.

use crate::domain::indicator::Series;
use crate::domain::ohlcv::OhlcvBar;

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerSeries {
    pub upper: Series,
    pub middle: Series,
    pub lower: Series,
}

pub fn calculate_bollinger(bars: &[OhlcvBar], period: usize, mult: f64) -> BollingerSeries {
    let n = bars.len();
    let mut bands = BollingerSeries {
        upper: vec![None; n],
        middle: vec![None; n],
        lower: vec![None; n],
    };
    if period == 0 {
        return bands;
    }

    for i in (period - 1)..n {
        let window = &bars[i + 1 - period..=i];
        let mean = window.iter().map(|b| b.close).sum::<f64>() / period as f64;
        let variance = window
            .iter()
            .map(|b| {
                let diff = b.close - mean;
                diff * diff
            })
            .sum::<f64>()
            / period as f64;
        let stddev = variance.sqrt();

        bands.upper[i] = Some(mean + mult * stddev);
        bands.middle[i] = Some(mean);
        bands.lower[i] = Some(mean - mult * stddev);
    }

    bands
}
