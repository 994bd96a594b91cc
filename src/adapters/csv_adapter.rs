//! CSV file data adapter.
//!
//! Reads `<base>/<symbol>.csv`. Columns are located by header name, so extra
//! columns and any column order are accepted. Rows are returned in file
//! order; ordering is checked by the domain, not fixed up here.

use crate::domain::error::SignalbotError;
use crate::domain::indicator::{CandlePatterns, EnrichedBar, IndicatorRow, detect_patterns};
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use std::fs;
use std::path::PathBuf;

const OHLCV_COLUMNS: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];
const INDICATOR_COLUMNS: [&str; 9] = [
    "rsi",
    "ema_fast",
    "ema_slow",
    "macd",
    "macd_signal",
    "macd_hist",
    "bb_upper",
    "bb_mid",
    "bb_lower",
];

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{symbol}.csv"))
    }

    fn read_rows(
        &self,
        symbol: &str,
        columns: &[&str],
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<(Vec<(OhlcvBar, StringRecord)>, Vec<usize>), SignalbotError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path)?;
        let source_name = path.display().to_string();

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let headers = rdr.headers()?.clone();

        let ohlcv_idx = locate(&headers, &OHLCV_COLUMNS, &source_name)?;
        let extra_idx = locate(&headers, columns, &source_name)?;

        let mut rows = Vec::new();
        for (row, result) in rdr.records().enumerate() {
            let record = result?;
            let bar = parse_bar(&record, &ohlcv_idx, row)?;

            if start.is_some_and(|s| bar.timestamp < s) || end.is_some_and(|e| bar.timestamp > e) {
                continue;
            }
            rows.push((bar, record));
        }

        tracing::debug!(symbol, rows = rows.len(), path = %source_name, "loaded csv");
        Ok((rows, extra_idx))
    }
}

impl DataPort for CsvAdapter {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<OhlcvBar>, SignalbotError> {
        let (rows, _) = self.read_rows(symbol, &[], start, end)?;
        Ok(rows.into_iter().map(|(bar, _)| bar).collect())
    }

    fn fetch_enriched(
        &self,
        symbol: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<EnrichedBar>, SignalbotError> {
        let (rows, idx) = self.read_rows(symbol, &INDICATOR_COLUMNS, start, end)?;

        let bars: Vec<OhlcvBar> = rows.iter().map(|(bar, _)| bar.clone()).collect();
        let patterns = detect_patterns(&bars);

        rows.into_iter()
            .zip(patterns)
            .enumerate()
            .map(|(row, ((ohlcv, record), patterns))| -> Result<EnrichedBar, SignalbotError> {
                let indicators = parse_indicators(&record, &idx, row, patterns)?;
                Ok(EnrichedBar { ohlcv, indicators })
            })
            .collect()
    }

    fn list_symbols(&self) -> Result<Vec<String>, SignalbotError> {
        let entries = fs::read_dir(&self.base_path)?;

        let mut symbols = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                if let Some(stem) = path.file_stem() {
                    symbols.push(stem.to_string_lossy().into_owned());
                }
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}

fn locate(
    headers: &StringRecord,
    columns: &[&str],
    source_name: &str,
) -> Result<Vec<usize>, SignalbotError> {
    columns
        .iter()
        .map(|&column| {
            headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(column))
                .ok_or_else(|| SignalbotError::MissingColumn {
                    column: column.to_string(),
                    source_name: source_name.to_string(),
                })
        })
        .collect()
}

fn parse_bar(record: &StringRecord, idx: &[usize], row: usize) -> Result<OhlcvBar, SignalbotError> {
    let field = |i: usize| record.get(idx[i]).unwrap_or("");
    Ok(OhlcvBar {
        timestamp: parse_timestamp(field(0)).ok_or_else(|| SignalbotError::Data {
            reason: format!("row {row}: invalid timestamp '{}'", field(0)),
        })?,
        open: parse_price(field(1), "open", row)?,
        high: parse_price(field(2), "high", row)?,
        low: parse_price(field(3), "low", row)?,
        close: parse_price(field(4), "close", row)?,
        volume: parse_price(field(5), "volume", row)?,
    })
}

fn parse_indicators(
    record: &StringRecord,
    idx: &[usize],
    row: usize,
    patterns: CandlePatterns,
) -> Result<IndicatorRow, SignalbotError> {
    let value = |i: usize| parse_optional(record.get(idx[i]).unwrap_or(""), INDICATOR_COLUMNS[i], row);
    Ok(IndicatorRow {
        rsi: value(0)?,
        ema_fast: value(1)?,
        ema_slow: value(2)?,
        macd: value(3)?,
        macd_signal: value(4)?,
        macd_hist: value(5)?,
        bb_upper: value(6)?,
        bb_mid: value(7)?,
        bb_lower: value(8)?,
        patterns,
    })
}

pub(crate) fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn parse_price(value: &str, column: &str, row: usize) -> Result<f64, SignalbotError> {
    value.parse::<f64>().map_err(|e| SignalbotError::Data {
        reason: format!("row {row}: invalid {column} value '{value}': {e}"),
    })
}

/// Empty cells and NaN mean "not yet defined".
fn parse_optional(value: &str, column: &str, row: usize) -> Result<Option<f64>, SignalbotError> {
    if value.is_empty() {
        return Ok(None);
    }
    let parsed = parse_price(value, column, row)?;
    Ok(if parsed.is_nan() { None } else { Some(parsed) })
}
