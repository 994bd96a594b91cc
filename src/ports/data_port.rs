//! Market data access port trait.

use crate::domain::error::SignalbotError;
use crate::domain::indicator::EnrichedBar;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDateTime;

pub trait DataPort {
    /// Raw bars for `symbol`, ascending, bounded inclusively by `start`/`end`.
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<OhlcvBar>, SignalbotError>;

    /// Bars carrying precomputed indicator columns.
    fn fetch_enriched(
        &self,
        symbol: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<EnrichedBar>, SignalbotError>;

    fn list_symbols(&self) -> Result<Vec<String>, SignalbotError>;
}
