//! Domain error types.

use chrono::NaiveDateTime;

/// Top-level error type for signalbot.
#[derive(Debug, thiserror::Error)]
pub enum SignalbotError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("timestamps must be strictly increasing: row {row} ({current}) does not follow {previous}")]
    NonMonotonicTimestamp {
        row: usize,
        previous: NaiveDateTime,
        current: NaiveDateTime,
    },

    #[error("invalid {field} price at row {row} ({timestamp}): {value}")]
    InvalidPrice {
        row: usize,
        timestamp: NaiveDateTime,
        field: &'static str,
        value: f64,
    },

    #[error("missing required column '{column}' in {source_name}")]
    MissingColumn { column: String, source_name: String },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SignalbotError {
    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        SignalbotError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&SignalbotError> for std::process::ExitCode {
    fn from(err: &SignalbotError) -> Self {
        let code: u8 = match err {
            SignalbotError::Io(_) => 1,
            SignalbotError::ConfigParse { .. }
            | SignalbotError::ConfigMissing { .. }
            | SignalbotError::ConfigInvalid { .. } => 2,
            SignalbotError::NonMonotonicTimestamp { .. }
            | SignalbotError::InvalidPrice { .. }
            | SignalbotError::MissingColumn { .. }
            | SignalbotError::Data { .. } => 3,
            SignalbotError::Csv(_) => 4,
        };
        std::process::ExitCode::from(code)
    }
}
