use chrono::NaiveDateTime;
use thiserror::Error;

use crate::models::Granularity;

/// Failures callers need to tell apart (fatal vs. logged-and-skipped)
#[derive(Debug, Error)]
pub enum InsiderError {
    #[error("ALPHA_VANTAGE_API_KEY environment variable required")]
    MissingApiKey,

    #[error("price provider rejected the API key: {0}")]
    InvalidApiKey(String),

    #[error("invalid value for {key}: {value:?}")]
    InvalidConfig { key: &'static str, value: String },

    #[error("invalid CSS selector {0}")]
    Selector(String),

    #[error("filing table `{0}` not found in page")]
    TableNotFound(&'static str),

    #[error("filing table has no header row")]
    MissingHeader,

    #[error("unexpected filing table layout: column {index} is {found:?}, expected {expected:?}")]
    UnexpectedLayout {
        index: usize,
        expected: &'static str,
        found: String,
    },

    #[error("malformed store {path}: row {row}: {reason}")]
    MalformedStore {
        path: String,
        row: usize,
        reason: String,
    },

    #[error("price provider error for {symbol} ({granularity}): {message}")]
    Provider {
        symbol: String,
        granularity: Granularity,
        message: String,
    },

    #[error("price provider throttled request for {symbol}: {message}")]
    Throttled { symbol: String, message: String },

    #[error("unexpected response status {status} from {url}")]
    Status { status: u16, url: String },
}

impl InsiderError {
    /// Structural errors abort the whole run instead of skipping a row
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            InsiderError::TableNotFound(_)
                | InsiderError::MissingHeader
                | InsiderError::UnexpectedLayout { .. }
                | InsiderError::Selector(_)
        )
    }

    /// Errors no later request can recover from; a run stops on these
    /// instead of recording an empty price
    pub fn is_fatal(&self) -> bool {
        self.is_structural()
            || matches!(
                self,
                InsiderError::MissingApiKey | InsiderError::InvalidApiKey(_)
            )
    }
}

/// Why a single filing row was dropped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("row has {found} cells, expected at least {expected}")]
    TooFewCells { found: usize, expected: usize },

    #[error("unparseable filing date {0:?}")]
    BadTimestamp(String),

    #[error("filing date {0} is in the future")]
    FutureTimestamp(NaiveDateTime),

    #[error("empty {0}")]
    MissingField(&'static str),

    #[error("unparseable {field} {raw:?}")]
    BadNumber { field: &'static str, raw: String },

    #[error("value {0} below inclusion threshold")]
    BelowThreshold(i64),
}
