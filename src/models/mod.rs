use chrono::{Duration as ChronoDuration, NaiveDateTime};
use rust_decimal::Decimal;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::InsiderError;

/// Smallest transaction value kept in the dataset
pub const MIN_FILING_VALUE: i64 = 500_000;

/// Canonical insider purchase filing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingRecord {
    pub filing_timestamp: NaiveDateTime,
    pub ticker: String,
    pub company_name: String,
    pub insider_name: Option<String>,
    pub transaction_price: Option<Decimal>,
    pub price_bought: Option<Decimal>,
    pub value: i64,
}

impl FilingRecord {
    /// Canonical uniqueness key
    pub fn key(&self) -> FilingKey {
        FilingKey {
            filing_timestamp: self.filing_timestamp,
            ticker: self.ticker.clone(),
            insider_name: self.insider_name.clone(),
        }
    }

    /// Number of enrichment fields already filled (0..=2)
    pub fn enrichment_count(&self) -> usize {
        usize::from(self.transaction_price.is_some()) + usize::from(self.price_bought.is_some())
    }

    pub fn needs_backfill(&self) -> bool {
        self.enrichment_count() < 2
    }
}

/// (filing_timestamp, ticker, insider_name)
///
/// A missing insider name is a distinct key component, so rows written before
/// the insider column existed never absorb named rows for the same ticker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilingKey {
    pub filing_timestamp: NaiveDateTime,
    pub ticker: String,
    pub insider_name: Option<String>,
}

/// Price bar resolution, finest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Granularity {
    OneMinute,
    FiveMinute,
    Daily,
}

impl Granularity {
    /// Order in which the resolver falls back
    pub const FALLBACK_ORDER: [Granularity; 3] = [
        Granularity::OneMinute,
        Granularity::FiveMinute,
        Granularity::Daily,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Granularity::OneMinute => "1min",
            Granularity::FiveMinute => "5min",
            Granularity::Daily => "daily",
        }
    }

    pub fn is_intraday(&self) -> bool {
        !matches!(self, Granularity::Daily)
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One bar of a provider time series
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceBar {
    pub timestamp: NaiveDateTime,
    pub close: Decimal,
}

impl PriceBar {
    pub fn new(timestamp: NaiveDateTime, close: Decimal) -> Self {
        Self { timestamp, close }
    }
}

/// Price chosen for a filing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuote {
    pub timestamp: NaiveDateTime,
    pub close_price: Decimal,
    pub granularity: Granularity,
    /// target minus bar timestamp, never negative
    pub gap: ChronoDuration,
}

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub alpha_vantage_api_key: Option<String>,
    pub alpha_vantage_base_url: String,
    pub filing_source_url: String,
    pub csv_path: PathBuf,
    pub results_dir: PathBuf,
    pub log_path: PathBuf,
    pub log_max_lines: usize,
    pub price_request_delay: Duration,
    pub filing_request_delay: Duration,
    pub http_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup (environment, test maps)
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Config {
            alpha_vantage_api_key: lookup("ALPHA_VANTAGE_API_KEY")
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            alpha_vantage_base_url: text(
                "ALPHA_VANTAGE_BASE_URL",
                "https://www.alphavantage.co/query",
            ),
            filing_source_url: text(
                "FILING_SOURCE_URL",
                "http://openinsider.com/insider-purchases",
            ),
            csv_path: PathBuf::from(text("INSIDER_CSV_PATH", "insider_buys.csv")),
            results_dir: PathBuf::from(text("RESULTS_DIR", "results")),
            log_path: PathBuf::from(text("LOG_PATH", "insider_buys.log")),
            log_max_lines: parse_setting(&lookup, "LOG_MAX_LINES", 50)?,
            price_request_delay: Duration::from_secs(parse_setting(
                &lookup,
                "PRICE_REQUEST_DELAY_SECS",
                12,
            )?),
            filing_request_delay: Duration::from_secs(parse_setting(
                &lookup,
                "FILING_REQUEST_DELAY_SECS",
                2,
            )?),
            http_timeout: Duration::from_secs(parse_setting(&lookup, "HTTP_TIMEOUT_SECS", 30)?),
        })
    }

    /// API key for the price provider; commands that call it fail fast here
    pub fn require_api_key(&self) -> Result<&str, InsiderError> {
        self.alpha_vantage_api_key
            .as_deref()
            .ok_or(InsiderError::MissingApiKey)
    }
}

fn parse_setting<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, InsiderError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| InsiderError::InvalidConfig { key, value: raw }),
        None => Ok(default),
    }
}
