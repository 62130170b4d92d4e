use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Exact format of filing timestamps on the source page and in the store
pub const FILING_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn parse_filing_timestamp(raw: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw.trim(), FILING_TIMESTAMP_FORMAT)
}

pub fn format_filing_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(FILING_TIMESTAMP_FORMAT).to_string()
}

/// Lenient timestamp parsing for stored rows written by older tooling
pub fn parse_stored_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    parse_filing_timestamp(raw)
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").ok())
        .or_else(|| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M").ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Parse "$1,234.50" / "+$600,000" style amounts. Blank input is `Ok(None)`.
pub fn parse_currency(raw: &str) -> Result<Option<Decimal>, rust_decimal::Error> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('+')
        .chars()
        .filter(|c| !matches!(c, '$' | ',') && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return Ok(None);
    }

    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map(Some)
}

/// Prices are stored with two decimals
pub fn round_price(price: Decimal) -> Decimal {
    price.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Collapse non-breaking spaces and runs of whitespace in scraped cell text
pub fn normalize_cell_text(raw: &str) -> String {
    raw.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
