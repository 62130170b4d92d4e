//! Filing page parsing and row normalization
//!
//! The source table is positional: each field lives at a fixed column index.
//! The header row is checked against that layout before any data row is read,
//! so a redesign of the page stops the run instead of shifting fields.

use chrono::NaiveDateTime;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::error::{InsiderError, RowError};
use crate::models::{FilingRecord, MIN_FILING_VALUE};
use crate::utils::{
    format_filing_timestamp, normalize_cell_text, parse_currency, parse_filing_timestamp,
};

pub const FILING_TABLE_SELECTOR: &str = "table.tinytable";

const COL_FILING_DATE: usize = 1;
const COL_TICKER: usize = 3;
const COL_COMPANY_NAME: usize = 4;
const COL_INSIDER_NAME: usize = 5;
const COL_PRICE: usize = 8;
const COL_VALUE: usize = 12;
const MIN_CELLS: usize = COL_VALUE + 1;

const EXPECTED_HEADERS: [(usize, &str); 6] = [
    (COL_FILING_DATE, "Filing Date"),
    (COL_TICKER, "Ticker"),
    (COL_COMPANY_NAME, "Company Name"),
    (COL_INSIDER_NAME, "Insider Name"),
    (COL_PRICE, "Price"),
    (COL_VALUE, "Value"),
];

/// Text of one data row, cell by cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub cells: Vec<String>,
}

impl RawRow {
    pub fn new<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cells: cells.into_iter().map(Into::into).collect(),
        }
    }

    fn cell(&self, index: usize) -> &str {
        self.cells.get(index).map(String::as_str).unwrap_or("")
    }
}

/// Data rows of the filing table in page order (most recent first on the site)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub rows: Vec<RawRow>,
}

fn selector(css: &'static str) -> Result<Selector, InsiderError> {
    Selector::parse(css).map_err(|e| InsiderError::Selector(format!("{css}: {e:?}")))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    normalize_cell_text(&cell.text().collect::<String>())
}

/// Locate the filing table and read its rows.
///
/// A missing table or a header that does not match the positional layout is
/// a structural error; the caller must abort the run.
pub fn parse_filing_table(html: &str) -> Result<RawTable, InsiderError> {
    let document = Html::parse_document(html);
    let table_selector = selector(FILING_TABLE_SELECTOR)?;
    let row_selector = selector("tr")?;
    let header_selector = selector("th")?;
    let cell_selector = selector("td")?;

    let table = document
        .select(&table_selector)
        .next()
        .ok_or(InsiderError::TableNotFound(FILING_TABLE_SELECTOR))?;

    let header: Vec<String> = table
        .select(&row_selector)
        .map(|tr| tr.select(&header_selector).map(cell_text).collect::<Vec<_>>())
        .find(|cells| !cells.is_empty())
        .ok_or(InsiderError::MissingHeader)?;
    check_layout(&header)?;

    let rows: Vec<RawRow> = table
        .select(&row_selector)
        .map(|tr| tr.select(&cell_selector).map(cell_text).collect::<Vec<_>>())
        .filter(|cells| !cells.is_empty())
        .map(|cells| RawRow { cells })
        .collect();

    debug!("Filing table has {} data rows", rows.len());
    Ok(RawTable { rows })
}

fn check_layout(header: &[String]) -> Result<(), InsiderError> {
    for (index, expected) in EXPECTED_HEADERS {
        let found = header.get(index).map(String::as_str).unwrap_or("");
        if !found.to_lowercase().contains(&expected.to_lowercase()) {
            return Err(InsiderError::UnexpectedLayout {
                index,
                expected,
                found: found.to_string(),
            });
        }
    }
    Ok(())
}

/// Lazily turn table rows into candidate filings (`price_bought` unset).
///
/// Rows are handled independently: a bad row is logged and dropped and the
/// rest of the table still flows through, in source order.
pub fn extract_filings(table: RawTable, now: NaiveDateTime) -> FilingExtractor {
    FilingExtractor {
        rows: table.rows.into_iter(),
        now,
        position: 0,
    }
}

/// Single-pass iterator returned by [`extract_filings`]
pub struct FilingExtractor {
    rows: std::vec::IntoIter<RawRow>,
    now: NaiveDateTime,
    position: usize,
}

impl Iterator for FilingExtractor {
    type Item = FilingRecord;

    fn next(&mut self) -> Option<FilingRecord> {
        for row in self.rows.by_ref() {
            self.position += 1;
            match parse_row(&row, self.now) {
                Ok(record) => return Some(record),
                Err(RowError::BelowThreshold(value)) => {
                    debug!("Row {}: value {} below threshold, skipped", self.position, value);
                }
                Err(err) => {
                    warn!(
                        "⚠️ Dropping filing row {} ({} {}): {}",
                        self.position,
                        row.cell(COL_TICKER),
                        row.cell(COL_FILING_DATE),
                        err
                    );
                }
            }
        }
        None
    }
}

impl std::iter::FusedIterator for FilingExtractor {}

/// Normalize one table row into a filing record
pub fn parse_row(row: &RawRow, now: NaiveDateTime) -> Result<FilingRecord, RowError> {
    if row.cells.len() < MIN_CELLS {
        return Err(RowError::TooFewCells {
            found: row.cells.len(),
            expected: MIN_CELLS,
        });
    }

    let raw_date = row.cell(COL_FILING_DATE);
    let filing_timestamp =
        parse_filing_timestamp(raw_date).map_err(|_| RowError::BadTimestamp(raw_date.to_string()))?;
    if filing_timestamp > now {
        return Err(RowError::FutureTimestamp(filing_timestamp));
    }

    let ticker = row.cell(COL_TICKER).trim().to_string();
    if ticker.is_empty() {
        return Err(RowError::MissingField("ticker"));
    }

    let raw_price = row.cell(COL_PRICE);
    let transaction_price = parse_currency(raw_price).map_err(|_| RowError::BadNumber {
        field: "price",
        raw: raw_price.to_string(),
    })?;

    let raw_value = row.cell(COL_VALUE);
    let value = parse_currency(raw_value)
        .ok()
        .flatten()
        .and_then(|v| v.round().to_i64())
        .ok_or_else(|| RowError::BadNumber {
            field: "value",
            raw: raw_value.to_string(),
        })?;
    if value < MIN_FILING_VALUE {
        return Err(RowError::BelowThreshold(value));
    }

    let insider_name =
        Some(row.cell(COL_INSIDER_NAME).trim().to_string()).filter(|n| !n.is_empty());

    Ok(FilingRecord {
        filing_timestamp,
        ticker,
        company_name: row.cell(COL_COMPANY_NAME).trim().to_string(),
        insider_name,
        transaction_price,
        price_bought: None,
        value,
    })
}

/// Disclosed price of `record` in a freshly fetched table, matched on ticker,
/// filing timestamp prefix and, when both sides have one, insider name.
pub fn lookup_transaction_price(table: &RawTable, record: &FilingRecord) -> Option<Decimal> {
    let stamp = format_filing_timestamp(&record.filing_timestamp);

    table
        .rows
        .iter()
        .filter(|row| row.cells.len() >= MIN_CELLS)
        .filter(|row| row.cell(COL_TICKER).trim() == record.ticker)
        .filter(|row| row.cell(COL_FILING_DATE).trim().starts_with(&stamp))
        .filter(|row| {
            let insider = row.cell(COL_INSIDER_NAME).trim();
            match record.insider_name.as_deref() {
                Some(name) if !insider.is_empty() => insider == name,
                _ => true,
            }
        })
        .find_map(|row| parse_currency(row.cell(COL_PRICE)).ok().flatten())
}
