use anyhow::{Context, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::InsiderError;
use crate::models::FilingRecord;
use crate::utils::{format_filing_timestamp, parse_currency, parse_stored_timestamp};

/// Column order of the persisted table
pub const STORE_HEADER: [&str; 7] = [
    "Filing Date",
    "Ticker",
    "Company Name",
    "Insider Name",
    "Transaction Price",
    "Price Bought",
    "Value",
];

/// One row as read from disk. Every column is optional so older files with
/// fewer columns (no insider name) or a different column order still load.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StoredRow {
    #[serde(rename = "Filing Date")]
    filing_date: Option<String>,
    #[serde(rename = "Ticker")]
    ticker: Option<String>,
    #[serde(rename = "Company Name")]
    company_name: Option<String>,
    #[serde(rename = "Insider Name")]
    insider_name: Option<String>,
    #[serde(rename = "Transaction Price")]
    transaction_price: Option<String>,
    #[serde(rename = "Price Bought")]
    price_bought: Option<String>,
    #[serde(rename = "Value")]
    value: Option<String>,
}

fn non_empty(cell: Option<String>) -> Option<String> {
    cell.map(|c| c.trim().to_string()).filter(|c| !c.is_empty())
}

/// CSV file holding every filing collected so far
#[derive(Debug, Clone)]
pub struct FilingStore {
    path: PathBuf,
}

impl FilingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read all records in file order; a missing file is an empty store
    pub fn load(&self) -> Result<Vec<FilingRecord>> {
        if !self.exists() {
            debug!("Store {} does not exist yet", self.path.display());
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("Failed to open store {}", self.path.display()))?;

        let mut records = Vec::new();
        for (index, row) in reader.deserialize::<StoredRow>().enumerate() {
            // Header is line 1
            let line = index + 2;
            let row = row.map_err(|e| self.malformed(line, e.to_string()))?;
            records.push(self.parse_stored_row(row, line)?);
        }

        debug!("Loaded {} records from {}", records.len(), self.path.display());
        Ok(records)
    }

    fn parse_stored_row(&self, row: StoredRow, line: usize) -> Result<FilingRecord, InsiderError> {
        let raw_date = non_empty(row.filing_date)
            .ok_or_else(|| self.malformed(line, "empty Filing Date"))?;
        let filing_timestamp = parse_stored_timestamp(&raw_date)
            .ok_or_else(|| self.malformed(line, format!("bad Filing Date {raw_date:?}")))?;
        let ticker = non_empty(row.ticker).ok_or_else(|| self.malformed(line, "empty Ticker"))?;

        let raw_value = non_empty(row.value).ok_or_else(|| self.malformed(line, "empty Value"))?;
        let value = parse_currency(&raw_value)
            .ok()
            .flatten()
            .and_then(|v| v.round().to_i64())
            .ok_or_else(|| self.malformed(line, format!("bad Value {raw_value:?}")))?;

        Ok(FilingRecord {
            filing_timestamp,
            ticker,
            company_name: non_empty(row.company_name).unwrap_or_default(),
            insider_name: non_empty(row.insider_name),
            transaction_price: self.stored_price(row.transaction_price, "Transaction Price", line)?,
            price_bought: self.stored_price(row.price_bought, "Price Bought", line)?,
            value,
        })
    }

    fn stored_price(
        &self,
        cell: Option<String>,
        column: &str,
        line: usize,
    ) -> Result<Option<Decimal>, InsiderError> {
        match non_empty(cell) {
            // pandas writes missing floats as "nan"
            Some(raw) if raw.eq_ignore_ascii_case("nan") => Ok(None),
            Some(raw) => parse_currency(&raw)
                .map_err(|_| self.malformed(line, format!("bad {column} {raw:?}"))),
            None => Ok(None),
        }
    }

    fn malformed(&self, row: usize, reason: impl Into<String>) -> InsiderError {
        InsiderError::MalformedStore {
            path: self.path.display().to_string(),
            row,
            reason: reason.into(),
        }
    }

    /// Replace the store atomically: write a sibling temp file, then rename
    /// it over the target so readers see the old or new table, never half.
    pub fn save(&self, records: &[FilingRecord]) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

        let mut temp = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(temp.as_file_mut());
            writer.write_record(STORE_HEADER)?;
            for record in records {
                writer.write_record(to_row(record))?;
            }
            writer.flush()?;
        }
        temp.as_file_mut().flush()?;
        temp.as_file().sync_all()?;

        temp.persist(&self.path)
            .with_context(|| format!("Failed to replace store {}", self.path.display()))?;

        debug!("Saved {} records to {}", records.len(), self.path.display());
        Ok(())
    }

    /// `<stem>_backup.<ext>` next to the store
    pub fn backup_path(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store".to_string());
        let name = match self.path.extension() {
            Some(ext) => format!("{}_backup.{}", stem, ext.to_string_lossy()),
            None => format!("{stem}_backup"),
        };
        self.path.with_file_name(name)
    }

    /// Byte-for-byte copy of the current store
    pub fn backup(&self) -> Result<PathBuf> {
        let backup = self.backup_path();
        fs::copy(&self.path, &backup).with_context(|| {
            format!("Failed to back up {} to {}", self.path.display(), backup.display())
        })?;
        info!("💾 Backed up store to {}", backup.display());
        Ok(backup)
    }

    /// Put the backup back over the live store
    pub fn restore(&self) -> Result<()> {
        let backup = self.backup_path();
        fs::copy(&backup, &self.path).with_context(|| {
            format!("Failed to restore {} from {}", self.path.display(), backup.display())
        })?;
        info!("♻️ Restored store from {}", backup.display());
        Ok(())
    }
}

fn to_row(record: &FilingRecord) -> [String; 7] {
    let price = |p: Option<Decimal>| p.map(|d| d.to_string()).unwrap_or_default();
    [
        format_filing_timestamp(&record.filing_timestamp),
        record.ticker.clone(),
        record.company_name.clone(),
        record.insider_name.clone().unwrap_or_default(),
        price(record.transaction_price),
        price(record.price_bought),
        record.value.to_string(),
    ]
}
