use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::api::{ApiRateLimiter, FilingSource, PriceProvider};
use crate::extractor::{extract_filings, parse_filing_table};
use crate::models::FilingKey;
use crate::price_resolver::PriceResolver;
use crate::reconciler::merge;
use crate::store::FilingStore;
use crate::utils::round_price;

/// Outcome of one scrape run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeReport {
    pub extracted: usize,
    pub enriched: usize,
    pub new_records: usize,
    pub total_records: usize,
}

/// One scrape run: fetch the listing, extract, price, merge, save
pub struct ScrapePipeline<S, P> {
    source: S,
    resolver: PriceResolver<P>,
    store: FilingStore,
    filing_limiter: ApiRateLimiter,
}

impl<S: FilingSource, P: PriceProvider> ScrapePipeline<S, P> {
    pub fn new(
        source: S,
        resolver: PriceResolver<P>,
        store: FilingStore,
        filing_limiter: ApiRateLimiter,
    ) -> Self {
        Self {
            source,
            resolver,
            store,
            filing_limiter,
        }
    }

    /// Run once against the listing as of `now`. Filings already priced in the
    /// store are not sent to the price provider again.
    pub async fn run_once(&self, now: NaiveDateTime) -> Result<ScrapeReport> {
        info!("🔍 Fetching insider purchases...");
        self.filing_limiter.wait().await;
        let html = self
            .source
            .fetch_filing_page()
            .await
            .context("Failed to fetch filing page")?;
        let table = parse_filing_table(&html)?;

        let existing = self.store.load()?;
        let known_prices: HashMap<FilingKey, Decimal> = existing
            .iter()
            .filter_map(|r| r.price_bought.map(|p| (r.key(), p)))
            .collect();
        let existing_count = existing.len();

        let mut report = ScrapeReport::default();
        let mut incoming = Vec::new();
        for mut record in extract_filings(table, now) {
            report.extracted += 1;

            if known_prices.contains_key(&record.key()) {
                debug!(
                    "{} @ {} already priced, skipping lookup",
                    record.ticker, record.filing_timestamp
                );
            } else {
                let quote = self
                    .resolver
                    .resolve_price(&record.ticker, record.filing_timestamp)
                    .await?;
                if let Some(quote) = quote {
                    record.price_bought = Some(round_price(quote.close_price));
                    report.enriched += 1;
                }
            }
            incoming.push(record);
        }
        info!("📊 Extracted {} filings, priced {}", report.extracted, report.enriched);

        let merged = merge(existing, incoming);
        self.store
            .save(&merged)
            .with_context(|| format!("Failed to save {}", self.store.path().display()))?;

        report.total_records = merged.len();
        report.new_records = merged.len().saturating_sub(existing_count);
        info!(
            "✅ Saved {} records to {} ({} new)",
            report.total_records,
            self.store.path().display(),
            report.new_records
        );
        Ok(report)
    }
}
