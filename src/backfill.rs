//! Fill enrichment gaps in the stored table
//!
//! The sweep walks the store in order and persists after every record it
//! changes, so an interrupted sweep keeps the work already done. Anything
//! that aborts the sweep puts the pre-sweep backup back in place.

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::api::{ApiRateLimiter, FilingSource, PriceProvider};
use crate::extractor::{lookup_transaction_price, parse_filing_table, RawTable};
use crate::price_resolver::PriceResolver;
use crate::store::FilingStore;
use crate::utils::round_price;

/// Counters for one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub candidates: usize,
    pub updated: usize,
    pub transaction_prices_filled: usize,
    pub prices_bought_filled: usize,
    pub still_missing: usize,
}

/// Live listing state within one sweep; fetched at most once
enum LivePage {
    NotFetched,
    Loaded(RawTable),
    Unavailable,
}

pub struct BackfillSweep<S, P> {
    source: S,
    resolver: PriceResolver<P>,
    store: FilingStore,
    filing_limiter: ApiRateLimiter,
}

impl<S: FilingSource, P: PriceProvider> BackfillSweep<S, P> {
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

    /// Number of records updated
    pub async fn sweep(&self) -> Result<usize> {
        Ok(self.sweep_with_report().await?.updated)
    }

    pub async fn sweep_with_report(&self) -> Result<SweepReport> {
        if !self.store.exists() {
            info!("📭 No store at {}, nothing to backfill", self.store.path().display());
            return Ok(SweepReport::default());
        }

        self.store.backup()?;

        match self.fill_missing().await {
            Ok(report) => {
                info!(
                    "✅ Backfill complete: {} of {} records updated ({} transaction prices, {} prices bought, {} still missing)",
                    report.updated,
                    report.candidates,
                    report.transaction_prices_filled,
                    report.prices_bought_filled,
                    report.still_missing
                );
                Ok(report)
            }
            Err(e) => {
                error!("❌ Backfill failed, restoring backup: {:#}", e);
                if let Err(restore_err) = self.store.restore() {
                    error!("❌ Restore failed: {:#}", restore_err);
                    return Err(e.context(format!("restore also failed: {restore_err:#}")));
                }
                Err(e)
            }
        }
    }

    async fn fill_missing(&self) -> Result<SweepReport> {
        let mut records = self.store.load()?;
        let mut live_page = LivePage::NotFetched;
        let mut report = SweepReport::default();

        for index in 0..records.len() {
            if !records[index].needs_backfill() {
                continue;
            }
            report.candidates += 1;
            let mut changed = false;

            if records[index].transaction_price.is_none() {
                if let Some(table) = self.live_table(&mut live_page).await? {
                    if let Some(price) = lookup_transaction_price(table, &records[index]) {
                        info!(
                            "🧾 {} @ {}: transaction price ${}",
                            records[index].ticker, records[index].filing_timestamp, price
                        );
                        records[index].transaction_price = Some(price);
                        report.transaction_prices_filled += 1;
                        changed = true;
                    }
                }
            }

            if records[index].price_bought.is_none() {
                let ticker = records[index].ticker.clone();
                let quote = self
                    .resolver
                    .resolve_price(&ticker, records[index].filing_timestamp)
                    .await?;
                if let Some(quote) = quote {
                    records[index].price_bought = Some(round_price(quote.close_price));
                    report.prices_bought_filled += 1;
                    changed = true;
                }
            }

            if changed {
                self.store.save(&records).with_context(|| {
                    format!(
                        "Failed to save after updating {} @ {}",
                        records[index].ticker, records[index].filing_timestamp
                    )
                })?;
                report.updated += 1;
            }
            if records[index].needs_backfill() {
                report.still_missing += 1;
            }
        }

        Ok(report)
    }

    /// Fetch errors leave the page unavailable for the rest of the sweep; a
    /// page that no longer has the expected table aborts it.
    async fn live_table<'a>(&self, page: &'a mut LivePage) -> Result<Option<&'a RawTable>> {
        if let LivePage::NotFetched = page {
            self.filing_limiter.wait().await;
            *page = match self.source.fetch_filing_page().await {
                Ok(html) => LivePage::Loaded(parse_filing_table(&html)?),
                Err(e) => {
                    warn!("⚠️ Filing page unavailable, transaction prices stay empty: {:#}", e);
                    LivePage::Unavailable
                }
            };
        }

        Ok(match page {
            LivePage::Loaded(table) => Some(table),
            _ => None,
        })
    }
}
