//! Scrape runs from listing page to saved store

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use insider_buys::api::ApiRateLimiter;
use insider_buys::error::InsiderError;
use insider_buys::models::{Granularity, PriceBar};
use insider_buys::pipeline::ScrapePipeline;
use insider_buys::price_resolver::PriceResolver;
use insider_buys::store::FilingStore;

use crate::common::test_data::{filing_page, price, ts};
use crate::common::{logging, StaticFilingSource, StaticPriceProvider};

fn listing() -> String {
    filing_page(&[
        ("2024-05-01 16:30:12", "AAA", "Doe John", "$61.25", "+$612,500"),
        ("2024-05-01 15:00:00", "BBB", "Roe Jane", "$4.00", "+$400,000"),
        ("2024-05-09 09:30:00", "CCC", "Poe Ed", "$9.00", "+$900,000"),
    ])
}

fn pipeline(
    source: StaticFilingSource,
    provider: StaticPriceProvider,
    store: FilingStore,
) -> ScrapePipeline<StaticFilingSource, StaticPriceProvider> {
    ScrapePipeline::new(
        source,
        PriceResolver::new(provider, ApiRateLimiter::unlimited()),
        store,
        ApiRateLimiter::unlimited(),
    )
}

#[tokio::test]
async fn test_scrape_keeps_only_valid_rows_and_prices_them() {
    logging::init_test_logging();
    logging::log_test_step("Scraping A (valid), B (below threshold), C (future)");

    let dir = TempDir::new().unwrap();
    let store = FilingStore::new(dir.path().join("insider_buys.csv"));
    let provider = StaticPriceProvider::new().with_series(
        "AAA",
        Granularity::OneMinute,
        vec![
            PriceBar::new(ts("2024-05-01 16:29:00"), price(6100)),
            PriceBar::new(ts("2024-05-01 16:30:00"), price(6150)),
            PriceBar::new(ts("2024-05-01 16:31:00"), price(6200)),
        ],
    );

    let report = pipeline(StaticFilingSource::new(listing()), provider, store.clone())
        .run_once(ts("2024-05-02 08:00:00"))
        .await
        .unwrap();
    logging::log_test_data("Scrape report", &report);

    assert_eq!(report.extracted, 1);
    assert_eq!(report.enriched, 1);
    assert_eq!(report.new_records, 1);

    let records = store.load().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].ticker, "AAA");
    assert_eq!(records[0].value, 612_500);
    assert_eq!(records[0].transaction_price, Some(price(6125)));
    assert_eq!(records[0].price_bought, Some(price(6150)));
}

#[tokio::test]
async fn test_rescrape_does_not_duplicate_or_reprice() {
    logging::init_test_logging();

    let dir = TempDir::new().unwrap();
    let store = FilingStore::new(dir.path().join("insider_buys.csv"));
    let provider = StaticPriceProvider::new().with_series(
        "AAA",
        Granularity::Daily,
        vec![PriceBar::new(ts("2024-05-01 00:00:00"), price(6000))],
    );
    let now = ts("2024-05-02 08:00:00");

    pipeline(StaticFilingSource::new(listing()), provider.clone(), store.clone())
        .run_once(now)
        .await
        .unwrap();
    let calls_after_first = provider.call_count();
    assert_eq!(calls_after_first, 3);

    let report = pipeline(StaticFilingSource::new(listing()), provider.clone(), store.clone())
        .run_once(now)
        .await
        .unwrap();

    assert_eq!(report.new_records, 0);
    assert_eq!(report.total_records, 1);
    assert_eq!(provider.call_count(), calls_after_first);
    assert_eq!(store.load().unwrap()[0].price_bought, Some(price(6000)));
}

#[tokio::test]
async fn test_unpriced_filing_is_still_stored() {
    let dir = TempDir::new().unwrap();
    let store = FilingStore::new(dir.path().join("insider_buys.csv"));

    pipeline(StaticFilingSource::new(listing()), StaticPriceProvider::new(), store.clone())
        .run_once(ts("2024-05-02 08:00:00"))
        .await
        .unwrap();

    let records = store.load().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].price_bought, None);
}

#[tokio::test]
async fn test_layout_change_aborts_without_touching_store() {
    let dir = TempDir::new().unwrap();
    let store = FilingStore::new(dir.path().join("insider_buys.csv"));

    let err = pipeline(
        StaticFilingSource::new("<html><body>We moved!</body></html>"),
        StaticPriceProvider::new(),
        store.clone(),
    )
    .run_once(ts("2024-05-02 08:00:00"))
    .await
    .unwrap_err();

    assert_matches!(err.downcast_ref::<InsiderError>(), Some(InsiderError::TableNotFound(_)));
    assert!(!store.exists());
}
