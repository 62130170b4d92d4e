//! Backfill sweeps over a store on disk

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use std::fs;
use tempfile::TempDir;

use insider_buys::api::ApiRateLimiter;
use insider_buys::backfill::BackfillSweep;
use insider_buys::error::InsiderError;
use insider_buys::models::{Granularity, PriceBar};
use insider_buys::price_resolver::PriceResolver;
use insider_buys::store::FilingStore;

use crate::common::test_data::{create_test_filing, filing_page, price, ts};
use crate::common::{logging, StaticFilingSource, StaticPriceProvider};

fn sweep(
    source: StaticFilingSource,
    provider: StaticPriceProvider,
    store: FilingStore,
) -> BackfillSweep<StaticFilingSource, StaticPriceProvider> {
    BackfillSweep::new(
        source,
        PriceResolver::new(provider, ApiRateLimiter::unlimited()),
        store,
        ApiRateLimiter::unlimited(),
    )
}

fn temp_store(dir: &TempDir) -> FilingStore {
    FilingStore::new(dir.path().join("insider_buys.csv"))
}

#[tokio::test]
async fn test_sweep_fills_price_bought() {
    logging::init_test_logging();
    logging::log_test_step("Backfilling a record without price bought");

    let dir = TempDir::new().unwrap();
    let store = temp_store(&dir);
    let mut record = create_test_filing("2024-05-01 16:30:12", "AAA", "Doe John", 600_000);
    record.transaction_price = Some(price(12000));
    let complete = {
        let mut r = create_test_filing("2024-04-30 10:00:00", "ZZZ", "Roe Jane", 900_000);
        r.transaction_price = Some(price(100));
        r.price_bought = Some(price(101));
        r
    };
    store.save(&[record, complete.clone()]).unwrap();

    let provider = StaticPriceProvider::new().with_series(
        "AAA",
        Granularity::OneMinute,
        vec![PriceBar::new(ts("2024-05-01 16:30:00"), price(12345))],
    );
    let source = StaticFilingSource::new(filing_page(&[]));

    let updated = sweep(source.clone(), provider, store.clone()).sweep().await.unwrap();

    assert_eq!(updated, 1);
    let records = store.load().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].price_bought, Some(price(12345)));
    assert_eq!(records[1], complete);
    // nothing needed a transaction price
    assert_eq!(source.fetch_count(), 0);
    assert!(store.backup_path().exists());
}

#[tokio::test]
async fn test_sweep_fills_transaction_price_from_one_page_fetch() {
    logging::init_test_logging();

    let dir = TempDir::new().unwrap();
    let store = temp_store(&dir);
    let mut first = create_test_filing("2024-05-01 16:30:12", "AAA", "Doe John", 600_000);
    first.price_bought = Some(price(760));
    let mut second = create_test_filing("2024-05-01 12:00:00", "BBB", "Roe Jane", 700_000);
    second.price_bought = Some(price(300));
    store.save(&[first, second]).unwrap();

    let source = StaticFilingSource::new(filing_page(&[
        ("2024-05-01 16:30:12", "AAA", "Doe John", "$7.50", "+$600,000"),
        ("2024-05-01 16:30:12", "AAA", "Someone Else", "$1.00", "+$600,000"),
    ]));

    let report = sweep(source.clone(), StaticPriceProvider::new(), store.clone())
        .sweep_with_report()
        .await
        .unwrap();
    logging::log_test_data("Sweep report", &report);

    assert_eq!(report.candidates, 2);
    assert_eq!(report.updated, 1);
    assert_eq!(report.transaction_prices_filled, 1);
    assert_eq!(report.still_missing, 1);
    assert_eq!(source.fetch_count(), 1);

    let records = store.load().unwrap();
    assert_eq!(records[0].transaction_price, Some(price(750)));
    assert_eq!(records[1].transaction_price, None);
}

#[tokio::test]
async fn test_unreachable_page_still_fills_prices() {
    let dir = TempDir::new().unwrap();
    let store = temp_store(&dir);
    store
        .save(&[create_test_filing("2024-05-01 16:30:12", "AAA", "Doe John", 600_000)])
        .unwrap();

    let provider = StaticPriceProvider::new().with_series(
        "AAA",
        Granularity::FiveMinute,
        vec![PriceBar::new(ts("2024-05-01 16:30:00"), price(5000))],
    );

    let updated = sweep(StaticFilingSource::failing("connection refused"), provider, store.clone())
        .sweep()
        .await
        .unwrap();

    assert_eq!(updated, 1);
    let records = store.load().unwrap();
    assert_eq!(records[0].transaction_price, None);
    assert_eq!(records[0].price_bought, Some(price(5000)));
}

#[tokio::test]
async fn test_structural_error_restores_store_byte_for_byte() {
    logging::init_test_logging();
    logging::log_test_step("Sweep aborted by a page without the filing table");

    let dir = TempDir::new().unwrap();
    let store = temp_store(&dir);
    let mut priced_later = create_test_filing("2024-05-02 10:00:00", "AAA", "Doe John", 600_000);
    priced_later.transaction_price = Some(price(1000));
    let needs_page = create_test_filing("2024-05-01 10:00:00", "BBB", "Roe Jane", 700_000);
    store.save(&[priced_later, needs_page]).unwrap();
    let before = fs::read(store.path()).unwrap();

    let provider = StaticPriceProvider::new().with_series(
        "AAA",
        Granularity::OneMinute,
        vec![PriceBar::new(ts("2024-05-02 10:00:00"), price(1100))],
    );
    let source = StaticFilingSource::new("<html><body>Service unavailable</body></html>");

    let err = sweep(source, provider, store.clone()).sweep().await.unwrap_err();

    assert_matches!(err.downcast_ref::<InsiderError>(), Some(InsiderError::TableNotFound(_)));
    assert_eq!(fs::read(store.path()).unwrap(), before);
}

#[tokio::test]
async fn test_missing_store_is_a_noop() {
    let dir = TempDir::new().unwrap();
    let store = temp_store(&dir);

    let source = StaticFilingSource::new(filing_page(&[]));
    let updated = sweep(source, StaticPriceProvider::new(), store.clone())
        .sweep()
        .await
        .unwrap();

    assert_eq!(updated, 0);
    assert!(!store.exists());
}
