//! Alpha Vantage client against a local mock server

use pretty_assertions::assert_eq;
use serde_json::json;
use std::fs;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use insider_buys::api::{AlphaVantageClient, ApiRateLimiter, PriceProvider};
use insider_buys::backfill::BackfillSweep;
use insider_buys::error::InsiderError;
use insider_buys::models::{Config, Granularity};
use insider_buys::pipeline::ScrapePipeline;
use insider_buys::price_resolver::PriceResolver;
use insider_buys::store::FilingStore;

use crate::common::logging;
use crate::common::test_data::{create_test_filing, filing_page, price, ts};
use crate::common::StaticFilingSource;

const REFUSED_KEY: &str = "the parameter apikey is invalid or missing. \
    Please claim your free API key on (https://www.alphavantage.co/support/#api-key).";

async fn refusing_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "Error Message": REFUSED_KEY })),
        )
        .mount(&server)
        .await;
    server
}

fn config_for(server: &MockServer) -> Config {
    let base_url = format!("{}/query", server.uri());
    Config::from_lookup(|key| match key {
        "ALPHA_VANTAGE_API_KEY" => Some("test-key".to_string()),
        "ALPHA_VANTAGE_BASE_URL" => Some(base_url.clone()),
        _ => None,
    })
    .unwrap()
}

#[tokio::test]
async fn test_fetches_intraday_series_with_key() {
    logging::init_test_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/query"))
        .and(query_param("function", "TIME_SERIES_INTRADAY"))
        .and(query_param("interval", "1min"))
        .and(query_param("symbol", "AAA"))
        .and(query_param("outputsize", "full"))
        .and(query_param("apikey", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Time Series (1min)": {
                "2024-05-01 16:30:00": { "4. close": "61.5000" },
                "2024-05-01 16:29:00": { "4. close": "61.0000" }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = AlphaVantageClient::new(&config_for(&server)).unwrap();
    let bars = client.fetch_series("AAA", Granularity::OneMinute).await.unwrap();

    assert_eq!(bars.len(), 2);
    assert_eq!(bars[0].timestamp, ts("2024-05-01 16:29:00"));
    assert_eq!(bars[1].close, price(6150));
}

#[tokio::test]
async fn test_throttle_note_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Note": "Thank you for using Alpha Vantage! \
                Our standard API call frequency is 5 calls per minute."
        })))
        .mount(&server)
        .await;

    let client = AlphaVantageClient::new(&config_for(&server)).unwrap();
    let err = client.fetch_series("AAA", Granularity::Daily).await.unwrap_err();

    assert!(matches!(err.downcast_ref::<InsiderError>(), Some(InsiderError::Throttled { .. })));
}

#[tokio::test]
async fn test_resolver_falls_back_to_daily_over_http() {
    logging::init_test_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("function", "TIME_SERIES_INTRADAY"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Meta Data": {} })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("function", "TIME_SERIES_DAILY"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Time Series (Daily)": {
                "2024-05-01": { "4. close": "60.00" },
                "2024-05-02": { "4. close": "62.00" }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = AlphaVantageClient::new(&config_for(&server)).unwrap();
    let resolver = PriceResolver::new(client, ApiRateLimiter::unlimited());
    let quote = resolver
        .resolve_price("AAA", ts("2024-05-01 16:30:12"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(quote.granularity, Granularity::Daily);
    assert_eq!(quote.close_price, price(6000));
}

#[tokio::test]
async fn test_server_error_means_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let client = AlphaVantageClient::new(&config_for(&server)).unwrap();
    let resolver = PriceResolver::new(client, ApiRateLimiter::unlimited());

    let quote = resolver.resolve_price("AAA", ts("2024-05-01 16:30:12")).await.unwrap();
    assert!(quote.is_none());
}

#[test]
fn test_missing_key_fails_fast() {
    let config = Config::from_lookup(|_| None).unwrap();
    let err = AlphaVantageClient::new(&config).err().unwrap();

    assert!(matches!(err.downcast_ref::<InsiderError>(), Some(InsiderError::MissingApiKey)));
}

#[tokio::test]
async fn test_daily_close_is_not_used_before_the_close() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("function", "TIME_SERIES_INTRADAY"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Meta Data": {} })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("function", "TIME_SERIES_DAILY"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Time Series (Daily)": {
                "2024-05-01": { "4. close": "60.00" },
                "2024-05-02": { "4. close": "62.00" }
            }
        })))
        .mount(&server)
        .await;

    let client = AlphaVantageClient::new(&config_for(&server)).unwrap();
    let resolver = PriceResolver::new(client, ApiRateLimiter::unlimited());
    let quote = resolver
        .resolve_price("AAA", ts("2024-05-02 10:00:00"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(quote.close_price, price(6000));
    assert_eq!(quote.timestamp, ts("2024-05-01 16:00:00"));
}

#[tokio::test]
async fn test_refused_key_aborts_scrape_without_saving() {
    logging::init_test_logging();
    logging::log_test_step("Scraping while the provider refuses the API key");

    let server = refusing_server().await;
    let dir = TempDir::new().unwrap();
    let store = FilingStore::new(dir.path().join("insider_buys.csv"));
    let source = StaticFilingSource::new(filing_page(&[(
        "2024-05-01 16:30:12",
        "AAA",
        "Doe John",
        "$7.50",
        "+$600,000",
    )]));

    let client = AlphaVantageClient::new(&config_for(&server)).unwrap();
    let pipeline = ScrapePipeline::new(
        source,
        PriceResolver::new(client, ApiRateLimiter::unlimited()),
        store.clone(),
        ApiRateLimiter::unlimited(),
    );
    let err = pipeline.run_once(ts("2024-05-02 08:00:00")).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<InsiderError>(),
        Some(InsiderError::InvalidApiKey(_))
    ));
    assert!(!store.exists());
    // no fallback request after the refusal
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_refused_key_aborts_backfill_and_restores_store() {
    logging::init_test_logging();

    let server = refusing_server().await;
    let dir = TempDir::new().unwrap();
    let store = FilingStore::new(dir.path().join("insider_buys.csv"));
    let mut record = create_test_filing("2024-05-01 16:30:12", "AAA", "Doe John", 600_000);
    record.transaction_price = Some(price(750));
    store.save(&[record]).unwrap();
    let before = fs::read(store.path()).unwrap();

    let client = AlphaVantageClient::new(&config_for(&server)).unwrap();
    let sweep = BackfillSweep::new(
        StaticFilingSource::new(filing_page(&[])),
        PriceResolver::new(client, ApiRateLimiter::unlimited()),
        store.clone(),
        ApiRateLimiter::unlimited(),
    );
    let err = sweep.sweep().await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<InsiderError>(),
        Some(InsiderError::InvalidApiKey(_))
    ));
    assert_eq!(fs::read(store.path()).unwrap(), before);
}
