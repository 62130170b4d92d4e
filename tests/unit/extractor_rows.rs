//! Filing page parsing against a full listing page

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use test_log::test;

use insider_buys::error::InsiderError;
use insider_buys::extractor::{extract_filings, parse_filing_table};
use insider_buys::models::MIN_FILING_VALUE;

use crate::common::test_data::{filing_page, price, ts};

#[test]
fn test_only_valid_rows_survive_in_source_order() {
    let page = filing_page(&[
        ("2024-05-01 16:30:12", "AAA", "Doe John", "$10.00", "+$600,000"),
        ("2024-05-01 15:00:00", "BBB", "Roe Jane", "$5.00", "+$400,000"),
        ("2024-06-01 09:00:00", "CCC", "Poe Ed", "$7.00", "+$900,000"),
        ("05/01/2024", "DDD", "Moe Al", "$7.00", "+$900,000"),
        ("2024-05-01 11:00:00", "EEE", "Loe Bo", "", "+$1,500,000"),
    ]);
    let table = parse_filing_table(&page).unwrap();
    assert_eq!(table.rows.len(), 5);

    let records: Vec<_> = extract_filings(table, ts("2024-05-02 00:00:00")).collect();
    let tickers: Vec<&str> = records.iter().map(|r| r.ticker.as_str()).collect();

    assert_eq!(tickers, vec!["AAA", "EEE"]);
    assert_eq!(records[0].transaction_price, Some(price(1000)));
    assert_eq!(records[1].transaction_price, None);
    assert!(records.iter().all(|r| r.value >= MIN_FILING_VALUE));
    assert!(records.iter().all(|r| r.price_bought.is_none()));
}

#[test]
fn test_extractor_is_lazy_and_single_pass() {
    let page = filing_page(&[
        ("2024-05-01 16:30:12", "AAA", "Doe John", "$10.00", "+$600,000"),
        ("2024-05-01 15:30:12", "BBB", "Doe John", "$10.00", "+$700,000"),
    ]);
    let table = parse_filing_table(&page).unwrap();
    let mut filings = extract_filings(table, ts("2024-05-02 00:00:00"));

    assert_eq!(filings.next().map(|r| r.ticker), Some("AAA".to_string()));
    assert_eq!(filings.next().map(|r| r.ticker), Some("BBB".to_string()));
    assert_eq!(filings.next(), None);
    assert_eq!(filings.next(), None);
}

#[test]
fn test_page_without_table_is_structural() {
    let err = parse_filing_table("<html><body><p>maintenance</p></body></html>").unwrap_err();
    assert_matches!(err, InsiderError::TableNotFound(_));
    assert!(err.is_structural());
}

#[test]
fn test_shifted_columns_are_structural() {
    let page = filing_page(&[]).replacen("<th><h3>X</h3></th>", "", 1);
    let err = parse_filing_table(&page).unwrap_err();

    assert_matches!(err, InsiderError::UnexpectedLayout { index: 1, .. });
    assert!(err.is_structural());
}
