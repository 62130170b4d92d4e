//! Deduplicating merge of freshly extracted filings into the stored table

use std::collections::HashMap;

use crate::models::{FilingKey, FilingRecord};

/// Merge `incoming` into `existing`.
///
/// Rows sharing a canonical key collapse to one row that carries every
/// enrichment field any of them had, so it has at least as many set as any
/// member. Each enrichment field takes the first non-null value seen in the
/// group: a price that is already known survives any later null or
/// re-scrape. Descriptive fields come from the row added last. The result is
/// ordered by filing time, newest first; equal timestamps keep merge order.
pub fn merge<I>(existing: Vec<FilingRecord>, incoming: I) -> Vec<FilingRecord>
where
    I: IntoIterator<Item = FilingRecord>,
{
    let mut index: HashMap<FilingKey, usize> = HashMap::new();
    let mut groups: Vec<Vec<FilingRecord>> = Vec::new();

    for record in existing.into_iter().chain(incoming) {
        match index.get(&record.key()) {
            Some(&slot) => groups[slot].push(record),
            None => {
                index.insert(record.key(), groups.len());
                groups.push(vec![record]);
            }
        }
    }

    let mut merged: Vec<FilingRecord> = groups.into_iter().filter_map(reconcile_group).collect();
    merged.sort_by(|a, b| b.filing_timestamp.cmp(&a.filing_timestamp));
    merged
}

/// Collapse rows that share a key, in the order they were added
pub fn reconcile_group(group: Vec<FilingRecord>) -> Option<FilingRecord> {
    let transaction_price = group.iter().find_map(|r| r.transaction_price);
    let price_bought = group.iter().find_map(|r| r.price_bought);

    let mut survivor = group.into_iter().last()?;

    survivor.transaction_price = transaction_price;
    survivor.price_bought = price_bought;
    Some(survivor)
}
