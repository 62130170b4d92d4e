//! Descriptive statistics over the collected filings
//!
//! Everything here is a one-shot transformation of the store into tables and
//! JSON under the results directory; nothing is written back to the store.

use anyhow::{Context, Result};
use chrono::{Datelike, Timelike, Weekday};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::models::FilingRecord;
use crate::store::FilingStore;
use crate::utils::format_filing_timestamp;

pub mod kmeans;
pub mod patterns;
pub mod stats;

use patterns::{Patterns, PatternRecognizer, Signal, SignalGenerator, SignalThresholds};
use stats::{mean, median, sample_std};

pub const INSIDER_CLUSTERS_FILE: &str = "insider_clusters.csv";
pub const COMPANY_PATTERNS_FILE: &str = "company_patterns.csv";
pub const ENRICHED_DATA_FILE: &str = "enriched_data.csv";
pub const TIMING_ANALYSIS_FILE: &str = "timing_analysis.json";
pub const PATTERNS_FILE: &str = "patterns.json";

const CLUSTER_COUNT: usize = 3;
const ROLLING_WINDOW: usize = 3;
const RECENT_SIGNAL_TRADES: usize = 10;

/// A filing together with its relative price move
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRow {
    pub record: FilingRecord,
    pub price_impact: Option<f64>,
}

impl TradeRow {
    pub fn new(record: FilingRecord) -> Self {
        let price_impact = price_impact(record.transaction_price, record.price_bought);
        Self {
            record,
            price_impact,
        }
    }

    fn hour(&self) -> u32 {
        self.record.filing_timestamp.hour()
    }

    fn weekday(&self) -> Weekday {
        self.record.filing_timestamp.weekday()
    }
}

/// `(price_bought - transaction_price) / transaction_price`
pub fn price_impact(
    transaction_price: Option<Decimal>,
    price_bought: Option<Decimal>,
) -> Option<f64> {
    let paid = transaction_price?;
    if paid.is_zero() {
        return None;
    }
    ((price_bought? - paid) / paid).to_f64()
}

pub fn day_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingAnalysis {
    pub hourly_value: BTreeMap<u32, f64>,
    pub daily_impact: BTreeMap<String, f64>,
    pub monthly_pattern: BTreeMap<u32, f64>,
    pub best_filing_hour: Option<u32>,
    pub best_filing_day: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsiderCluster {
    #[serde(rename = "Insider Name")]
    pub insider_name: String,
    #[serde(rename = "Value_count")]
    pub value_count: usize,
    #[serde(rename = "Value_mean")]
    pub value_mean: f64,
    #[serde(rename = "Value_sum")]
    pub value_sum: i64,
    #[serde(rename = "Price_Impact_mean")]
    pub price_impact_mean: f64,
    #[serde(rename = "Price_Impact_std")]
    pub price_impact_std: Option<f64>,
    #[serde(rename = "Cluster")]
    pub cluster: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyPattern {
    #[serde(rename = "Company Name")]
    pub company_name: String,
    #[serde(rename = "Value_count")]
    pub value_count: usize,
    #[serde(rename = "Value_sum")]
    pub value_sum: i64,
    #[serde(rename = "Value_mean")]
    pub value_mean: f64,
    #[serde(rename = "Price_Impact_mean")]
    pub price_impact_mean: Option<f64>,
    #[serde(rename = "Price_Impact_std")]
    pub price_impact_std: Option<f64>,
    #[serde(rename = "Transaction_Price_mean")]
    pub transaction_price_mean: Option<f64>,
    #[serde(rename = "Price_Bought_mean")]
    pub price_bought_mean: Option<f64>,
    #[serde(rename = "Success_Rate")]
    pub success_rate: Option<f64>,
}

/// One row of `enriched_data.csv`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
    #[serde(rename = "Filing Date")]
    pub filing_date: String,
    #[serde(rename = "Ticker")]
    pub ticker: String,
    #[serde(rename = "Company Name")]
    pub company_name: String,
    #[serde(rename = "Insider Name")]
    pub insider_name: Option<String>,
    #[serde(rename = "Transaction Price")]
    pub transaction_price: Option<f64>,
    #[serde(rename = "Price Bought")]
    pub price_bought: Option<f64>,
    #[serde(rename = "Value")]
    pub value: i64,
    #[serde(rename = "Hour")]
    pub hour: u32,
    #[serde(rename = "Day")]
    pub day: &'static str,
    #[serde(rename = "Month")]
    pub month: u32,
    #[serde(rename = "Price_Impact")]
    pub price_impact: Option<f64>,
    #[serde(rename = "Is_Morning")]
    pub is_morning: bool,
    #[serde(rename = "Is_Afternoon")]
    pub is_afternoon: bool,
    #[serde(rename = "Large_Trade")]
    pub large_trade: bool,
    #[serde(rename = "Rolling_Avg_Impact")]
    pub rolling_avg_impact: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignals {
    pub filing_date: String,
    pub ticker: String,
    pub company_name: String,
    pub signals: Vec<Signal>,
}

/// Contents of `patterns.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternReport {
    #[serde(flatten)]
    pub patterns: Patterns,
    pub thresholds: SignalThresholds,
    pub recent_signals: Vec<TradeSignals>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisSummary {
    pub records: usize,
    pub insiders: usize,
    pub companies: usize,
    pub cluster_trades: usize,
    pub size_anomalies: usize,
}

/// Derived views over a snapshot of the store
pub struct InsiderAnalyzer {
    rows: Vec<TradeRow>,
}

impl InsiderAnalyzer {
    pub fn new(records: Vec<FilingRecord>) -> Self {
        Self {
            rows: records.into_iter().map(TradeRow::new).collect(),
        }
    }

    pub fn from_store(store: &FilingStore) -> Result<Self> {
        Ok(Self::new(store.load()?))
    }

    pub fn rows(&self) -> &[TradeRow] {
        &self.rows
    }

    pub fn analyze_timing_patterns(&self) -> TimingAnalysis {
        let mut hourly_value: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
        let mut hourly_impact: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
        let mut daily_impact: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut monthly_value: BTreeMap<u32, Vec<f64>> = BTreeMap::new();

        for row in &self.rows {
            let value = row.record.value as f64;
            hourly_value.entry(row.hour()).or_default().push(value);
            monthly_value
                .entry(row.record.filing_timestamp.month())
                .or_default()
                .push(value);
            if let Some(impact) = row.price_impact {
                hourly_impact.entry(row.hour()).or_default().push(impact);
                daily_impact
                    .entry(day_name(row.weekday()).to_string())
                    .or_default()
                    .push(impact);
            }
        }

        let hourly_impact = means(hourly_impact);
        let daily_impact = means(daily_impact);

        TimingAnalysis {
            best_filing_hour: arg_max(&hourly_impact).copied(),
            best_filing_day: arg_max(&daily_impact).cloned(),
            hourly_value: means(hourly_value),
            daily_impact,
            monthly_pattern: means(monthly_value),
        }
    }

    /// Per-insider statistics, grouped into clusters on (mean value, mean
    /// impact). Insiders without any price impact are left out.
    pub fn analyze_insider_clusters(&self) -> Vec<InsiderCluster> {
        let mut groups: BTreeMap<&str, Vec<&TradeRow>> = BTreeMap::new();
        for row in &self.rows {
            if let Some(name) = row.record.insider_name.as_deref() {
                groups.entry(name).or_default().push(row);
            }
        }

        let mut insiders: Vec<InsiderCluster> = groups
            .into_iter()
            .filter_map(|(name, rows)| {
                let values: Vec<f64> = rows.iter().map(|r| r.record.value as f64).collect();
                let impacts: Vec<f64> = rows.iter().filter_map(|r| r.price_impact).collect();
                Some(InsiderCluster {
                    insider_name: name.to_string(),
                    value_count: rows.len(),
                    value_mean: mean(&values)?,
                    value_sum: rows.iter().map(|r| r.record.value).sum(),
                    price_impact_mean: mean(&impacts)?,
                    price_impact_std: sample_std(&impacts),
                    cluster: 0,
                })
            })
            .collect();

        if insiders.len() >= CLUSTER_COUNT {
            let features: Vec<Vec<f64>> = insiders
                .iter()
                .map(|i| vec![i.value_mean, i.price_impact_mean])
                .collect();
            let labels = kmeans::kmeans(&kmeans::standardize(&features), CLUSTER_COUNT);
            for (insider, label) in insiders.iter_mut().zip(labels) {
                insider.cluster = label;
            }
        }
        insiders
    }

    pub fn analyze_company_patterns(&self) -> Vec<CompanyPattern> {
        let mut groups: BTreeMap<&str, Vec<&TradeRow>> = BTreeMap::new();
        for row in &self.rows {
            groups.entry(row.record.company_name.as_str()).or_default().push(row);
        }

        groups
            .into_iter()
            .map(|(name, rows)| {
                let values: Vec<f64> = rows.iter().map(|r| r.record.value as f64).collect();
                let impacts: Vec<f64> = rows.iter().filter_map(|r| r.price_impact).collect();
                let paid: Vec<f64> = rows
                    .iter()
                    .filter_map(|r| r.record.transaction_price.and_then(|p| p.to_f64()))
                    .collect();
                let bought: Vec<f64> = rows
                    .iter()
                    .filter_map(|r| r.record.price_bought.and_then(|p| p.to_f64()))
                    .collect();
                let wins = impacts.iter().filter(|&&i| i > 0.0).count();

                CompanyPattern {
                    company_name: name.to_string(),
                    value_count: rows.len(),
                    value_sum: rows.iter().map(|r| r.record.value).sum(),
                    value_mean: mean(&values).unwrap_or_default(),
                    price_impact_mean: mean(&impacts),
                    price_impact_std: sample_std(&impacts),
                    transaction_price_mean: mean(&paid),
                    price_bought_mean: mean(&bought),
                    success_rate: (!impacts.is_empty()).then(|| wins as f64 / impacts.len() as f64),
                }
            })
            .collect()
    }

    /// Per-filing features in chronological order
    pub fn generate_predictive_features(&self) -> Vec<FeatureRow> {
        let values: Vec<f64> = self.rows.iter().map(|r| r.record.value as f64).collect();
        let value_median = median(&values).unwrap_or_default();

        let mut chronological: Vec<&TradeRow> = self.rows.iter().collect();
        chronological.sort_by_key(|r| r.record.filing_timestamp);

        let mut windows: HashMap<&str, VecDeque<Option<f64>>> = HashMap::new();
        chronological
            .into_iter()
            .map(|row| {
                let window = windows.entry(row.record.company_name.as_str()).or_default();
                window.push_back(row.price_impact);
                if window.len() > ROLLING_WINDOW {
                    window.pop_front();
                }
                let seen: Vec<f64> = window.iter().flatten().copied().collect();
                let hour = row.hour();

                FeatureRow {
                    filing_date: format_filing_timestamp(&row.record.filing_timestamp),
                    ticker: row.record.ticker.clone(),
                    company_name: row.record.company_name.clone(),
                    insider_name: row.record.insider_name.clone(),
                    transaction_price: row.record.transaction_price.and_then(|p| p.to_f64()),
                    price_bought: row.record.price_bought.and_then(|p| p.to_f64()),
                    value: row.record.value,
                    hour,
                    day: day_name(row.weekday()),
                    month: row.record.filing_timestamp.month(),
                    price_impact: row.price_impact,
                    is_morning: (9..=12).contains(&hour),
                    is_afternoon: (13..=16).contains(&hour),
                    large_trade: row.record.value as f64 > value_median,
                    rolling_avg_impact: mean(&seen),
                }
            })
            .collect()
    }

    pub fn analyze_patterns(&self) -> Patterns {
        PatternRecognizer::new(&self.rows).analyze_all_patterns()
    }

    /// Signals for the most recent filings, each judged against the rest of history
    pub fn recent_signals(&self) -> (SignalThresholds, Vec<TradeSignals>) {
        let generator = SignalGenerator::new(&self.rows);

        let mut newest: Vec<&TradeRow> = self.rows.iter().collect();
        newest.sort_by(|a, b| b.record.filing_timestamp.cmp(&a.record.filing_timestamp));

        let signals = newest
            .into_iter()
            .take(RECENT_SIGNAL_TRADES)
            .map(|row| TradeSignals {
                filing_date: format_filing_timestamp(&row.record.filing_timestamp),
                ticker: row.record.ticker.clone(),
                company_name: row.record.company_name.clone(),
                signals: generator.generate_signal(row),
            })
            .collect();

        (generator.thresholds().clone(), signals)
    }
}

fn means<K: Ord>(groups: BTreeMap<K, Vec<f64>>) -> BTreeMap<K, f64> {
    groups
        .into_iter()
        .filter_map(|(key, values)| mean(&values).map(|m| (key, m)))
        .collect()
}

/// Key with the largest value; the first key wins ties
fn arg_max<K>(values: &BTreeMap<K, f64>) -> Option<&K> {
    values
        .iter()
        .fold(None, |best: Option<(&K, f64)>, (key, &value)| match best {
            Some((_, top)) if top >= value => best,
            _ => Some((key, value)),
        })
        .map(|(key, _)| key)
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!("💾 Saved {}", path.display());
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("💾 Saved {}", path.display());
    Ok(())
}

/// Run every analysis and write the results under `results_dir`
pub fn run_analysis(analyzer: &InsiderAnalyzer, results_dir: &Path) -> Result<AnalysisSummary> {
    info!("📊 Analyzing {} filings...", analyzer.rows().len());
    fs::create_dir_all(results_dir)
        .with_context(|| format!("Failed to create {}", results_dir.display()))?;

    let timing = analyzer.analyze_timing_patterns();
    let insiders = analyzer.analyze_insider_clusters();
    let companies = analyzer.analyze_company_patterns();
    let features = analyzer.generate_predictive_features();
    let patterns = analyzer.analyze_patterns();
    let (thresholds, recent_signals) = analyzer.recent_signals();

    write_csv(&results_path(results_dir, INSIDER_CLUSTERS_FILE), &insiders)?;
    write_csv(&results_path(results_dir, COMPANY_PATTERNS_FILE), &companies)?;
    write_csv(&results_path(results_dir, ENRICHED_DATA_FILE), &features)?;
    write_json(&results_path(results_dir, TIMING_ANALYSIS_FILE), &timing)?;

    let summary = AnalysisSummary {
        records: analyzer.rows().len(),
        insiders: insiders.len(),
        companies: companies.len(),
        cluster_trades: patterns.cluster_trades.len(),
        size_anomalies: patterns.size_anomalies.len(),
    };
    write_json(
        &results_path(results_dir, PATTERNS_FILE),
        &PatternReport {
            patterns,
            thresholds,
            recent_signals,
        },
    )?;

    if let Some(hour) = timing.best_filing_hour {
        info!("⏰ Best filing hour by mean impact: {}:00", hour);
    }
    if let Some(day) = &timing.best_filing_day {
        info!("📅 Best filing day by mean impact: {}", day);
    }
    info!(
        "✅ Analysis complete: {} insiders, {} companies, {} cluster trades, {} size anomalies",
        summary.insiders, summary.companies, summary.cluster_trades, summary.size_anomalies
    );
    Ok(summary)
}

pub fn results_path(results_dir: &Path, file: &str) -> PathBuf {
    results_dir.join(file)
}
