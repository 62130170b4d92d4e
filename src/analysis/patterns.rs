use chrono::{Datelike, Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::stats::{mean, quantile, sample_std};
use super::TradeRow;

const CLUSTER_LOOKBACK_DAYS: i64 = 5;
const SUCCESS_THRESHOLD: f64 = 0.6;

/// Several filings for one company inside one ISO week
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterTrade {
    pub company_name: String,
    pub iso_year: i32,
    pub iso_week: u32,
    pub trades: usize,
}

/// Filing far above the usual trade size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeAnomaly {
    pub filing_date: NaiveDateTime,
    pub ticker: String,
    pub company_name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patterns {
    pub cluster_trades: Vec<ClusterTrade>,
    pub size_anomalies: Vec<SizeAnomaly>,
}

pub struct PatternRecognizer<'a> {
    rows: &'a [TradeRow],
}

impl<'a> PatternRecognizer<'a> {
    pub fn new(rows: &'a [TradeRow]) -> Self {
        Self { rows }
    }

    pub fn identify_cluster_trades(&self) -> Vec<ClusterTrade> {
        let mut counts: BTreeMap<(String, i32, u32), usize> = BTreeMap::new();
        for row in self.rows {
            let week = row.record.filing_timestamp.date().iso_week();
            *counts
                .entry((row.record.company_name.clone(), week.year(), week.week()))
                .or_default() += 1;
        }

        counts
            .into_iter()
            .filter(|(_, trades)| *trades > 1)
            .map(|((company_name, iso_year, iso_week), trades)| ClusterTrade {
                company_name,
                iso_year,
                iso_week,
                trades,
            })
            .collect()
    }

    /// Trades more than two standard deviations above the mean value
    pub fn identify_size_anomalies(&self) -> Vec<SizeAnomaly> {
        let values: Vec<f64> = self.rows.iter().map(|r| r.record.value as f64).collect();
        let (Some(mu), Some(sigma)) = (mean(&values), sample_std(&values)) else {
            return Vec::new();
        };
        let cutoff = mu + 2.0 * sigma;

        self.rows
            .iter()
            .filter(|r| r.record.value as f64 > cutoff)
            .map(|r| SizeAnomaly {
                filing_date: r.record.filing_timestamp,
                ticker: r.record.ticker.clone(),
                company_name: r.record.company_name.clone(),
                value: r.record.value,
            })
            .collect()
    }

    pub fn analyze_all_patterns(&self) -> Patterns {
        Patterns {
            cluster_trades: self.identify_cluster_trades(),
            size_anomalies: self.identify_size_anomalies(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    LargeValueTrade,
    ClusterTrade,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::LargeValueTrade => f.write_str("Large Value Trade"),
            Signal::ClusterTrade => f.write_str("Cluster Trade"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalThresholds {
    pub value_threshold: f64,
    pub impact_threshold: Option<f64>,
    pub success_threshold: f64,
}

/// Flags new trades against thresholds learned from history
pub struct SignalGenerator<'a> {
    history: &'a [TradeRow],
    thresholds: SignalThresholds,
}

impl<'a> SignalGenerator<'a> {
    pub fn new(history: &'a [TradeRow]) -> Self {
        let mut values: Vec<f64> = history.iter().map(|r| r.record.value as f64).collect();
        values.sort_by(f64::total_cmp);
        let impacts: Vec<f64> = history.iter().filter_map(|r| r.price_impact).collect();

        let thresholds = SignalThresholds {
            value_threshold: quantile(&values, 0.75).unwrap_or(f64::INFINITY),
            impact_threshold: mean(&impacts),
            success_threshold: SUCCESS_THRESHOLD,
        };
        Self { history, thresholds }
    }

    pub fn thresholds(&self) -> &SignalThresholds {
        &self.thresholds
    }

    /// Signals for `trade`; the cluster check looks at earlier filings of the
    /// same company in the preceding five days.
    pub fn generate_signal(&self, trade: &TradeRow) -> Vec<Signal> {
        let mut signals = Vec::new();

        if trade.record.value as f64 > self.thresholds.value_threshold {
            signals.push(Signal::LargeValueTrade);
        }

        let at = trade.record.filing_timestamp;
        let since = at - Duration::days(CLUSTER_LOOKBACK_DAYS);
        let recent = self.history.iter().any(|r| {
            r.record.company_name == trade.record.company_name
                && r.record.filing_timestamp > since
                && r.record.filing_timestamp < at
        });
        if recent {
            signals.push(Signal::ClusterTrade);
        }

        signals
    }
}
