//! SVG charts rendered from the analysis outputs

use anyhow::{bail, Context, Result};
use plotters::coord::Shift;
use plotters::prelude::*;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::analysis::stats::{mean, summarize};
use crate::analysis::{
    results_path, CompanyPattern, InsiderCluster, TimingAnalysis, COMPANY_PATTERNS_FILE,
    ENRICHED_DATA_FILE, INSIDER_CLUSTERS_FILE, TIMING_ANALYSIS_FILE,
};

const TOP_COMPANIES: usize = 10;
const HISTOGRAM_BINS: usize = 50;
const ROLLING_WINDOW: usize = 30;
const CLUSTER_COLORS: [RGBColor; 6] = [BLUE, RED, GREEN, MAGENTA, CYAN, BLACK];
const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

type Panel<'a> = DrawingArea<SVGBackend<'a>, Shift>;

/// The columns of `enriched_data.csv` the charts need
#[derive(Debug, Deserialize)]
struct ImpactRow {
    #[serde(rename = "Filing Date")]
    filing_date: String,
    #[serde(rename = "Price_Impact")]
    price_impact: Option<f64>,
}

fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let rows = reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(rows)
}

/// Render every chart into `results_dir`; returns the files written
pub fn render_all(results_dir: &Path) -> Result<Vec<PathBuf>> {
    for file in [
        INSIDER_CLUSTERS_FILE,
        COMPANY_PATTERNS_FILE,
        ENRICHED_DATA_FILE,
        TIMING_ANALYSIS_FILE,
    ] {
        let path = results_path(results_dir, file);
        if !path.exists() {
            bail!("{} not found, run `analyze` first", path.display());
        }
    }

    let timing: TimingAnalysis = serde_json::from_str(
        &fs::read_to_string(results_path(results_dir, TIMING_ANALYSIS_FILE))?,
    )
    .context("Failed to parse timing analysis")?;
    let insiders: Vec<InsiderCluster> =
        read_csv(&results_path(results_dir, INSIDER_CLUSTERS_FILE))?;
    let companies: Vec<CompanyPattern> =
        read_csv(&results_path(results_dir, COMPANY_PATTERNS_FILE))?;
    let impacts: Vec<ImpactRow> = read_csv(&results_path(results_dir, ENRICHED_DATA_FILE))?;

    let chart = |name: &str| results_dir.join(name);
    let written = vec![
        chart("timing_patterns.svg"),
        chart("insider_clusters.svg"),
        chart("top_companies.svg"),
        chart("value_vs_impact.svg"),
        chart("impact_distribution.svg"),
        chart("rolling_impact.svg"),
    ];
    plot_timing_patterns(&written[0], &timing)?;
    plot_insider_clusters(&written[1], &insiders)?;
    plot_top_companies(&written[2], &companies)?;
    plot_value_vs_impact(&written[3], &companies)?;
    plot_impact_distribution(&written[4], &impacts)?;
    plot_rolling_impact(&written[5], &impacts)?;

    let values: Vec<f64> = impacts.iter().filter_map(|r| r.price_impact).collect();
    if let Some(summary) = summarize(&values) {
        info!(
            "📈 Price impact: n={} mean={:.3} std={:.3} min={:.3} median={:.3} max={:.3}",
            summary.count,
            summary.mean,
            summary.std.unwrap_or(f64::NAN),
            summary.min,
            summary.median,
            summary.max
        );
    }
    info!("✅ Wrote {} charts to {}", written.len(), results_dir.display());
    Ok(written)
}

/// Value range padded so bars and points never sit on the frame
fn padded_range(values: impl IntoIterator<Item = f64>, include_zero: bool) -> std::ops::Range<f64> {
    let (mut lo, mut hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return 0.0..1.0;
    }
    if include_zero {
        lo = lo.min(0.0);
        hi = hi.max(0.0);
    }
    let pad = if hi > lo { (hi - lo) * 0.05 } else { 1.0 };
    (lo - pad)..(hi + pad)
}

fn bar_panel(
    panel: &Panel<'_>,
    title: &str,
    y_desc: &str,
    labels: &[String],
    values: &[f64],
) -> Result<()> {
    let count = values.len().max(1);
    let mut chart = ChartBuilder::on(panel)
        .caption(title, ("sans-serif", 22))
        .margin(12)
        .x_label_area_size(40)
        .y_label_area_size(80)
        .build_cartesian_2d(
            -0.5f64..(count as f64 - 0.5),
            padded_range(values.iter().copied(), true),
        )?;

    let label_at = |x: &f64| {
        let rounded = x.round();
        if (x - rounded).abs() > 0.01 || rounded < 0.0 {
            return String::new();
        }
        labels.get(rounded as usize).cloned().unwrap_or_default()
    };
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(count)
        .x_label_formatter(&label_at)
        .y_desc(y_desc)
        .draw()?;

    chart.draw_series(values.iter().enumerate().map(|(i, &v)| {
        let x = i as f64;
        Rectangle::new([(x - 0.4, 0.0), (x + 0.4, v)], BLUE.mix(0.7).filled())
    }))?;
    Ok(())
}

fn scatter_panel(
    panel: &Panel<'_>,
    title: &str,
    points: &[(f64, f64, RGBColor)],
) -> Result<()> {
    let mut chart = ChartBuilder::on(panel)
        .caption(title, ("sans-serif", 24))
        .margin(12)
        .x_label_area_size(45)
        .y_label_area_size(80)
        .build_cartesian_2d(
            padded_range(points.iter().map(|p| p.0), false),
            padded_range(points.iter().map(|p| p.1), false),
        )?;

    chart
        .configure_mesh()
        .x_desc("Average Trade Value ($)")
        .y_desc("Average Price Impact")
        .draw()?;
    chart.draw_series(
        points
            .iter()
            .map(|&(x, y, color)| Circle::new((x, y), 5, color.mix(0.6).filled())),
    )?;
    Ok(())
}

fn plot_timing_patterns(path: &Path, timing: &TimingAnalysis) -> Result<()> {
    let root = SVGBackend::new(path, (1800, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((1, 3));

    let (hours, hourly): (Vec<String>, Vec<f64>) =
        timing.hourly_value.iter().map(|(h, v)| (h.to_string(), *v)).unzip();
    bar_panel(&panels[0], "Average Trade Value by Hour", "Average Value ($)", &hours, &hourly)?;

    let (days, daily): (Vec<String>, Vec<f64>) = WEEKDAYS
        .iter()
        .filter_map(|day| timing.daily_impact.get(*day).map(|v| (day[..3].to_string(), *v)))
        .unzip();
    bar_panel(&panels[1], "Average Price Impact by Day", "Price Impact", &days, &daily)?;

    let (months, monthly): (Vec<String>, Vec<f64>) =
        timing.monthly_pattern.iter().map(|(m, v)| (m.to_string(), *v)).unzip();
    bar_panel(&panels[2], "Average Trade Value by Month", "Average Value ($)", &months, &monthly)?;

    root.present()?;
    info!("🖼️ Saved {}", path.display());
    Ok(())
}

fn plot_insider_clusters(path: &Path, insiders: &[InsiderCluster]) -> Result<()> {
    let root = SVGBackend::new(path, (1200, 800)).into_drawing_area();
    root.fill(&WHITE)?;

    let points: Vec<(f64, f64, RGBColor)> = insiders
        .iter()
        .map(|i| {
            let color = CLUSTER_COLORS[i.cluster % CLUSTER_COLORS.len()];
            (i.value_mean, i.price_impact_mean, color)
        })
        .collect();
    scatter_panel(&root, "Insider Trading Clusters", &points)?;

    root.present()?;
    info!("🖼️ Saved {}", path.display());
    Ok(())
}

fn plot_top_companies(path: &Path, companies: &[CompanyPattern]) -> Result<()> {
    let root = SVGBackend::new(path, (1400, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut ranked: Vec<(&str, f64)> = companies
        .iter()
        .filter_map(|c| c.success_rate.map(|rate| (c.company_name.as_str(), rate)))
        .collect();
    // Stable sort keeps the alphabetical order among equal rates
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(TOP_COMPANIES);

    let labels: Vec<String> = ranked
        .iter()
        .map(|(name, _)| name.chars().take(14).collect())
        .collect();
    let rates: Vec<f64> = ranked.iter().map(|(_, rate)| *rate).collect();
    bar_panel(&root, "Top 10 Companies by Trading Success Rate", "Success Rate", &labels, &rates)?;

    root.present()?;
    info!("🖼️ Saved {}", path.display());
    Ok(())
}

fn plot_value_vs_impact(path: &Path, companies: &[CompanyPattern]) -> Result<()> {
    let root = SVGBackend::new(path, (1200, 800)).into_drawing_area();
    root.fill(&WHITE)?;

    let points: Vec<(f64, f64, RGBColor)> = companies
        .iter()
        .filter_map(|c| c.price_impact_mean.map(|impact| (c.value_mean, impact, BLUE)))
        .collect();
    scatter_panel(&root, "Trade Value vs Price Impact by Company", &points)?;

    root.present()?;
    info!("🖼️ Saved {}", path.display());
    Ok(())
}

/// Equal-width bin counts over the finite values; returns (lower edge, width, counts)
pub fn histogram(values: &[f64], bins: usize) -> Option<(f64, f64, Vec<usize>)> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let lo = finite.iter().copied().reduce(f64::min)?;
    let hi = finite.iter().copied().reduce(f64::max)?;
    let bins = bins.max(1);
    let width = if hi > lo { (hi - lo) / bins as f64 } else { 1.0 };

    let mut counts = vec![0; bins];
    for v in finite {
        let index = (((v - lo) / width) as usize).min(bins - 1);
        counts[index] += 1;
    }
    Some((lo, width, counts))
}

fn plot_impact_distribution(path: &Path, rows: &[ImpactRow]) -> Result<()> {
    let root = SVGBackend::new(path, (1200, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let values: Vec<f64> = rows.iter().filter_map(|r| r.price_impact).collect();
    let (lo, width, counts) = histogram(&values, HISTOGRAM_BINS).unwrap_or((0.0, 1.0, Vec::new()));
    let top = counts.iter().copied().max().unwrap_or(0).max(1) as f64;

    let mut chart = ChartBuilder::on(&root)
        .caption("Distribution of Price Impacts", ("sans-serif", 24))
        .margin(12)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(lo..(lo + width * counts.len().max(1) as f64), 0f64..top * 1.1)?;
    chart.configure_mesh().x_desc("Price Impact").y_desc("Count").draw()?;
    chart.draw_series(counts.iter().enumerate().map(|(i, &count)| {
        let left = lo + width * i as f64;
        Rectangle::new([(left, 0.0), (left + width, count as f64)], BLUE.mix(0.6).filled())
    }))?;

    root.present()?;
    info!("🖼️ Saved {}", path.display());
    Ok(())
}

/// Trailing mean over full windows; a series shorter than the window uses
/// its own length as the window.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.min(values.len()).max(1);
    values
        .windows(window)
        .filter_map(mean)
        .collect()
}

fn plot_rolling_impact(path: &Path, rows: &[ImpactRow]) -> Result<()> {
    let root = SVGBackend::new(path, (1500, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let dated: Vec<(&str, f64)> = rows
        .iter()
        .filter_map(|r| r.price_impact.map(|impact| (r.filing_date.as_str(), impact)))
        .collect();
    let impacts: Vec<f64> = dated.iter().map(|(_, impact)| *impact).collect();
    let rolling = rolling_mean(&impacts, ROLLING_WINDOW);
    // Each rolling value belongs to the last filing of its window
    let offset = dated.len().saturating_sub(rolling.len());

    let mut chart = ChartBuilder::on(&root)
        .caption("30-Filing Rolling Average of Price Impact", ("sans-serif", 24))
        .margin(12)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(
            0f64..(dated.len().max(2) - 1) as f64,
            padded_range(rolling.iter().copied(), true),
        )?;

    let date_at = |x: &f64| {
        dated
            .get(x.round().max(0.0) as usize)
            .map(|(date, _)| date.chars().take(10).collect())
            .unwrap_or_default()
    };
    chart
        .configure_mesh()
        .x_labels(8)
        .x_label_formatter(&date_at)
        .x_desc("Filing Date")
        .y_desc("Price Impact")
        .draw()?;
    chart.draw_series(LineSeries::new(
        rolling.iter().enumerate().map(|(i, v)| ((i + offset) as f64, *v)),
        &BLUE,
    ))?;

    root.present()?;
    info!("🖼️ Saved {}", path.display());
    Ok(())
}
