use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use insider_buys::analysis::{run_analysis, InsiderAnalyzer};
use insider_buys::api::{AlphaVantageClient, ApiRateLimiter, OpenInsiderClient};
use insider_buys::backfill::BackfillSweep;
use insider_buys::logging::init_logging;
use insider_buys::models::Config;
use insider_buys::pipeline::ScrapePipeline;
use insider_buys::price_resolver::PriceResolver;
use insider_buys::store::FilingStore;
use insider_buys::visualize::render_all;

#[derive(Parser)]
#[command(name = "insider-buys")]
#[command(about = "Collect insider purchase filings, price them and analyze the results")]
struct Cli {
    /// Filing store (overrides INSIDER_CSV_PATH)
    #[arg(long, global = true, value_name = "FILE")]
    csv: Option<PathBuf>,

    /// Analysis output directory (overrides RESULTS_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    results_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape the latest filings, price them and merge into the store
    Scrape,
    /// Fill missing transaction prices and prices bought in the store
    Backfill,
    /// Write timing, insider, company and pattern analysis
    Analyze,
    /// Render SVG charts from the analysis results
    Visualize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(csv) = cli.csv {
        config.csv_path = csv;
    }
    if let Some(dir) = cli.results_dir {
        config.results_dir = dir;
    }

    init_logging(&config.log_path, config.log_max_lines)?;

    let result = match cli.command {
        Commands::Scrape => scrape(&config).await,
        Commands::Backfill => backfill(&config).await,
        Commands::Analyze => analyze(&config),
        Commands::Visualize => render_all(&config.results_dir).map(|_| ()),
    };

    if let Err(e) = &result {
        error!("❌ {:#}", e);
    }
    result
}

fn resolver(config: &Config) -> Result<PriceResolver<AlphaVantageClient>> {
    let client = AlphaVantageClient::new(config)?;
    Ok(PriceResolver::new(client, ApiRateLimiter::new(config.price_request_delay)))
}

async fn scrape(config: &Config) -> Result<()> {
    info!("🚀 Starting insider purchase scrape");
    let pipeline = ScrapePipeline::new(
        OpenInsiderClient::new(config)?,
        resolver(config)?,
        FilingStore::new(&config.csv_path),
        ApiRateLimiter::new(config.filing_request_delay),
    );

    let report = pipeline.run_once(Local::now().naive_local()).await?;
    info!(
        "🎉 Scrape finished: {} extracted, {} priced, {} new, {} total",
        report.extracted, report.enriched, report.new_records, report.total_records
    );
    Ok(())
}

async fn backfill(config: &Config) -> Result<()> {
    info!("🚀 Starting backfill of {}", config.csv_path.display());
    let sweep = BackfillSweep::new(
        OpenInsiderClient::new(config)?,
        resolver(config)?,
        FilingStore::new(&config.csv_path),
        ApiRateLimiter::new(config.filing_request_delay),
    );

    let updated = sweep.sweep().await?;
    info!("🎉 Backfill finished: {} records updated", updated);
    Ok(())
}

fn analyze(config: &Config) -> Result<()> {
    let analyzer = InsiderAnalyzer::from_store(&FilingStore::new(&config.csv_path))?;
    run_analysis(&analyzer, &config.results_dir)?;
    Ok(())
}
