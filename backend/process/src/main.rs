use std::time::Duration;

use bank::{Location, postgres::PgStore};
use chrono::NaiveDate;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use process::{
    RunOptions,
    config::Config,
    feed::DineOnCampusFeed,
    ingest,
    utils::{DateWindow, today},
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    days_before: u32,

    days_after: u32,

    /// Anchor day of the window, defaults to today
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Only scrape these locations, may be repeated
    #[arg(long = "location", value_name = "LOCATION")]
    locations: Vec<Location>,

    /// Resolve without writing
    #[arg(long)]
    dry_run: bool,

    #[arg(long)]
    no_progress: bool,

    /// Create missing tables before the run
    #[arg(long)]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let config = Config::load()?;

    info!("Connecting to store...");
    let store = PgStore::connect(&config.database_url, config.max_connections).await?;
    if args.migrate {
        store.migrate().await?;
    }

    let feed = DineOnCampusFeed::new(&config.feed_base_url, &config.site_id)?;

    let locations = if args.locations.is_empty() {
        Location::ALL.to_vec()
    } else {
        args.locations
    };

    let window = DateWindow::around(
        args.start.unwrap_or_else(today),
        args.days_before,
        args.days_after,
    )?;
    info!(start = %window.start(), end = %window.end(), ?locations, "Starting run");

    let options = RunOptions {
        retries: config.fetch_retries,
        retry_delay: Duration::from_millis(config.retry_delay_ms),
        dry_run: args.dry_run,
        progress: !args.no_progress,
    };

    let report = ingest(&feed, &store, &locations, window, &options).await?;

    for pair in report.unavailable() {
        warn!(location = %pair.location, date = %pair.date, "Location-day was not ingested");
    }

    if let Some(flushed) = &report.flushed {
        for (table, rows) in flushed {
            println!("New {table} rows: {rows}");
        }
    }

    Ok(())
}
