//! # Menu Processing
//!
//! Logic behind turning scraped dining-hall menus into rows.
//!
//! ## Overall Data Structures
//!
//! In-memory structures:
//! - Identity cache ([`cache::IdentityCache`]): name to id for foods and allergens, (meal, location, date) to id
//!   for menus, plus every stored link pair. Loaded once from the store at the start of a run.
//!
//! - Batch ([`writer::Batch`]): every row minted during the run. Nothing touches the store until the whole
//!   window has been walked.
//!
//! ### Store
//! - Five append-only tables: `food`, `menu`, `food_on_menu`, `allergen`, `food_on_allergen`.
//!   Ids are minted here, not by the database, so only one run may write at a time.
//!
//! ## Daily Cron Job -- Dining API
//! 1. Hydrate the identity cache from the store. If that fails, stop: nothing can be resolved against an
//!    unknown baseline.
//!
//! 2. For each day in the window, and each location in its fixed order, pull the raw items.
//! - "No menu published" is normal, log and move on.
//! - Transport failures are retried a few times, then the location-day is skipped and reported.
//!
//! 3. Resolve each item in arrival order. The menu and allergens are minted on first sight, the food by name.
//!
//! 4. A known food is only linked to the new menu, never rewritten.
//!
//! 5. Flush the batch once: allergens, foods, menus, then the two link tables.
//!
//! ## Notes
//! - Running the same window twice writes nothing the second time; the cache already sees the first run.
//!
//! - If the process dies before the flush, nothing was written and the next run starts clean.
//!
//! - A failed flush leaves earlier tables committed. Rows of the failed table are lost for this run.
use std::time::Duration;

use bank::{Location, Store, TableCounts};
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::time::sleep;
use tracing::{info, warn};

pub mod cache;
pub mod config;
pub mod error;
pub mod feed;
pub mod models;
pub mod resolver;
pub mod utils;
pub mod writer;

use cache::IdentityCache;
use error::IngestError;
use feed::{Feed, FeedError, RawItem};
use resolver::FactResolver;
use utils::DateWindow;
use writer::{Batch, flush};

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Extra attempts after an unavailable feed response.
    pub retries: u32,
    pub retry_delay: Duration,
    /// Resolve everything but write nothing.
    pub dry_run: bool,
    pub progress: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            retries: 2,
            retry_delay: Duration::from_millis(500),
            dry_run: false,
            progress: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairStatus {
    Fetched { records: usize },
    NoData,
    Unavailable { attempts: u32, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairOutcome {
    pub location: Location,
    pub date: NaiveDate,
    pub status: PairStatus,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub pairs: Vec<PairOutcome>,
    /// New rows resolved per table.
    pub pending: TableCounts,
    /// Rows written per table, `None` on a dry run.
    pub flushed: Option<TableCounts>,
}

impl RunReport {
    pub fn records(&self) -> usize {
        self.pairs
            .iter()
            .map(|pair| match pair.status {
                PairStatus::Fetched { records } => records,
                _ => 0,
            })
            .sum()
    }

    pub fn unavailable(&self) -> impl Iterator<Item = &PairOutcome> {
        self.pairs
            .iter()
            .filter(|pair| matches!(pair.status, PairStatus::Unavailable { .. }))
    }

    pub fn pending_rows(&self) -> u64 {
        self.pending.values().sum()
    }
}

/// One ingestion run over `window`. Writes happen only at the very end.
pub async fn ingest<F: Feed, S: Store>(
    feed: &F,
    store: &S,
    locations: &[Location],
    window: DateWindow,
    options: &RunOptions,
) -> Result<RunReport, IngestError> {
    let mut cache = IdentityCache::hydrate(store).await?;

    let mut locations = locations.to_vec();
    locations.sort();
    locations.dedup();

    let (pairs, batch) = fetch_menus_range(feed, &mut cache, &locations, window, options).await;
    let pending = batch.counts();

    let report = RunReport {
        pairs,
        pending,
        flushed: None,
    };

    println!("Total Records: {}", report.records());
    println!("Total New Rows: {}\n", report.pending_rows());

    if options.dry_run {
        info!(pending = ?report.pending, "Dry run, nothing written");
        return Ok(report);
    }

    if batch.is_empty() {
        println!("No new foods, menus or allergens found.");
    }

    let flushed = flush(store, &batch).await?;

    Ok(RunReport {
        flushed: Some(flushed),
        ..report
    })
}

async fn fetch_menus_range<F: Feed>(
    feed: &F,
    cache: &mut IdentityCache,
    locations: &[Location],
    window: DateWindow,
    options: &RunOptions,
) -> (Vec<PairOutcome>, Batch) {
    let pb = progress_bar(window.len() * locations.len() as u64, options.progress);

    let mut resolver = FactResolver::new(cache);
    let mut batch = Batch::default();
    let mut pairs = Vec::new();

    for date in window.days() {
        for &location in locations {
            pb.set_message(format!("Fetching {location} {date}"));

            let status = match fetch_with_retry(feed, location, date, options).await {
                (_, Ok(items)) => {
                    let records = items.len();
                    resolve_items(&mut resolver, &mut batch, &items);

                    info!(%location, %date, records, "Got data");
                    PairStatus::Fetched { records }
                }
                (_, Err(FeedError::NoData { .. })) => {
                    info!(%location, %date, "No data found");
                    PairStatus::NoData
                }
                (attempts, Err(e @ FeedError::Unavailable { .. })) => {
                    warn!(%location, %date, attempts, error = %e, "Skipping location-day");
                    PairStatus::Unavailable {
                        attempts,
                        reason: e.to_string(),
                    }
                }
            };

            pairs.push(PairOutcome {
                location,
                date,
                status,
            });
            pb.inc(1);
        }
    }

    pb.finish_with_message("Done");

    (pairs, batch)
}

fn resolve_items(resolver: &mut FactResolver<'_>, batch: &mut Batch, items: &[RawItem]) {
    for item in items {
        batch.absorb(resolver.resolve(item));
    }
}

/// Retries only transport failures. Returns the number of attempts made.
async fn fetch_with_retry<F: Feed>(
    feed: &F,
    location: Location,
    date: NaiveDate,
    options: &RunOptions,
) -> (u32, Result<Vec<RawItem>, FeedError>) {
    let mut attempts = 0;

    loop {
        attempts += 1;

        match feed.fetch(location, date).await {
            Err(e @ FeedError::Unavailable { .. }) if attempts <= options.retries => {
                warn!(%location, %date, attempts, error = %e, "Retrying");
                sleep(options.retry_delay).await;
            }
            result => return (attempts, result),
        }
    }
}

fn progress_bar(len: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    ) {
        pb.set_style(style.progress_chars("=> "));
    }

    pb
}
