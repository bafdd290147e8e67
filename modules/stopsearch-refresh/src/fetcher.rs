use std::time::Instant;

use futures::future::join_all;
use tracing::{info, warn};

use police_client::{AvailableDate, RawStopSearch};
use stopsearch_common::Config;

use crate::source::StopSearchSource;

/// What to fetch and how hard to hit the API while doing it.
#[derive(Debug, Clone)]
pub struct FetchPlan {
    pub force: String,
    /// Number of discovered months to fetch, newest first as published.
    pub date_window: usize,
    /// Months fetched concurrently per batch.
    pub batch_size: usize,
}

impl From<&Config> for FetchPlan {
    fn from(config: &Config) -> Self {
        Self {
            force: config.force.clone(),
            date_window: config.date_window,
            batch_size: config.batch_size,
        }
    }
}

/// Records gathered by one fetch plus per-date accounting.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub records: Vec<RawStopSearch>,
    pub dates_discovered: usize,
    pub dates_fetched: usize,
    pub dates_failed: usize,
}

/// Months covering `force`, in the order the API published them.
pub fn relevant_dates(available: &[AvailableDate], force: &str) -> Vec<String> {
    available
        .iter()
        .filter(|entry| entry.covers_force(force))
        .map(|entry| entry.date.clone())
        .collect()
}

/// Discover the months with data for `force`. A failed lookup yields no dates;
/// the refresh then proceeds with zero records instead of aborting.
pub async fn discover_dates<S>(source: &S, force: &str) -> Vec<String>
where
    S: StopSearchSource + ?Sized,
{
    match source.available_dates().await {
        Ok(available) => {
            let dates = relevant_dates(&available, force);
            info!(force, count = dates.len(), dates = ?dates, "Discovered available dates");
            dates
        }
        Err(e) => {
            warn!(force, error = %e, "Failed to fetch available dates");
            Vec::new()
        }
    }
}

/// Fetch every record in the plan's date window.
///
/// Dates are fetched in chunks of `batch_size`: all requests in a chunk run
/// concurrently and the chunk is joined before the next one starts. A failing
/// date contributes no records and never aborts the batch. Records keep
/// discovery order.
pub async fn fetch_stop_searches<S>(source: &S, plan: &FetchPlan) -> FetchReport
where
    S: StopSearchSource + ?Sized,
{
    let started = Instant::now();
    let mut report = FetchReport::default();

    let dates = discover_dates(source, &plan.force).await;
    report.dates_discovered = dates.len();

    let window: Vec<String> = dates.into_iter().take(plan.date_window).collect();
    let batch_size = plan.batch_size.max(1);
    info!(dates = window.len(), batch_size, "Fetching stop and search records");

    for (batch, chunk) in window.chunks(batch_size).enumerate() {
        info!(batch, size = chunk.len(), "Executing batch");

        let results = join_all(chunk.iter().map(|date| async move {
            (date, source.stops(&plan.force, date).await)
        }))
        .await;

        for (date, result) in results {
            match result {
                Ok(records) => {
                    report.dates_fetched += 1;
                    report.records.extend(records);
                }
                Err(e) => {
                    warn!(date = date.as_str(), force = plan.force.as_str(), error = %e, "Failed to fetch records for date");
                    report.dates_failed += 1;
                }
            }
        }
    }

    info!(
        records = report.records.len(),
        dates_fetched = report.dates_fetched,
        dates_failed = report.dates_failed,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Fetched records from API"
    );

    report
}
