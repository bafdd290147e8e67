use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use chrono::{Local, Utc};
use tracing::{info, warn};

use police_client::PoliceClient;
use stopsearch_common::config::DEFAULT_STALENESS_DAYS;
use stopsearch_common::Config;

use crate::aggregate::calculate_statistics;
use crate::fetcher::{fetch_stop_searches, FetchPlan};
use crate::narrow::narrow_all;
use crate::persist::persist;
use crate::source::StopSearchSource;
use crate::store::{CacheStore, PgCacheStore};
use crate::types::{RefreshOutcome, RefreshStats};
use crate::validator::validate_cache;

/// Drives one refresh cycle: validate, then fetch, narrow, aggregate and
/// persist if the cache is stale. Every step degrades instead of failing, so
/// `run` always produces an outcome.
pub struct Refresher<'a> {
    store: &'a dyn CacheStore,
    source: &'a dyn StopSearchSource,
    plan: FetchPlan,
    staleness_days: i64,
}

impl<'a> Refresher<'a> {
    pub fn new(
        store: &'a dyn CacheStore,
        source: &'a dyn StopSearchSource,
        plan: FetchPlan,
    ) -> Self {
        Self {
            store,
            source,
            plan,
            staleness_days: DEFAULT_STALENESS_DAYS,
        }
    }

    pub fn from_config(
        store: &'a dyn CacheStore,
        source: &'a dyn StopSearchSource,
        config: &Config,
    ) -> Self {
        Self::new(store, source, FetchPlan::from(config)).with_staleness_days(config.staleness_days)
    }

    pub fn with_staleness_days(mut self, days: i64) -> Self {
        self.staleness_days = days;
        self
    }

    pub async fn run(&self) -> RefreshOutcome {
        info!("Running the refresh...");

        let state = validate_cache(self.store, &Local::now(), self.staleness_days).await;
        if !state.needs_refresh() {
            info!("Cache is fresh, skipping refresh");
            return RefreshOutcome::Fresh(state.status());
        }

        self.fetch_and_persist().await
    }

    async fn fetch_and_persist(&self) -> RefreshOutcome {
        let started = Instant::now();
        let mut stats = RefreshStats::default();

        info!("Fetching fresh data");
        let report = fetch_stop_searches(self.source, &self.plan).await;
        stats.dates_discovered = report.dates_discovered as u64;
        stats.dates_fetched = report.dates_fetched as u64;
        stats.dates_failed = report.dates_failed as u64;
        stats.records_fetched = report.records.len() as u64;

        let records = narrow_all(report.records);
        stats.unrecognized_values = records
            .iter()
            .filter(|r| r.has_unrecognized_values())
            .count() as u64;
        if stats.unrecognized_values > 0 {
            warn!(
                count = stats.unrecognized_values,
                "Records with unrecognized age range or search type"
            );
        }

        let statistics = calculate_statistics(&records);
        stats.statistics_computed = statistics.len() as u64;

        let persisted = persist(self.store, &statistics, Utc::now()).await;
        stats.statistics_inserted = persisted.inserted;
        stats.elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            elapsed_ms = stats.elapsed_ms,
            updated = persisted.updated,
            "Fetched and persisted statistics"
        );

        if persisted.updated {
            RefreshOutcome::Refreshed(stats)
        } else {
            RefreshOutcome::NotUpdated(stats)
        }
    }
}

/// Full cycle against the real collaborators: connect to Postgres, migrate,
/// refresh under the configured deadline, disconnect. Errors here are fatal.
pub async fn refresh_cache(config: &Config) -> Result<RefreshOutcome> {
    let store = PgCacheStore::connect(&config.database_url).await?;
    info!("Connected to Postgres");

    let result = run_cycle(&store, config).await;

    store.close().await;
    info!("Disconnected from Postgres");
    result
}

async fn run_cycle(store: &PgCacheStore, config: &Config) -> Result<RefreshOutcome> {
    store.migrate().await?;

    let client = PoliceClient::new(&config.police_api_url, config.request_timeout)
        .context("Failed to build police API client")?;
    let refresher = Refresher::from_config(store, &client, config);

    tokio::time::timeout(config.refresh_deadline, refresher.run())
        .await
        .map_err(|_| {
            anyhow!(
                "Refresh did not finish within {}s",
                config.refresh_deadline.as_secs()
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{available_date, raw_stop, statistic, InMemoryCacheStore, MockSource};
    use chrono::Duration;
    use stopsearch_common::{MetaRecord, StatisticFilter, META_ID};

    fn plan() -> FetchPlan {
        FetchPlan {
            force: "metropolitan".into(),
            date_window: 7,
            batch_size: 10,
        }
    }

    fn stale_meta() -> MetaRecord {
        MetaRecord {
            id: META_ID.into(),
            last_updated: Some(Utc::now() - Duration::days(10)),
            has_data: true,
        }
    }

    #[tokio::test]
    async fn fresh_cache_skips_fetching() {
        let store = InMemoryCacheStore::new().with_meta(MetaRecord::refreshed_at(Utc::now()));
        let source = MockSource::new().with_dates(vec![available_date("2024-08", &["metropolitan"])]);

        let outcome = Refresher::new(&store, &source, plan()).run().await;

        assert!(matches!(outcome, RefreshOutcome::Fresh(status) if !status.stale && status.has_data));
        assert!(source.requested_dates().is_empty());
    }

    #[tokio::test]
    async fn stale_cache_is_refreshed() {
        let store = InMemoryCacheStore::new()
            .with_meta(stale_meta())
            .with_statistics(vec![statistic("2023-01", 9)]);
        let mut arrest = raw_stop("2024-08-02T09:00:00+00:00");
        arrest.outcome = Some("Arrest".into());
        let source = MockSource::new()
            .with_dates(vec![
                available_date("2024-08", &["metropolitan"]),
                available_date("2024-07", &["kent"]),
            ])
            .on_stops(
                "2024-08",
                vec![
                    raw_stop("2024-08-01T10:00:00+00:00"),
                    raw_stop("2024-08-01T18:30:00+00:00"),
                    arrest,
                ],
            );

        let outcome = Refresher::new(&store, &source, plan()).run().await;

        let RefreshOutcome::Refreshed(stats) = outcome else {
            panic!("expected a refresh, got {outcome:?}");
        };
        assert_eq!(stats.dates_discovered, 1);
        assert_eq!(stats.dates_fetched, 1);
        assert_eq!(stats.records_fetched, 3);
        assert_eq!(stats.statistics_computed, 1);
        assert_eq!(stats.statistics_inserted, 1);
        assert_eq!(source.requested_dates(), vec!["2024-08".to_string()]);

        let stored = store.statistics(&StatisticFilter::default()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].month, "2024-08");
        assert_eq!(stored[0].total_searches, 3);
        assert_eq!(stored[0].arrests, 1);
        assert_eq!(stored[0].days_with_data, 2);

        let meta = store.meta().unwrap();
        assert!(meta.has_data);
        assert!(meta.last_updated.unwrap() > Utc::now() - Duration::minutes(1));
    }

    #[tokio::test]
    async fn missing_meta_triggers_refresh() {
        let store = InMemoryCacheStore::new();
        let source = MockSource::new()
            .with_dates(vec![available_date("2024-08", &["metropolitan"])])
            .on_stops("2024-08", vec![raw_stop("2024-08-01T10:00:00+00:00")]);

        let outcome = Refresher::new(&store, &source, plan()).run().await;

        assert!(outcome.is_updated());
        assert!(store.meta().is_some());
    }

    #[tokio::test]
    async fn meta_lookup_failure_is_treated_as_stale() {
        let store = InMemoryCacheStore::new().failing_meta_lookups();
        let source = MockSource::new()
            .with_dates(vec![available_date("2024-08", &["metropolitan"])])
            .on_stops("2024-08", vec![raw_stop("2024-08-01T10:00:00+00:00")]);

        let outcome = Refresher::new(&store, &source, plan()).run().await;

        assert!(outcome.is_updated());
        assert_eq!(source.requested_dates().len(), 1);
    }

    #[tokio::test]
    async fn unreachable_api_keeps_previous_cache() {
        let original = stale_meta();
        let previous = vec![statistic("2023-01", 9)];
        let store = InMemoryCacheStore::new()
            .with_meta(original.clone())
            .with_statistics(previous.clone());
        let source = MockSource::new().failing_dates();

        let outcome = Refresher::new(&store, &source, plan()).run().await;

        let RefreshOutcome::NotUpdated(stats) = outcome else {
            panic!("expected no update, got {outcome:?}");
        };
        assert_eq!(stats.records_fetched, 0);
        assert_eq!(stats.statistics_computed, 0);
        assert_eq!(store.meta(), Some(original));
        assert_eq!(store.statistics_snapshot(), previous);
    }

    #[tokio::test]
    async fn failed_dates_do_not_block_the_rest() {
        let store = InMemoryCacheStore::new();
        let source = MockSource::new()
            .with_dates(vec![
                available_date("2024-08", &["metropolitan"]),
                available_date("2024-07", &["metropolitan"]),
            ])
            .on_stops("2024-07", vec![raw_stop("2024-07-03T10:00:00+00:00")]);

        let outcome = Refresher::new(&store, &source, plan()).run().await;

        let RefreshOutcome::Refreshed(stats) = outcome else {
            panic!("expected a refresh, got {outcome:?}");
        };
        assert_eq!(stats.dates_fetched, 1);
        assert_eq!(stats.dates_failed, 1);
        assert_eq!(store.statistics_snapshot()[0].month, "2024-07");
    }

    #[tokio::test]
    async fn unrecognized_values_are_counted() {
        let store = InMemoryCacheStore::new();
        let mut odd = raw_stop("2024-08-01T10:00:00+00:00");
        odd.age_range = Some("over 90".into());
        let source = MockSource::new()
            .with_dates(vec![available_date("2024-08", &["metropolitan"])])
            .on_stops("2024-08", vec![odd, raw_stop("2024-08-02T10:00:00+00:00")]);

        let outcome = Refresher::new(&store, &source, plan()).run().await;

        let RefreshOutcome::Refreshed(stats) = outcome else {
            panic!("expected a refresh, got {outcome:?}");
        };
        assert_eq!(stats.unrecognized_values, 1);
        assert_eq!(stats.statistics_computed, 2);
    }

    #[tokio::test]
    async fn rolled_back_insert_reports_nothing_inserted() {
        let store = InMemoryCacheStore::new()
            .with_meta(stale_meta())
            .with_insert_limit(0);
        let source = MockSource::new()
            .with_dates(vec![available_date("2024-08", &["metropolitan"])])
            .on_stops("2024-08", vec![raw_stop("2024-08-01T10:00:00+00:00")]);

        let outcome = Refresher::new(&store, &source, plan()).run().await;

        let RefreshOutcome::NotUpdated(stats) = outcome else {
            panic!("expected no update, got {outcome:?}");
        };
        assert_eq!(stats.statistics_computed, 1);
        assert_eq!(stats.statistics_inserted, 0);
    }

    #[test]
    fn default_window_matches_config_default() {
        let store = InMemoryCacheStore::new();
        let source = MockSource::new();
        let refresher = Refresher::new(&store, &source, plan());
        assert_eq!(refresher.staleness_days, DEFAULT_STALENESS_DAYS);
        assert_eq!(DEFAULT_STALENESS_DAYS, 7);
    }
}
