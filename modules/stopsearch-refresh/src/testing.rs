// Test mocks for the refresh pipeline.
//
// Two mocks matching the two trait boundaries:
// - MockSource (StopSearchSource): HashMap-based date to records
// - InMemoryCacheStore (CacheStore): stateful in-memory cache with failure injection
//
// Plus helpers for constructing AvailableDate, RawStopSearch and StatisticRecord.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use police_client::{AvailableDate, RawStopSearch};
use stopsearch_common::{
    AgeRange, FrequencyMap, MetaRecord, SearchType, StatisticFilter, StatisticRecord,
};

use crate::source::StopSearchSource;
use crate::store::{CacheStore, ReplaceResult};

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

/// HashMap-based source. Returns `Err` for unregistered dates.
/// Builder pattern: `.with_dates()`, `.on_stops()`, `.failing_dates()`.
pub struct MockSource {
    dates: Option<Vec<AvailableDate>>,
    stops: HashMap<String, Vec<RawStopSearch>>,
    requested: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            dates: Some(Vec::new()),
            stops: HashMap::new(),
            requested: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_dates(mut self, dates: Vec<AvailableDate>) -> Self {
        self.dates = Some(dates);
        self
    }

    /// Date discovery fails as if the API were unreachable.
    pub fn failing_dates(mut self) -> Self {
        self.dates = None;
        self
    }

    pub fn on_stops(mut self, date: &str, records: Vec<RawStopSearch>) -> Self {
        self.stops.insert(date.to_string(), records);
        self
    }

    /// Dates requested via `stops`, in request order.
    pub fn requested_dates(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }

    /// Highest number of `stops` calls observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StopSearchSource for MockSource {
    async fn available_dates(&self) -> Result<Vec<AvailableDate>> {
        match &self.dates {
            Some(dates) => Ok(dates.clone()),
            None => bail!("MockSource: available dates unavailable"),
        }
    }

    async fn stops(&self, _force: &str, date: &str) -> Result<Vec<RawStopSearch>> {
        self.requested.lock().unwrap().push(date.to_string());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        // Let sibling requests in the same batch start before this one finishes.
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.stops
            .get(date)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("MockSource: no records registered for {date}"))
    }
}

// ---------------------------------------------------------------------------
// InMemoryCacheStore
// ---------------------------------------------------------------------------

/// Stateful in-memory cache. An injected short insert is rolled back like the
/// Postgres transaction: previous rows survive and the result reports zero.
pub struct InMemoryCacheStore {
    statistics: Mutex<Vec<StatisticRecord>>,
    meta: Mutex<Option<MetaRecord>>,
    fail_meta_lookups: bool,
    fail_replace: bool,
    fail_meta_upsert: bool,
    insert_limit: Option<usize>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self {
            statistics: Mutex::new(Vec::new()),
            meta: Mutex::new(None),
            fail_meta_lookups: false,
            fail_replace: false,
            fail_meta_upsert: false,
            insert_limit: None,
        }
    }

    pub fn with_meta(self, meta: MetaRecord) -> Self {
        *self.meta.lock().unwrap() = Some(meta);
        self
    }

    pub fn with_statistics(self, statistics: Vec<StatisticRecord>) -> Self {
        *self.statistics.lock().unwrap() = statistics;
        self
    }

    pub fn failing_meta_lookups(mut self) -> Self {
        self.fail_meta_lookups = true;
        self
    }

    pub fn failing_replace(mut self) -> Self {
        self.fail_replace = true;
        self
    }

    pub fn failing_meta_upsert(mut self) -> Self {
        self.fail_meta_upsert = true;
        self
    }

    /// Insert at most `limit` rows per replace.
    pub fn with_insert_limit(mut self, limit: usize) -> Self {
        self.insert_limit = Some(limit);
        self
    }

    pub fn meta(&self) -> Option<MetaRecord> {
        self.meta.lock().unwrap().clone()
    }

    /// Stored statistics in storage order.
    pub fn statistics_snapshot(&self) -> Vec<StatisticRecord> {
        self.statistics.lock().unwrap().clone()
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn meta_updated_since(&self, cutoff: DateTime<Utc>) -> Result<Option<MetaRecord>> {
        if self.fail_meta_lookups {
            bail!("InMemoryCacheStore: meta lookup failed");
        }
        Ok(self
            .meta()
            .filter(|m| m.last_updated.is_some_and(|t| t >= cutoff)))
    }

    async fn any_meta(&self) -> Result<Option<MetaRecord>> {
        if self.fail_meta_lookups {
            bail!("InMemoryCacheStore: meta lookup failed");
        }
        Ok(self.meta())
    }

    async fn replace_statistics(&self, statistics: &[StatisticRecord]) -> Result<ReplaceResult> {
        if self.fail_replace {
            bail!("InMemoryCacheStore: replace failed");
        }
        let limit = self.insert_limit.unwrap_or(statistics.len());
        if limit < statistics.len() {
            return Ok(ReplaceResult::rolled_back());
        }

        let mut stored = self.statistics.lock().unwrap();
        let deleted = stored.len() as u64;
        *stored = statistics.to_vec();

        Ok(ReplaceResult::committed(deleted, stored.len() as u64))
    }

    async fn upsert_meta(&self, meta: &MetaRecord) -> Result<()> {
        if self.fail_meta_upsert {
            bail!("InMemoryCacheStore: meta upsert failed");
        }
        *self.meta.lock().unwrap() = Some(meta.clone());
        Ok(())
    }

    async fn statistics(&self, filter: &StatisticFilter) -> Result<Vec<StatisticRecord>> {
        let mut matching: Vec<StatisticRecord> = self
            .statistics
            .lock()
            .unwrap()
            .iter()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(matching)
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn available_date(date: &str, forces: &[&str]) -> AvailableDate {
    AvailableDate {
        date: date.to_string(),
        stop_and_search: Some(forces.iter().map(|f| f.to_string()).collect()),
    }
}

/// A person search of an 18-24 year old male at `datetime`, no outcome.
pub fn raw_stop(datetime: &str) -> RawStopSearch {
    RawStopSearch {
        age_range: Some("18-24".to_string()),
        gender: Some("Male".to_string()),
        datetime: datetime.to_string(),
        object_of_search: Some("Controlled drugs".to_string()),
        search_type: "Person search".to_string(),
        involved_person: true,
        ..Default::default()
    }
}

/// A person search statistic for 18-24s in `month` with `total` searches.
pub fn statistic(month: &str, total: u64) -> StatisticRecord {
    let genders: FrequencyMap = [("Male".to_string(), total)].into_iter().collect();
    let outcomes: FrequencyMap = [("null".to_string(), total)].into_iter().collect();
    StatisticRecord {
        month: month.to_string(),
        age_range: Some(AgeRange::Age18To24),
        search_type: SearchType::Person,
        total_searches: total,
        arrests: 0,
        days_with_data: 1,
        genders,
        objects_of_search: outcomes.clone(),
        outcomes,
    }
}
