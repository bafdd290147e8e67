//! Cross-tabulation of stop-and-search records into cached statistics.
//!
//! Every combination of observed month, age range and search type is a bucket.
//! Buckets with no records are never emitted. Output is sorted by month, then
//! age range (null first), then type, so the same input always produces the
//! same rows.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Instant;

use tracing::info;

use stopsearch_common::{AgeRange, FrequencyMap, SearchType, StatisticRecord, StopSearchRecord};

type BucketKey<'a> = (&'a str, Option<&'a AgeRange>, &'a SearchType);

/// Running totals for one bucket.
#[derive(Default)]
struct Accumulator<'a> {
    total_searches: u64,
    arrests: u64,
    days: HashSet<&'a str>,
    genders: FrequencyMap,
    objects_of_search: FrequencyMap,
    outcomes: FrequencyMap,
}

impl<'a> Accumulator<'a> {
    fn add(&mut self, record: &'a StopSearchRecord) {
        self.total_searches += 1;
        self.days.insert(record.day_key());
        if record.is_arrest() {
            self.arrests += 1;
        }
        self.genders.record(record.gender.as_deref());
        self.objects_of_search.record(record.object_of_search.as_deref());
        self.outcomes.record(record.outcome.as_deref());
    }

    fn finish(self, key: BucketKey<'_>) -> StatisticRecord {
        let (month, age_range, search_type) = key;
        StatisticRecord {
            month: month.to_string(),
            age_range: age_range.cloned(),
            search_type: search_type.clone(),
            total_searches: self.total_searches,
            arrests: self.arrests,
            days_with_data: self.days.len() as u64,
            genders: self.genders,
            objects_of_search: self.objects_of_search,
            outcomes: self.outcomes,
        }
    }
}

/// Compute one statistic per non-empty (month, age range, type) combination.
pub fn calculate_statistics(records: &[StopSearchRecord]) -> Vec<StatisticRecord> {
    let started = Instant::now();

    let mut months: BTreeSet<&str> = BTreeSet::new();
    let mut age_ranges: BTreeSet<Option<&AgeRange>> = BTreeSet::new();
    let mut search_types: BTreeSet<&SearchType> = BTreeSet::new();
    let mut buckets: HashMap<BucketKey<'_>, Accumulator<'_>> = HashMap::new();

    // Single pass: collect the distinct filter values and fill each record's bucket.
    for record in records {
        let key = (
            record.month_key(),
            record.age_range.as_ref(),
            &record.search_type,
        );
        months.insert(key.0);
        age_ranges.insert(key.1);
        search_types.insert(key.2);
        buckets.entry(key).or_default().add(record);
    }

    let combinations = months.len() * age_ranges.len() * search_types.len();
    let mut statistics = Vec::with_capacity(buckets.len());

    for &month in &months {
        for &age_range in &age_ranges {
            for &search_type in &search_types {
                let key = (month, age_range, search_type);
                if let Some(acc) = buckets.remove(&key) {
                    statistics.push(acc.finish(key));
                }
            }
        }
    }

    info!(
        records = records.len(),
        combinations,
        statistics = statistics.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Calculated statistics"
    );

    statistics
}
