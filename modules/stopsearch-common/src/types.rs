use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed key of the singleton meta record.
pub const META_ID: &str = "stop-and-search-cache";

/// Bucket used in frequency maps for absent values.
pub const NULL_KEY: &str = "null";

// --- Categorical filters ---

/// Age band reported for the person searched.
///
/// Values outside the published bands are kept verbatim in `Unrecognized`
/// rather than rejected; they are a data-quality signal, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgeRange {
    Under10,
    Age10To17,
    Age18To24,
    Age25To34,
    Over34,
    Unrecognized(String),
}

impl AgeRange {
    pub const ALLOWED: [AgeRange; 5] = [
        AgeRange::Under10,
        AgeRange::Age10To17,
        AgeRange::Age18To24,
        AgeRange::Age25To34,
        AgeRange::Over34,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::Under10 => "under 10",
            Self::Age10To17 => "10-17",
            Self::Age18To24 => "18-24",
            Self::Age25To34 => "25-34",
            Self::Over34 => "over 34",
            Self::Unrecognized(raw) => raw,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

impl From<String> for AgeRange {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "under 10" => Self::Under10,
            "10-17" => Self::Age10To17,
            "18-24" => Self::Age18To24,
            "25-34" => Self::Age25To34,
            "over 34" => Self::Over34,
            _ => Self::Unrecognized(raw),
        }
    }
}

impl From<&str> for AgeRange {
    fn from(raw: &str) -> Self {
        Self::from(raw.to_string())
    }
}

impl From<AgeRange> for String {
    fn from(age: AgeRange) -> Self {
        match age {
            AgeRange::Unrecognized(raw) => raw,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for AgeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of search carried out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SearchType {
    Person,
    Vehicle,
    PersonAndVehicle,
    Unrecognized(String),
}

impl SearchType {
    pub const ALLOWED: [SearchType; 3] = [
        SearchType::Person,
        SearchType::Vehicle,
        SearchType::PersonAndVehicle,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::Person => "Person search",
            Self::Vehicle => "Vehicle search",
            Self::PersonAndVehicle => "Person and Vehicle search",
            Self::Unrecognized(raw) => raw,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

impl From<String> for SearchType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "Person search" => Self::Person,
            "Vehicle search" => Self::Vehicle,
            "Person and Vehicle search" => Self::PersonAndVehicle,
            _ => Self::Unrecognized(raw),
        }
    }
}

impl From<&str> for SearchType {
    fn from(raw: &str) -> Self {
        Self::from(raw.to_string())
    }
}

impl From<SearchType> for String {
    fn from(search_type: SearchType) -> Self {
        match search_type {
            SearchType::Unrecognized(raw) => raw,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Narrowed record ---

/// The subset of a stop-and-search event that aggregation needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopSearchRecord {
    pub age_range: Option<AgeRange>,
    pub gender: Option<String>,
    pub datetime: String,
    pub outcome: Option<String>,
    pub object_of_search: Option<String>,
    #[serde(rename = "type")]
    pub search_type: SearchType,
}

impl StopSearchRecord {
    /// `YYYY-MM` prefix of the timestamp.
    pub fn month_key(&self) -> &str {
        prefix(&self.datetime, 7)
    }

    /// `YYYY-MM-DD` prefix of the timestamp.
    pub fn day_key(&self) -> &str {
        prefix(&self.datetime, 10)
    }

    /// Outcome is an arrest, compared case-insensitively.
    pub fn is_arrest(&self) -> bool {
        self.outcome
            .as_deref()
            .is_some_and(|o| o.eq_ignore_ascii_case("arrest"))
    }

    /// True when the age range or type falls outside the published sets.
    pub fn has_unrecognized_values(&self) -> bool {
        let age_ok = self.age_range.as_ref().map_or(true, AgeRange::is_recognized);
        !age_ok || !self.search_type.is_recognized()
    }
}

fn prefix(s: &str, len: usize) -> &str {
    s.get(..len).unwrap_or(s)
}

// --- Frequency maps ---

/// Occurrence counts keyed by observed value, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrequencyMap(BTreeMap<String, u64>);

impl FrequencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one occurrence of `value`, bucketing `None` under [`NULL_KEY`].
    pub fn record(&mut self, value: Option<&str>) {
        let key = value.unwrap_or(NULL_KEY);
        match self.0.get_mut(key) {
            Some(count) => *count += 1,
            None => {
                self.0.insert(key.to_string(), 1);
            }
        }
    }

    pub fn get(&self, key: &str) -> u64 {
        self.0.get(key).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Highest-count entry. Ties resolve to the smallest key.
    pub fn most_common(&self) -> Option<(&str, u64)> {
        self.iter().fold(None, |best, (key, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((key, count)),
        })
    }
}

impl FromIterator<(String, u64)> for FrequencyMap {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// --- Cached statistics ---

/// Aggregation bucket: one (month, age range, type) combination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatisticKey {
    pub month: String,
    pub age_range: Option<AgeRange>,
    pub search_type: SearchType,
}

/// Precomputed statistics for one combination of filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticRecord {
    pub month: String,
    pub age_range: Option<AgeRange>,
    #[serde(rename = "type")]
    pub search_type: SearchType,
    pub total_searches: u64,
    pub arrests: u64,
    pub days_with_data: u64,
    pub genders: FrequencyMap,
    pub objects_of_search: FrequencyMap,
    pub outcomes: FrequencyMap,
}

impl StatisticRecord {
    pub fn key(&self) -> StatisticKey {
        StatisticKey {
            month: self.month.clone(),
            age_range: self.age_range.clone(),
            search_type: self.search_type.clone(),
        }
    }
}

/// Optional filters over cached statistics. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatisticFilter {
    pub month: Option<String>,
    pub age_range: Option<AgeRange>,
    pub search_type: Option<SearchType>,
}

impl StatisticFilter {
    pub fn matches(&self, record: &StatisticRecord) -> bool {
        self.month.as_ref().map_or(true, |m| *m == record.month)
            && self
                .age_range
                .as_ref()
                .map_or(true, |a| record.age_range.as_ref() == Some(a))
            && self
                .search_type
                .as_ref()
                .map_or(true, |t| *t == record.search_type)
    }
}

// --- Cache metadata ---

/// Singleton record tracking the last successful refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaRecord {
    pub id: String,
    pub last_updated: Option<DateTime<Utc>>,
    pub has_data: bool,
}

impl MetaRecord {
    /// Meta record written after a complete data replace.
    pub fn refreshed_at(at: DateTime<Utc>) -> Self {
        Self {
            id: META_ID.to_string(),
            last_updated: Some(at),
            has_data: true,
        }
    }
}

/// Freshness of the cache as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub stale: bool,
    pub has_data: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

impl CacheStatus {
    /// Status used whenever freshness cannot be established.
    pub fn unknown() -> Self {
        Self {
            stale: true,
            has_data: false,
            last_updated: None,
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last = self
            .last_updated
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        write!(
            f,
            "stale={} has_data={} last_updated={}",
            self.stale, self.has_data, last
        )
    }
}
