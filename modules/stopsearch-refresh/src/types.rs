use std::fmt;

use stopsearch_common::CacheStatus;

/// Stats from a refresh run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshStats {
    pub dates_discovered: u64,
    pub dates_fetched: u64,
    pub dates_failed: u64,
    pub records_fetched: u64,
    pub unrecognized_values: u64,
    pub statistics_computed: u64,
    pub statistics_inserted: u64,
    pub elapsed_ms: u64,
}

impl fmt::Display for RefreshStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dates_discovered={} dates_fetched={} dates_failed={} records_fetched={} unrecognized_values={} statistics_computed={} statistics_inserted={} elapsed_ms={}",
            self.dates_discovered,
            self.dates_fetched,
            self.dates_failed,
            self.records_fetched,
            self.unrecognized_values,
            self.statistics_computed,
            self.statistics_inserted,
            self.elapsed_ms,
        )
    }
}

/// How a refresh cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The cache was fresh; nothing was fetched.
    Fresh(CacheStatus),
    /// Statistics replaced and meta record flagged.
    Refreshed(RefreshStats),
    /// The pipeline ran but the cache was not (fully) replaced.
    NotUpdated(RefreshStats),
}

impl RefreshOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Refreshed(_))
    }
}

impl fmt::Display for RefreshOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fresh(status) => write!(f, "cache fresh, skipped ({status})"),
            Self::Refreshed(stats) => write!(f, "cache refreshed ({stats})"),
            Self::NotUpdated(stats) => write!(f, "cache not updated ({stats})"),
        }
    }
}
