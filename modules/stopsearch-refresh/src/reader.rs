use anyhow::Result;
use chrono::Local;

use stopsearch_common::{CacheStatus, StatisticFilter, StatisticSummary};

use crate::store::CacheStore;
use crate::validator::validate_cache;

/// Cached statistics as served to readers, with the freshness they were read at.
#[derive(Debug, Clone)]
pub struct CachedStatistics {
    pub status: CacheStatus,
    pub statistics: Vec<StatisticSummary>,
}

impl CachedStatistics {
    /// Read the statistics matching `filter`. Stale data is still returned;
    /// `status` tells the caller how old it is.
    pub async fn load<S>(store: &S, filter: &StatisticFilter, staleness_days: i64) -> Result<Self>
    where
        S: CacheStore + ?Sized,
    {
        let status = validate_cache(store, &Local::now(), staleness_days)
            .await
            .status();
        let statistics = store
            .statistics(filter)
            .await?
            .iter()
            .map(StatisticSummary::from)
            .collect();

        Ok(Self { status, statistics })
    }
}
