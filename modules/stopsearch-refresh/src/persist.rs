use chrono::{DateTime, Utc};
use tracing::{info, warn};

use stopsearch_common::{MetaRecord, StatisticRecord};

use crate::store::CacheStore;

/// What a persist attempt did to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistReport {
    pub deleted: u64,
    pub inserted: u64,
    /// Data fully replaced and the meta record flagged fresh.
    pub updated: bool,
}

/// Replace the cached statistics, then flag the meta record fresh.
///
/// The meta record is only written after every statistic was inserted. If
/// the replace fails or inserts a different number of rows, the meta record
/// is left exactly as it was. An empty statistic set is never persisted: a
/// refresh that fetched nothing keeps the previous cache and its meta record.
pub async fn persist<S>(store: &S, statistics: &[StatisticRecord], now: DateTime<Utc>) -> PersistReport
where
    S: CacheStore + ?Sized,
{
    let mut report = PersistReport::default();

    if statistics.is_empty() {
        warn!("No statistics computed, keeping existing cache");
        return report;
    }

    let rolled_back = match store.replace_statistics(statistics).await {
        Ok(result) => {
            info!(deleted = result.deleted, inserted = result.inserted, "Replaced statistics");
            report.deleted = result.deleted;
            report.inserted = result.inserted;
            result.rolled_back
        }
        Err(e) => {
            warn!(error = %e, "Failed to replace cached statistics");
            return report;
        }
    };

    if rolled_back || report.inserted != statistics.len() as u64 {
        warn!(
            expected = statistics.len(),
            inserted = report.inserted,
            rolled_back,
            "Inserted count does not match computed statistics, meta left untouched"
        );
        return report;
    }

    let meta = MetaRecord::refreshed_at(now);
    match store.upsert_meta(&meta).await {
        Ok(()) => {
            info!(last_updated = %now, "Updated meta record");
            report.updated = true;
        }
        Err(e) => warn!(error = %e, "Failed to update meta record"),
    }

    report
}
