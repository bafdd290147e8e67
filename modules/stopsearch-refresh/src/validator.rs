use chrono::{DateTime, Days, NaiveTime, TimeZone, Utc};
use tracing::{info, warn};

use stopsearch_common::{CacheStatus, MetaRecord};

use crate::store::CacheStore;

/// What the meta record says about the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheState {
    /// Refreshed on or after the cutoff.
    Fresh(MetaRecord),
    /// A meta record exists but predates the cutoff.
    Stale(MetaRecord),
    /// No meta record: the cache has never been built.
    Missing,
    /// The store could not be queried.
    LookupFailed(String),
}

impl CacheState {
    pub fn needs_refresh(&self) -> bool {
        !matches!(self, Self::Fresh(_))
    }

    /// Collapse to the three-field status. `Missing` and `LookupFailed` both
    /// report stale with no data.
    pub fn status(&self) -> CacheStatus {
        match self {
            Self::Fresh(meta) => CacheStatus {
                stale: false,
                has_data: meta.has_data,
                last_updated: meta.last_updated,
            },
            Self::Stale(meta) => CacheStatus {
                stale: true,
                has_data: meta.has_data,
                last_updated: meta.last_updated,
            },
            Self::Missing | Self::LookupFailed(_) => CacheStatus::unknown(),
        }
    }
}

/// Local midnight at the start of the calendar day `days` days before `now`.
/// A window reaching past the earliest representable date cuts off nothing.
pub fn staleness_cutoff<Tz: TimeZone>(now: &DateTime<Tz>, days: i64) -> DateTime<Utc> {
    let back = Days::new(u64::try_from(days).unwrap_or(0));
    let Some(day) = now.date_naive().checked_sub_days(back) else {
        return DateTime::<Utc>::MIN_UTC;
    };
    let midnight = day.and_time(NaiveTime::MIN);
    match now.timezone().from_local_datetime(&midnight).earliest() {
        Some(local) => local.with_timezone(&Utc),
        // Midnight skipped by a DST transition; fall back to the same wall time in UTC.
        None => midnight.and_utc(),
    }
}

/// Two-step lookup: a meta record newer than `cutoff`, otherwise any meta record.
pub async fn inspect_cache<S>(store: &S, cutoff: DateTime<Utc>) -> CacheState
where
    S: CacheStore + ?Sized,
{
    match store.meta_updated_since(cutoff).await {
        Ok(Some(meta)) => return CacheState::Fresh(meta),
        Ok(None) => {}
        Err(e) => {
            warn!(error = %e, "Error checking last updated");
            return CacheState::LookupFailed(e.to_string());
        }
    }

    match store.any_meta().await {
        Ok(Some(meta)) => CacheState::Stale(meta),
        Ok(None) => CacheState::Missing,
        Err(e) => {
            warn!(error = %e, "Error reading meta record");
            CacheState::LookupFailed(e.to_string())
        }
    }
}

/// Decide whether the cache must be rebuilt. Read-only; any failure to
/// establish freshness reports stale.
pub async fn validate_cache<S, Tz>(store: &S, now: &DateTime<Tz>, staleness_days: i64) -> CacheState
where
    S: CacheStore + ?Sized,
    Tz: TimeZone,
{
    let cutoff = staleness_cutoff(now, staleness_days);
    let state = inspect_cache(store, cutoff).await;
    let status = state.status();

    match &state {
        CacheState::Missing => info!(%cutoff, "No meta record, cache has never been built"),
        CacheState::LookupFailed(reason) => warn!(%cutoff, reason = reason.as_str(), "Cache freshness unknown, treating as stale"),
        _ => info!(%cutoff, %status, "Validated cache"),
    }

    state
}
