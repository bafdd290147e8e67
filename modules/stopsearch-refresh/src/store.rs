// CacheStore: the document store behind one trait.
//
// PgCacheStore is the production implementation over Postgres. The refresh
// pipeline and the read path only ever see the trait, so tests run against
// InMemoryCacheStore with no database.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{info, warn};

use stopsearch_common::{
    AgeRange, FrequencyMap, MetaRecord, SearchType, StatisticFilter, StatisticRecord,
};

/// Rows per INSERT statement. Nine binds per row keeps each statement well
/// under the Postgres limit of 65535 parameters.
const INSERT_CHUNK_SIZE: usize = 1000;

/// Result of replacing the cached statistics. Counts are what is stored after
/// the replace; a rolled back replace reports zero for both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceResult {
    pub deleted: u64,
    pub inserted: u64,
    pub rolled_back: bool,
}

impl ReplaceResult {
    pub fn committed(deleted: u64, inserted: u64) -> Self {
        Self {
            deleted,
            inserted,
            rolled_back: false,
        }
    }

    pub fn rolled_back() -> Self {
        Self {
            rolled_back: true,
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Meta record whose `last_updated` is at or after `cutoff`, if any.
    async fn meta_updated_since(&self, cutoff: DateTime<Utc>) -> Result<Option<MetaRecord>>;

    /// Meta record regardless of age, if any.
    async fn any_meta(&self) -> Result<Option<MetaRecord>>;

    /// Delete every cached statistic and insert `statistics` in its place.
    async fn replace_statistics(&self, statistics: &[StatisticRecord]) -> Result<ReplaceResult>;

    /// Insert or overwrite the meta record keyed by `meta.id`.
    async fn upsert_meta(&self, meta: &MetaRecord) -> Result<()>;

    /// Cached statistics matching `filter`, sorted by month, age range, type.
    async fn statistics(&self, filter: &StatisticFilter) -> Result<Vec<StatisticRecord>>;
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

#[derive(Debug, sqlx::FromRow)]
struct MetaRow {
    id: String,
    last_updated: Option<DateTime<Utc>>,
    has_data: bool,
}

impl From<MetaRow> for MetaRecord {
    fn from(row: MetaRow) -> Self {
        Self {
            id: row.id,
            last_updated: row.last_updated,
            has_data: row.has_data,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StatisticRow {
    month: String,
    age_range: Option<String>,
    search_type: String,
    total_searches: i64,
    arrests: i64,
    days_with_data: i64,
    genders: Json<FrequencyMap>,
    objects_of_search: Json<FrequencyMap>,
    outcomes: Json<FrequencyMap>,
}

impl From<StatisticRow> for StatisticRecord {
    fn from(row: StatisticRow) -> Self {
        Self {
            month: row.month,
            age_range: row.age_range.map(AgeRange::from),
            search_type: SearchType::from(row.search_type),
            total_searches: count(row.total_searches),
            arrests: count(row.arrests),
            days_with_data: count(row.days_with_data),
            genders: row.genders.0,
            objects_of_search: row.objects_of_search.0,
            outcomes: row.outcomes.0,
        }
    }
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Postgres-backed cache. Owns the pool for one refresh cycle.
pub struct PgCacheStore {
    pool: PgPool,
}

impl PgCacheStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a small pool; the refresh runs its store calls sequentially.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(database_url)
            .await
            .context("Failed to connect to Postgres")?;
        Ok(Self::new(pool))
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl CacheStore for PgCacheStore {
    async fn meta_updated_since(&self, cutoff: DateTime<Utc>) -> Result<Option<MetaRecord>> {
        let row = sqlx::query_as::<_, MetaRow>(
            r#"
            SELECT id, last_updated, has_data FROM stop_search_meta
            WHERE last_updated >= $1
            LIMIT 1
            "#,
        )
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(MetaRecord::from))
    }

    async fn any_meta(&self) -> Result<Option<MetaRecord>> {
        let row = sqlx::query_as::<_, MetaRow>(
            "SELECT id, last_updated, has_data FROM stop_search_meta LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(MetaRecord::from))
    }

    /// Delete and insert run in one transaction. If the inserted row count does
    /// not match, the transaction is rolled back and the previous rows survive.
    async fn replace_statistics(&self, statistics: &[StatisticRecord]) -> Result<ReplaceResult> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM stop_search_statistics")
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let mut inserted = 0u64;
        for chunk in statistics.chunks(INSERT_CHUNK_SIZE) {
            let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(
                "INSERT INTO stop_search_statistics \
                 (month, age_range, search_type, total_searches, arrests, days_with_data, \
                  genders, objects_of_search, outcomes) ",
            );
            qb.push_values(chunk, |mut b, stat| {
                b.push_bind(stat.month.clone())
                    .push_bind(stat.age_range.as_ref().map(|a| a.as_str().to_string()))
                    .push_bind(stat.search_type.as_str().to_string())
                    .push_bind(stat.total_searches as i64)
                    .push_bind(stat.arrests as i64)
                    .push_bind(stat.days_with_data as i64)
                    .push_bind(Json(stat.genders.clone()))
                    .push_bind(Json(stat.objects_of_search.clone()))
                    .push_bind(Json(stat.outcomes.clone()));
            });
            inserted += qb.build().execute(&mut *tx).await?.rows_affected();
        }

        if inserted != statistics.len() as u64 {
            warn!(
                expected = statistics.len(),
                inserted, "Insert count mismatch, rolling back statistics replace"
            );
            tx.rollback().await?;
            return Ok(ReplaceResult::rolled_back());
        }

        tx.commit().await?;
        info!(deleted, inserted, "Replaced cached statistics");
        Ok(ReplaceResult::committed(deleted, inserted))
    }

    async fn upsert_meta(&self, meta: &MetaRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stop_search_meta (id, last_updated, has_data)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET last_updated = EXCLUDED.last_updated,
                has_data = EXCLUDED.has_data
            "#,
        )
        .bind(&meta.id)
        .bind(meta.last_updated)
        .bind(meta.has_data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn statistics(&self, filter: &StatisticFilter) -> Result<Vec<StatisticRecord>> {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "SELECT month, age_range, search_type, total_searches, arrests, days_with_data, \
             genders, objects_of_search, outcomes FROM stop_search_statistics WHERE TRUE ",
        );
        if let Some(month) = &filter.month {
            qb.push("AND month = ");
            qb.push_bind(month.clone());
            qb.push(" ");
        }
        if let Some(age_range) = &filter.age_range {
            qb.push("AND age_range = ");
            qb.push_bind(age_range.as_str().to_string());
            qb.push(" ");
        }
        if let Some(search_type) = &filter.search_type {
            qb.push("AND search_type = ");
            qb.push_bind(search_type.as_str().to_string());
            qb.push(" ");
        }

        let rows = qb
            .build_query_as::<StatisticRow>()
            .fetch_all(&self.pool)
            .await?;

        // Sort here rather than in SQL: age ranges order by band, not by text.
        let mut statistics: Vec<StatisticRecord> =
            rows.into_iter().map(StatisticRecord::from).collect();
        statistics.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(statistics)
    }
}
