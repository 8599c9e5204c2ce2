//! PostgreSQL implementation of EventStore
//!
//! Production persistence using PostgreSQL with:
//! - A unique index on `original_url` (the natural key)
//! - Row locks (`SELECT ... FOR UPDATE`) for read-decide-write reconciliation
//! - Single conditional `UPDATE` statements for sweeps and curator imports

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, error, instrument};
use uuid::Uuid;

use super::store::*;
use crate::candidate::CanonicalRecord;
use crate::curation::ImportRequest;
use crate::reconcile::{self, ReconcileOutcome};
use crate::record::{EventRecord, EventStatus};
use crate::source::SourceId;

const RECORD_COLUMNS: &str = r#"
    id, original_url, title, event_date, venue_name, description, image_url,
    source_id, source_name, city, status, last_scraped_at,
    imported_at, imported_by, import_notes, created_at, updated_at
"#;

/// Attempts before a reconcile gives up on a url that keeps being inserted
/// concurrently
const MAX_RECONCILE_ATTEMPTS: usize = 2;

/// PostgreSQL implementation of EventStore
///
/// # Example
///
/// ```ignore
/// use sydevents_catalog::PostgresEventStore;
///
/// let store = PostgresEventStore::connect("postgres://localhost/sydevents", 5).await?;
/// store.migrate().await?;
/// ```
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Create a new PostgreSQL store with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool to `database_url`
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| {
                error!("Failed to connect to database: {}", e);
                StoreError::Database(e.to_string())
            })?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[instrument(skip(self))]
    async fn find_by_url(&self, original_url: &str) -> Result<Option<EventRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM catalog_events WHERE original_url = $1"
        ))
        .bind(original_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        row.as_ref().map(record_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> Result<Option<EventRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM catalog_events WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        row.as_ref().map(record_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn count(&self, filter: &RecordFilter) -> Result<u64, StoreError> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM catalog_events WHERE TRUE");

        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(source_id) = &filter.source_id {
            query
                .push(" AND source_id = ")
                .push_bind(source_id.as_str().to_string());
        }
        if let Some(since) = filter.scraped_since {
            query.push(" AND last_scraped_at >= ").push_bind(since);
        }

        let count: i64 = query
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(count.max(0) as u64)
    }

    #[instrument(skip(self, record), fields(url = %record.original_url))]
    async fn reconcile(
        &self,
        record: &CanonicalRecord,
        observed_at: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, StoreError> {
        for attempt in 1..=MAX_RECONCILE_ATTEMPTS {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;

            // Lock the row so a concurrent curator import cannot slip in
            // between the decision and the write
            let existing = sqlx::query(&format!(
                "SELECT {RECORD_COLUMNS} FROM catalog_events WHERE original_url = $1 FOR UPDATE"
            ))
            .bind(&record.original_url)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?
            .as_ref()
            .map(record_from_row)
            .transpose()?;

            let outcome = reconcile::decide(existing.as_ref(), record);

            match existing {
                None => {
                    let fresh = reconcile::new_record(record, observed_at);
                    let inserted = insert_record(&mut tx, &fresh).await?;
                    if !inserted {
                        // Another writer inserted the url after our read; retry
                        // against the row it created.
                        debug!(attempt, "insert lost race, retrying reconcile");
                        continue;
                    }
                }
                Some(mut current) => {
                    reconcile::apply(outcome, &mut current, record, observed_at);
                    update_observed(&mut tx, &current).await?;
                }
            }

            tx.commit()
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;

            return Ok(outcome);
        }

        Err(StoreError::ConcurrencyConflict(record.original_url.clone()))
    }

    #[instrument(skip(self, keep), fields(keep = keep.len()))]
    async fn mark_stale(
        &self,
        source_id: &SourceId,
        cutoff: DateTime<Utc>,
        keep: &[String],
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE catalog_events
            SET status = 'inactive', updated_at = NOW()
            WHERE source_id = $1
              AND last_scraped_at < $2
              AND status NOT IN ('imported', 'inactive')
              AND original_url <> ALL($3)
            "#,
        )
        .bind(source_id.as_str())
        .bind(cutoff)
        .bind(keep)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to mark stale records: {}", e);
            StoreError::Database(e.to_string())
        })?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self, request))]
    async fn mark_imported(
        &self,
        id: Uuid,
        request: &ImportRequest,
        imported_at: DateTime<Utc>,
    ) -> Result<EventRecord, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE catalog_events
            SET status = 'imported',
                imported_at = $2,
                imported_by = $3,
                import_notes = $4,
                updated_at = $2
            WHERE id = $1
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(imported_at)
        .bind(request.imported_by)
        .bind(request.notes.clone().unwrap_or_default())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to import record: {}", e);
            StoreError::Database(e.to_string())
        })?
        .ok_or(StoreError::NotFound(id))?;

        record_from_row(&row)
    }
}

/// Insert a new record; returns false if the url already exists
async fn insert_record(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    record: &EventRecord,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO catalog_events (
            id, original_url, title, event_date, venue_name, description, image_url,
            source_id, source_name, city, status, last_scraped_at, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (original_url) DO NOTHING
        "#,
    )
    .bind(record.id)
    .bind(&record.original_url)
    .bind(&record.title)
    .bind(record.date)
    .bind(&record.venue_name)
    .bind(&record.description)
    .bind(&record.image_url)
    .bind(record.source_id.as_str())
    .bind(&record.source_name)
    .bind(&record.city)
    .bind(record.status.as_str())
    .bind(record.last_scraped_at)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| StoreError::Database(e.to_string()))?;

    Ok(result.rows_affected() == 1)
}

/// Persist the pipeline-owned columns of a locked record.
///
/// Import fields are never written here.
async fn update_observed(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    record: &EventRecord,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE catalog_events
        SET title = $2,
            venue_name = $3,
            description = $4,
            image_url = $5,
            event_date = $6,
            status = $7,
            last_scraped_at = $8,
            updated_at = $9
        WHERE id = $1
        "#,
    )
    .bind(record.id)
    .bind(&record.title)
    .bind(&record.venue_name)
    .bind(&record.description)
    .bind(&record.image_url)
    .bind(record.date)
    .bind(record.status.as_str())
    .bind(record.last_scraped_at)
    .bind(record.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| StoreError::Database(e.to_string()))?;

    Ok(())
}

fn record_from_row(row: &PgRow) -> Result<EventRecord, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Serialization(e.to_string());

    let status: String = row.try_get("status").map_err(decode)?;
    let source_id: String = row.try_get("source_id").map_err(decode)?;

    Ok(EventRecord {
        id: row.try_get("id").map_err(decode)?,
        original_url: row.try_get("original_url").map_err(decode)?,
        title: row.try_get("title").map_err(decode)?,
        date: row.try_get("event_date").map_err(decode)?,
        venue_name: row.try_get("venue_name").map_err(decode)?,
        description: row.try_get("description").map_err(decode)?,
        image_url: row.try_get("image_url").map_err(decode)?,
        source_id: SourceId::new(source_id),
        source_name: row.try_get("source_name").map_err(decode)?,
        city: row.try_get("city").map_err(decode)?,
        status: status
            .parse::<EventStatus>()
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        last_scraped_at: row.try_get("last_scraped_at").map_err(decode)?,
        imported_at: row.try_get("imported_at").map_err(decode)?,
        imported_by: row.try_get("imported_by").map_err(decode)?,
        import_notes: row.try_get("import_notes").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}
