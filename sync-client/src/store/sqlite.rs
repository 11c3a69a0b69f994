//! SQLite storage backend for sync-client.

use super::{CursorStore, SensorStore};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use wearsync_types::{Field, SensorEvent, SensorId, Timestamp};

const CURSOR_KEY: &str = "last_sync_timestamp";

/// SQLite-based sample and cursor storage.
///
/// Uses WAL mode so the ingestion consumer can append while a sync run
/// reads and deletes.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open a store from a database path.
    ///
    /// Creates the database file if it doesn't exist.
    pub async fn new(path: &Path) -> StoreResult<Self> {
        let url = path.to_str().ok_or_else(|| StoreError::InvalidPath {
            path: path.to_path_buf(),
        })?;
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(":memory:")?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS samples (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sensor_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                fields TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_state (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_samples_sensor_ts ON samples(sensor_id, timestamp)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Sensor ids that have stored rows, sorted.
    pub async fn sensors(&self) -> StoreResult<Vec<SensorId>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT sensor_id FROM samples ORDER BY sensor_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(ids.into_iter().map(SensorId::new).collect())
    }
}

#[async_trait]
impl SensorStore for SqliteStore {
    async fn append(&self, sensor_id: &SensorId, rows: &[SensorEvent]) -> StoreResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for row in rows {
            let fields = serde_json::to_string(&row.fields)?;
            sqlx::query(
                r#"
                INSERT INTO samples (sensor_id, timestamp, fields)
                VALUES (?1, ?2, ?3)
                "#,
            )
            .bind(sensor_id.as_str())
            .bind(row.timestamp.as_millis())
            .bind(fields)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn read_since(
        &self,
        sensor_id: &SensorId,
        since: Timestamp,
        limit: usize,
    ) -> StoreResult<Vec<SensorEvent>> {
        let rows = sqlx::query_as::<_, SampleRow>(
            r#"
            SELECT sensor_id, timestamp, fields
            FROM samples
            WHERE sensor_id = ?1 AND timestamp > ?2
            ORDER BY timestamp ASC, id ASC
            LIMIT ?3
            "#,
        )
        .bind(sensor_id.as_str())
        .bind(since.as_millis())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SensorEvent::try_from).collect()
    }

    async fn read_at(
        &self,
        sensor_id: &SensorId,
        at: Timestamp,
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<SensorEvent>> {
        let rows = sqlx::query_as::<_, SampleRow>(
            r#"
            SELECT sensor_id, timestamp, fields
            FROM samples
            WHERE sensor_id = ?1 AND timestamp = ?2
            ORDER BY id ASC
            LIMIT ?3 OFFSET ?4
            "#,
        )
        .bind(sensor_id.as_str())
        .bind(at.as_millis())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SensorEvent::try_from).collect()
    }

    async fn count_at(&self, sensor_id: &SensorId, at: Timestamp) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM samples WHERE sensor_id = ?1 AND timestamp = ?2",
        )
        .bind(sensor_id.as_str())
        .bind(at.as_millis())
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }

    async fn delete_up_to(&self, sensor_id: &SensorId, up_to: Timestamp) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM samples WHERE sensor_id = ?1 AND timestamp <= ?2")
            .bind(sensor_id.as_str())
            .bind(up_to.as_millis())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn count(&self, sensor_id: &SensorId) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM samples WHERE sensor_id = ?1")
            .bind(sensor_id.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }

    async fn read_all(&self, sensor_id: &SensorId) -> StoreResult<Vec<SensorEvent>> {
        let rows = sqlx::query_as::<_, SampleRow>(
            r#"
            SELECT sensor_id, timestamp, fields
            FROM samples
            WHERE sensor_id = ?1
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(sensor_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SensorEvent::try_from).collect()
    }

    async fn delete_all(&self, sensor_id: &SensorId) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM samples WHERE sensor_id = ?1")
            .bind(sensor_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CursorStore for SqliteStore {
    async fn get(&self) -> StoreResult<Option<Timestamp>> {
        let value: Option<i64> = sqlx::query_scalar("SELECT value FROM sync_state WHERE key = ?1")
            .bind(CURSOR_KEY)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value.map(Timestamp::from_millis))
    }

    async fn set(&self, cursor: Timestamp) -> StoreResult<()> {
        // MAX keeps the stored watermark from ever moving backward.
        sqlx::query(
            r#"
            INSERT INTO sync_state (key, value)
            VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = MAX(value, excluded.value)
            "#,
        )
        .bind(CURSOR_KEY)
        .bind(cursor.as_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Internal row type for SQLite queries.
#[derive(sqlx::FromRow)]
struct SampleRow {
    sensor_id: String,
    timestamp: i64,
    fields: String,
}

impl TryFrom<SampleRow> for SensorEvent {
    type Error = StoreError;

    fn try_from(row: SampleRow) -> Result<Self, Self::Error> {
        let fields: Vec<Field> = serde_json::from_str(&row.fields)?;
        Ok(SensorEvent {
            sensor_id: SensorId::new(row.sensor_id),
            timestamp: Timestamp::from_millis(row.timestamp),
            fields,
        })
    }
}
