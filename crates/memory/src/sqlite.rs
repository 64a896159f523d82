//! SQLite history backend.
//!
//! Uses a single SQLite database file with two append-only tables:
//! - `interactions`: one row per provider interaction
//! - `embeddings`: one row per stored vector (little-endian f32 blob)
//!
//! Every append is a single INSERT, so an abandoned write either lands
//! completely or not at all.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use switchyard_core::{EmbeddingRecord, HistoryBackend, HistoryFilter, InteractionRecord, MemoryError, ProviderNote};
use tracing::{debug, info};

pub struct SqliteHistory {
    pool: SqlitePool,
}

impl SqliteHistory {
    /// Open (creating if missing) a database at `path`.
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let backend = Self { pool };
        backend.run_migrations().await?;
        info!("SQLite history backend initialized at {path}");
        Ok(backend)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, MemoryError> {
        let backend = Self { pool };
        backend.run_migrations().await?;
        Ok(backend)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS interactions (
                seq          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id      TEXT NOT NULL,
                provider_id  TEXT NOT NULL,
                input        TEXT NOT NULL,
                output       TEXT NOT NULL,
                success      INTEGER NOT NULL DEFAULT 1,
                timestamp    TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("interactions table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS embeddings (
                seq          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id      TEXT NOT NULL,
                provider_id  TEXT NOT NULL,
                content      TEXT NOT NULL,
                vector       BLOB NOT NULL,
                metadata     TEXT NOT NULL DEFAULT 'null',
                timestamp    TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("embeddings table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS provider_notes (
                provider_id  TEXT NOT NULL,
                user_id      TEXT NOT NULL,
                key          TEXT NOT NULL,
                value        TEXT NOT NULL,
                metadata     TEXT NOT NULL DEFAULT 'null',
                updated_at   TEXT NOT NULL,
                PRIMARY KEY (provider_id, user_id, key)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("provider_notes table: {e}")))?;

        for (name, ddl) in [
            (
                "interactions index",
                "CREATE INDEX IF NOT EXISTS idx_interactions_user ON interactions(user_id, provider_id, timestamp)",
            ),
            (
                "embeddings index",
                "CREATE INDEX IF NOT EXISTS idx_embeddings_user ON embeddings(user_id, provider_id)",
            ),
        ] {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| MemoryError::MigrationFailed(format!("{name}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
        vector.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
        blob.chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    /// Fixed-width RFC 3339 so lexical order equals time order.
    fn ts(t: DateTime<Utc>) -> String {
        t.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn parse_ts(row: &SqliteRow) -> Result<DateTime<Utc>, MemoryError> {
        let raw: String = row
            .try_get("timestamp")
            .map_err(|e| MemoryError::QueryFailed(format!("timestamp column: {e}")))?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| MemoryError::QueryFailed(format!("bad timestamp '{raw}': {e}")))
    }

    fn get<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T, MemoryError>
    where
        T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
    {
        row.try_get(column)
            .map_err(|e| MemoryError::QueryFailed(format!("{column} column: {e}")))
    }

    fn row_to_interaction(row: &SqliteRow) -> Result<InteractionRecord, MemoryError> {
        let seq: i64 = Self::get(row, "seq")?;
        let success: i64 = Self::get(row, "success")?;
        Ok(InteractionRecord {
            seq: seq as u64,
            user_id: Self::get(row, "user_id")?,
            provider_id: Self::get(row, "provider_id")?,
            input: Self::get(row, "input")?,
            output: Self::get(row, "output")?,
            success: success != 0,
            timestamp: Self::parse_ts(row)?,
        })
    }

    fn row_to_embedding(row: &SqliteRow) -> Result<EmbeddingRecord, MemoryError> {
        let seq: i64 = Self::get(row, "seq")?;
        let blob: Vec<u8> = Self::get(row, "vector")?;
        let metadata: String = Self::get(row, "metadata")?;
        Ok(EmbeddingRecord {
            seq: seq as u64,
            user_id: Self::get(row, "user_id")?,
            provider_id: Self::get(row, "provider_id")?,
            content: Self::get(row, "content")?,
            vector: Self::blob_to_vector(&blob),
            metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
            timestamp: Self::parse_ts(row)?,
        })
    }

    fn row_to_note(row: &SqliteRow) -> Result<ProviderNote, MemoryError> {
        let metadata: String = Self::get(row, "metadata")?;
        Ok(ProviderNote {
            provider_id: Self::get(row, "provider_id")?,
            user_id: Self::get(row, "user_id")?,
            key: Self::get(row, "key")?,
            value: Self::get(row, "value")?,
            metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
            updated_at: Self::parse_ts(row)?,
        })
    }

    /// SQLite treats a negative LIMIT as "no limit".
    fn limit(filter: &HistoryFilter) -> i64 {
        filter.limit.map_or(-1, |l| l.min(i64::MAX as usize) as i64)
    }
}

#[async_trait]
impl HistoryBackend for SqliteHistory {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append_interaction(&self, record: InteractionRecord) -> Result<u64, MemoryError> {
        let result = sqlx::query(
            "INSERT INTO interactions (user_id, provider_id, input, output, success, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&record.user_id)
        .bind(&record.provider_id)
        .bind(&record.input)
        .bind(&record.output)
        .bind(record.success as i64)
        .bind(Self::ts(record.timestamp))
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("Insert interaction failed: {e}")))?;

        Ok(result.last_insert_rowid() as u64)
    }

    async fn interactions(&self, user_id: &str, filter: &HistoryFilter) -> Result<Vec<InteractionRecord>, MemoryError> {
        let rows = sqlx::query(
            "SELECT seq, user_id, provider_id, input, output, success, timestamp
             FROM interactions
             WHERE user_id = ?1
               AND (?2 IS NULL OR provider_id = ?2)
               AND (?3 IS NULL OR timestamp >= ?3)
             ORDER BY seq DESC
             LIMIT ?4",
        )
        .bind(user_id)
        .bind(filter.provider_id.as_deref())
        .bind(filter.since.map(Self::ts))
        .bind(Self::limit(filter))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("Select interactions failed: {e}")))?;

        rows.iter().map(Self::row_to_interaction).collect()
    }

    async fn append_embedding(&self, record: EmbeddingRecord) -> Result<u64, MemoryError> {
        let metadata = serde_json::to_string(&record.metadata)
            .map_err(|e| MemoryError::Storage(format!("Failed to serialize metadata: {e}")))?;

        let result = sqlx::query(
            "INSERT INTO embeddings (user_id, provider_id, content, vector, metadata, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&record.user_id)
        .bind(&record.provider_id)
        .bind(&record.content)
        .bind(Self::vector_to_blob(&record.vector))
        .bind(metadata)
        .bind(Self::ts(record.timestamp))
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("Insert embedding failed: {e}")))?;

        Ok(result.last_insert_rowid() as u64)
    }

    async fn embeddings(&self, user_id: &str, filter: &HistoryFilter) -> Result<Vec<EmbeddingRecord>, MemoryError> {
        let rows = sqlx::query(
            "SELECT seq, user_id, provider_id, content, vector, metadata, timestamp
             FROM embeddings
             WHERE user_id = ?1
               AND (?2 IS NULL OR provider_id = ?2)
               AND (?3 IS NULL OR timestamp >= ?3)
             ORDER BY seq DESC
             LIMIT ?4",
        )
        .bind(user_id)
        .bind(filter.provider_id.as_deref())
        .bind(filter.since.map(Self::ts))
        .bind(Self::limit(filter))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("Select embeddings failed: {e}")))?;

        rows.iter().map(Self::row_to_embedding).collect()
    }

    async fn put_note(&self, note: ProviderNote) -> Result<(), MemoryError> {
        let metadata = serde_json::to_string(&note.metadata)
            .map_err(|e| MemoryError::Storage(format!("Failed to serialize note metadata: {e}")))?;
        sqlx::query(
            "INSERT INTO provider_notes (provider_id, user_id, key, value, metadata, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(provider_id, user_id, key) DO UPDATE SET
                value = excluded.value,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at",
        )
        .bind(&note.provider_id)
        .bind(&note.user_id)
        .bind(&note.key)
        .bind(&note.value)
        .bind(metadata)
        .bind(Self::ts(note.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("Upsert note failed: {e}")))?;
        Ok(())
    }

    async fn notes(&self, provider_id: &str, user_id: Option<&str>, limit: usize) -> Result<Vec<ProviderNote>, MemoryError> {
        let rows = sqlx::query(
            "SELECT provider_id, user_id, key, value, metadata, updated_at AS timestamp
             FROM provider_notes
             WHERE provider_id = ?1
               AND (?2 IS NULL OR user_id = ?2)
             ORDER BY updated_at DESC
             LIMIT ?3",
        )
        .bind(provider_id)
        .bind(user_id)
        .bind(limit.min(i64::MAX as usize) as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("Select notes failed: {e}")))?;

        rows.iter().map(Self::row_to_note).collect()
    }
}
