//! SQLite-backed mapping store.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use super::{EntityType, MappingEntry, MappingStore};
use crate::error::Result;

const CREATE_TABLE_SQL: &str = "
    CREATE TABLE IF NOT EXISTS migration_mappings (
        type_id   INTEGER NOT NULL,
        source_id TEXT    NOT NULL,
        target_id TEXT    NOT NULL,
        PRIMARY KEY (type_id, source_id)
    )";

const CREATE_TARGET_INDEX_SQL: &str = "
    CREATE INDEX IF NOT EXISTS idx_migration_mappings_target
    ON migration_mappings (type_id, target_id)";

/// Mapping store persisted in a single SQLite table keyed by `(type_id, source_id)`.
#[derive(Debug, Clone)]
pub struct SqliteMappingStore {
    pool: SqlitePool,
}

impl SqliteMappingStore {
    /// Opens (or creates) the mapping database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema created.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::with_options(options).await
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub async fn in_memory() -> Result<Self> {
        Self::with_options(SqliteConnectOptions::from_str("sqlite::memory:")?).await
    }

    async fn with_options(options: SqliteConnectOptions) -> Result<Self> {
        // One connection: an in-memory database is private to its connection,
        // and a step never writes concurrently anyway.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::query(CREATE_TABLE_SQL).execute(&pool).await?;
        sqlx::query(CREATE_TARGET_INDEX_SQL).execute(&pool).await?;
        debug!("Mapping database ready");
        Ok(Self { pool })
    }

    /// Closes the underlying pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl MappingStore for SqliteMappingStore {
    async fn put(&self, entity: EntityType, source_id: &str, target_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO migration_mappings (type_id, source_id, target_id)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (type_id, source_id) DO UPDATE SET target_id = excluded.target_id",
        )
        .bind(entity.type_id())
        .bind(source_id)
        .bind(target_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, entity: EntityType, source_id: &str) -> Result<Option<String>> {
        if source_id.is_empty() {
            return Ok(None);
        }
        let target = sqlx::query_scalar::<_, String>(
            "SELECT target_id FROM migration_mappings WHERE type_id = ?1 AND source_id = ?2",
        )
        .bind(entity.type_id())
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(target)
    }

    async fn get_by_prefix(&self, entity: EntityType, prefix: &str) -> Result<Option<String>> {
        if prefix.is_empty() {
            return Ok(None);
        }
        // substr() instead of LIKE: the language separator contains '_'.
        let target = sqlx::query_scalar::<_, String>(
            "SELECT target_id FROM migration_mappings
             WHERE type_id = ?1 AND substr(source_id, 1, length(?2)) = ?2
             ORDER BY source_id
             LIMIT 1",
        )
        .bind(entity.type_id())
        .bind(prefix)
        .fetch_optional(&self.pool)
        .await?;
        Ok(target)
    }

    async fn find_by_id_or_prefix(
        &self,
        entity: EntityType,
        source_id: &str,
        prefix: &str,
    ) -> Result<Vec<String>> {
        if source_id.is_empty() && prefix.is_empty() {
            return Ok(Vec::new());
        }
        let targets = sqlx::query_scalar::<_, String>(
            "SELECT target_id FROM migration_mappings
             WHERE type_id = ?1
               AND ((?2 <> '' AND source_id = ?2)
                 OR (?3 <> '' AND substr(source_id, 1, length(?3)) = ?3))
             ORDER BY source_id <> ?2, source_id",
        )
        .bind(entity.type_id())
        .bind(source_id)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;
        Ok(targets)
    }

    async fn reassign_target(
        &self,
        entity: EntityType,
        old_target: &str,
        new_target: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE migration_mappings SET target_id = ?3 WHERE type_id = ?1 AND target_id = ?2",
        )
        .bind(entity.type_id())
        .bind(old_target)
        .bind(new_target)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn reset(&self, entities: &[EntityType]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for entity in entities {
            removed += sqlx::query("DELETE FROM migration_mappings WHERE type_id = ?1")
                .bind(entity.type_id())
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(removed)
    }

    async fn entries(&self, entity: EntityType) -> Result<Vec<MappingEntry>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT source_id, target_id FROM migration_mappings
             WHERE type_id = ?1
             ORDER BY source_id",
        )
        .bind(entity.type_id())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(source_id, target_id)| MappingEntry {
                entity,
                source_id,
                target_id,
            })
            .collect())
    }
}
