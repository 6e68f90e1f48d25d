mod documents;

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{migrate::MigrateError, sqlite::SqlitePoolOptions, SqlitePool};
use thiserror::Error;

use storefront_core::{Collection, IdGenerator};

pub use documents::{DocumentError, DocumentRepository, FilterValue, ListFilter};

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    ids: Arc<IdGenerator>,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(StorageError::Connect)?;

        apply_pragmas(&pool).await?;

        Ok(Self {
            pool,
            ids: Arc::new(IdGenerator::new()),
        })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a repository bound to the collection of `T`.
    pub fn documents<T: Collection>(&self) -> DocumentRepository<T> {
        DocumentRepository::new(self.pool.clone(), Arc::clone(&self.ids))
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("PRAGMA journal_mode = WAL;")
        .fetch_one(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA synchronous = NORMAL;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    Ok(())
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to apply pragma: {0}")]
    Pragma(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
pub(crate) async fn memory_database() -> Database {
    let db = Database::connect("sqlite::memory:?cache=shared")
        .await
        .expect("connect");
    db.run_migrations().await.expect("migrations");
    db
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_apply() {
        let db = memory_database().await;

        let tables: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'documents'",
        )
        .fetch_one(db.pool())
        .await
        .expect("fetch tables");
        assert_eq!(tables.0, 1, "expected documents table to be created");
    }

    #[tokio::test]
    async fn connect_rejects_unreachable_path() {
        let result = Database::connect("sqlite:///nonexistent-dir/nested/storefront.db").await;
        assert!(matches!(result, Err(StorageError::Connect(_))));
    }

    #[tokio::test]
    async fn file_database_uses_wal_and_persists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("storefront.db").display()
        );

        let db = Database::connect(&url).await.expect("connect");
        db.run_migrations().await.expect("migrations");
        let mode: (String,) = sqlx::query_as("PRAGMA journal_mode;")
            .fetch_one(db.pool())
            .await
            .expect("journal mode");
        assert_eq!(mode.0.to_lowercase(), "wal");

        sqlx::query(
            "INSERT INTO documents (collection, id, body_json, created_at, updated_at) \
             VALUES ('tags', '01HZX0000000000000000000C1', '{}', '2024-01-01T00:00:00.000Z', '2024-01-01T00:00:00.000Z')",
        )
        .execute(db.pool())
        .await
        .expect("insert");
        db.pool().close().await;

        let reopened = Database::connect(&url).await.expect("reconnect");
        reopened.run_migrations().await.expect("migrations are idempotent");
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents")
            .fetch_one(reopened.pool())
            .await
            .expect("count");
        assert_eq!(count.0, 1);
    }
}
