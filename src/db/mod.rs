/// Database layer for Skein
///
/// Manages the SQLite connection pool and embedded migrations. All services
/// share a single pool; queries are built at runtime with `sqlx::query` so
/// no DATABASE_URL is needed at compile time.
use crate::error::{SkeinError, SkeinResult};
use sqlx::sqlite::SqlitePool;
use std::path::Path;

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
        }
    }
}

/// Create a SQLite connection pool backed by a file
pub async fn create_pool(path: &Path, options: DatabaseOptions) -> SkeinResult<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let pool = SqlitePool::connect_with(
        sqlx::sqlite::SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(if options.enable_wal {
                sqlx::sqlite::SqliteJournalMode::Wal
            } else {
                sqlx::sqlite::SqliteJournalMode::Delete
            })
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(5)),
    )
    .await
    .map_err(SkeinError::Database)?;

    Ok(pool)
}

/// Create an in-memory pool, used by the test suites
///
/// Capped at one connection: every pooled connection to `:memory:` would
/// otherwise open its own private database.
pub async fn create_memory_pool() -> SkeinResult<SqlitePool> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(
            sqlx::sqlite::SqliteConnectOptions::new()
                .in_memory(true)
                .foreign_keys(true),
        )
        .await
        .map_err(SkeinError::Database)?;

    Ok(pool)
}

/// Run migrations for a database
/// Migrations are embedded at compile time from the ./migrations directory
pub async fn run_migrations(pool: &SqlitePool) -> SkeinResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| SkeinError::Internal(format!("Migration failed: {}", e)))?;

    Ok(())
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> SkeinResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(SkeinError::Database)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_pool_creates_database_and_connects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("test.sqlite");

        let pool = create_pool(&path, DatabaseOptions::default()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        test_connection(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn memory_pool_runs_migrations() {
        let pool = create_memory_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        test_connection(&pool).await.unwrap();
    }
}
