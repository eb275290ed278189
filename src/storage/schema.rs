use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::DatabaseError;

// ============================================================================
// Database
// ============================================================================

/// Handle to the local SQLite store.
///
/// Cloning is cheap (shared pool). The handle is opened once at start-up,
/// passed to [`ArticleCache`](super::ArticleCache) and
/// [`SavedLists`](super::SavedLists), and closed at shutdown.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another instance of newsline
    /// has the database locked (SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN).
    /// Returns `DatabaseError::Migration` if the schema could not be created.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // Create the file with user-only permissions before the pool touches it
        #[cfg(unix)]
        if path != ":memory:" {
            use std::os::unix::fs::PermissionsExt;
            let db_path = std::path::Path::new(path);
            if db_path.exists() {
                let perms = std::fs::Permissions::from_mode(0o600);
                if let Err(e) = std::fs::set_permissions(path, perms) {
                    tracing::warn!(path = %path, error = %e, "Failed to set database file permissions");
                }
            } else if let Some(parent) = db_path.parent() {
                if parent.exists() {
                    use std::os::unix::fs::OpenOptionsExt;
                    let _file = std::fs::OpenOptions::new()
                        .write(true)
                        .create_new(true)
                        .mode(0o600)
                        .open(db_path)
                        .ok(); // If creation fails, SQLite will report the error at connect_with.
                }
            }
        }

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .pragma("busy_timeout", "5000");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        let db = Self { pool };
        db.migrate().await.map_err(|e| {
            let error_string = e.to_string().to_lowercase();
            if error_string.contains("database is locked")
                || error_string.contains("database table is locked")
                || error_string.contains("sqlite_busy")
                || error_string.contains("sqlite_locked")
            {
                DatabaseError::InstanceLocked
            } else {
                DatabaseError::Migration(e.to_string())
            }
        })?;
        tracing::debug!(path = %path, "Database opened");
        Ok(db)
    }

    /// Close every pooled connection. Further queries fail.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("Database closed");
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// All statements use `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Single-generation offline cache of the latest page-1 fetch
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cached_articles (
                article_id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                section_id TEXT NOT NULL,
                section_name TEXT NOT NULL,
                web_publication_date TEXT NOT NULL,
                web_title TEXT NOT NULL,
                web_url TEXT NOT NULL,
                api_url TEXT NOT NULL,
                is_hosted INTEGER NOT NULL DEFAULT 0,
                pillar_id TEXT,
                pillar_name TEXT,
                thumbnail TEXT,
                trail_text TEXT,
                cached_at INTEGER NOT NULL,
                order_index INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_cached_articles_order ON cached_articles(order_index)",
        )
        .execute(&mut *tx)
        .await?;

        // Favorite and blocked lists with denormalized article snapshots
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS saved_articles (
                id INTEGER PRIMARY KEY,
                article_id TEXT NOT NULL,
                list_kind TEXT NOT NULL CHECK (list_kind IN ('favorite', 'blocked')),
                added_at INTEGER NOT NULL,
                kind TEXT NOT NULL,
                section_id TEXT NOT NULL,
                section_name TEXT NOT NULL,
                web_publication_date TEXT NOT NULL,
                web_title TEXT NOT NULL,
                web_url TEXT NOT NULL,
                api_url TEXT NOT NULL,
                is_hosted INTEGER NOT NULL DEFAULT 0,
                pillar_id TEXT,
                pillar_name TEXT,
                thumbnail TEXT,
                trail_text TEXT,
                UNIQUE(article_id, list_kind)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Composite index for articlesFor(kind): filter by kind, newest first
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_saved_articles_kind_added ON saved_articles(list_kind, added_at DESC)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}
