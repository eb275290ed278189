use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::schema::Database;
use super::types::{ArticleDbRow, ListKind, SavedListsSnapshot, ARTICLE_COLUMNS};
use crate::api::Article;

/// Buffered snapshots per subscriber; each snapshot is complete, so a lagging
/// subscriber only needs the newest one.
const CHANGE_CHANNEL_CAPACITY: usize = 16;

const INSERT_SAVED_SQL: &str = r#"
    INSERT OR IGNORE INTO saved_articles
        (article_id, list_kind, added_at, kind, section_id, section_name,
         web_publication_date, web_title, web_url, api_url, is_hosted,
         pillar_id, pillar_name, thumbnail, trail_text)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

fn insert_saved(
    article: &Article,
    kind: ListKind,
    added_at: i64,
) -> sqlx::query::Query<'_, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
    sqlx::query(INSERT_SAVED_SQL)
        .bind(&article.id)
        .bind(kind.as_str())
        .bind(added_at)
        .bind(&article.kind)
        .bind(&article.section_id)
        .bind(&article.section_name)
        .bind(&article.web_publication_date)
        .bind(&article.web_title)
        .bind(&article.web_url)
        .bind(&article.api_url)
        .bind(article.is_hosted)
        .bind(&article.pillar_id)
        .bind(&article.pillar_name)
        .bind(article.thumbnail())
        .bind(article.trail_text())
}

impl Database {
    // ========================================================================
    // Saved List Operations
    // ========================================================================

    /// Insert a snapshot of `article` into `kind`, returns whether a row was added.
    ///
    /// `UNIQUE(article_id, list_kind)` plus `INSERT OR IGNORE` makes a repeated
    /// add a no-op that keeps the original `added_at`.
    pub async fn insert_saved_article(&self, article: &Article, kind: ListKind) -> Result<bool> {
        let now = chrono::Utc::now().timestamp_millis();
        let result = insert_saved(article, kind, now).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove `article_id` from `kind`, returns whether a row was deleted.
    pub async fn delete_saved_article(&self, article_id: &str, kind: ListKind) -> Result<bool> {
        let result = sqlx::query("DELETE FROM saved_articles WHERE article_id = ? AND list_kind = ?")
            .bind(article_id)
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop any favorite entry for the article and add it to the blocked list
    /// in one transaction.
    pub async fn block_saved_article(&self, article: &Article) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM saved_articles WHERE article_id = ? AND list_kind = ?")
            .bind(&article.id)
            .bind(ListKind::Favorite.as_str())
            .execute(&mut *tx)
            .await?;

        insert_saved(article, ListKind::Blocked, now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn is_saved_article(&self, article_id: &str, kind: ListKind) -> Result<bool> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM saved_articles WHERE article_id = ? AND list_kind = ?",
        )
        .bind(article_id)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 > 0)
    }

    pub async fn get_saved_article_ids(&self, kind: ListKind) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT article_id FROM saved_articles WHERE list_kind = ?")
                .bind(kind.as_str())
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Saved snapshots for `kind`, most recently added first.
    pub async fn get_saved_articles(&self, kind: ListKind) -> Result<Vec<Article>> {
        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM saved_articles WHERE list_kind = ? \
             ORDER BY added_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, ArticleDbRow>(&sql)
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(ArticleDbRow::into_article).collect())
    }
}

// ============================================================================
// SavedLists
// ============================================================================

/// Favorite and blocked article lists with change notification.
///
/// Every mutation that changes stored state is durable before the call
/// returns and then broadcasts a full [`SavedListsSnapshot`] to all
/// subscribers. A subscriber may see the snapshot before the caller of the
/// mutation resumes.
#[derive(Clone)]
pub struct SavedLists {
    db: Database,
    changes: broadcast::Sender<Arc<SavedListsSnapshot>>,
}

impl SavedLists {
    pub fn new(db: Database) -> Self {
        let (changes, _rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { db, changes }
    }

    /// Receive a snapshot after every state-changing mutation.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<SavedListsSnapshot>> {
        self.changes.subscribe()
    }

    /// Current state of both lists.
    pub async fn snapshot(&self) -> Result<SavedListsSnapshot> {
        Ok(SavedListsSnapshot {
            favorite_ids: self.db.get_saved_article_ids(ListKind::Favorite).await?,
            blocked_ids: self.db.get_saved_article_ids(ListKind::Blocked).await?,
            favorites: self.db.get_saved_articles(ListKind::Favorite).await?,
            blocked: self.db.get_saved_articles(ListKind::Blocked).await?,
        })
    }

    /// Add `article` to `kind`. No-op if already present.
    pub async fn add(&self, article: &Article, kind: ListKind) -> Result<bool> {
        let added = self.db.insert_saved_article(article, kind).await?;
        if added {
            tracing::debug!(article_id = %article.id, list = %kind, "Added to saved list");
            self.publish().await;
        }
        Ok(added)
    }

    /// Remove `article_id` from `kind`. No-op if absent.
    pub async fn remove(&self, article_id: &str, kind: ListKind) -> Result<bool> {
        let removed = self.db.delete_saved_article(article_id, kind).await?;
        if removed {
            tracing::debug!(article_id = %article_id, list = %kind, "Removed from saved list");
            self.publish().await;
        }
        Ok(removed)
    }

    pub async fn contains(&self, article_id: &str, kind: ListKind) -> Result<bool> {
        self.db.is_saved_article(article_id, kind).await
    }

    pub async fn ids_for(&self, kind: ListKind) -> Result<HashSet<String>> {
        self.db.get_saved_article_ids(kind).await
    }

    /// Stored snapshots for `kind`, most recently added first.
    pub async fn articles_for(&self, kind: ListKind) -> Result<Vec<Article>> {
        self.db.get_saved_articles(kind).await
    }

    /// Flip favorite membership, returning the new state.
    pub async fn toggle_favorite(&self, article: &Article) -> Result<bool> {
        if self.contains(&article.id, ListKind::Favorite).await? {
            self.remove(&article.id, ListKind::Favorite).await?;
            Ok(false)
        } else {
            self.add(article, ListKind::Favorite).await?;
            Ok(true)
        }
    }

    /// Flip blocked membership, returning the new state.
    ///
    /// Unblocking is a plain removal. Blocking first drops any favorite entry
    /// for the same id: a blocked article is never a favorite.
    pub async fn toggle_blocked(&self, article: &Article) -> Result<bool> {
        if self.contains(&article.id, ListKind::Blocked).await? {
            self.remove(&article.id, ListKind::Blocked).await?;
            Ok(false)
        } else {
            self.db.block_saved_article(article).await?;
            tracing::debug!(article_id = %article.id, "Blocked article");
            self.publish().await;
            Ok(true)
        }
    }

    async fn publish(&self) {
        match self.snapshot().await {
            Ok(snapshot) => {
                // No receivers is not an error
                let _ = self.changes.send(Arc::new(snapshot));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build saved-list snapshot for subscribers");
            }
        }
    }
}
