use anyhow::Result;
use sqlx::QueryBuilder;
use std::time::Duration;

use super::schema::Database;
use super::types::{ArticleDbRow, ARTICLE_COLUMNS};
use crate::api::Article;

/// Rows per INSERT; 15 columns * 50 stays well under SQLite's bind limit
const BATCH_SIZE: usize = 50;

impl Database {
    // ========================================================================
    // Cache Operations
    // ========================================================================

    /// Replace the cached generation with `articles`, preserving their order.
    ///
    /// The delete and the inserts share one transaction, so readers see either
    /// the old generation or the new one, never a mix.
    pub async fn replace_cached_articles(&self, articles: &[Article]) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM cached_articles")
            .execute(&mut *tx)
            .await?;

        for (chunk_index, chunk) in articles.chunks(BATCH_SIZE).enumerate() {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT OR REPLACE INTO cached_articles (article_id, kind, section_id, section_name, \
                 web_publication_date, web_title, web_url, api_url, is_hosted, pillar_id, \
                 pillar_name, thumbnail, trail_text, cached_at, order_index) ",
            );

            builder.push_values(chunk.iter().enumerate(), |mut b, (i, article)| {
                let order_index = (chunk_index * BATCH_SIZE + i) as i64;
                b.push_bind(&article.id)
                    .push_bind(&article.kind)
                    .push_bind(&article.section_id)
                    .push_bind(&article.section_name)
                    .push_bind(&article.web_publication_date)
                    .push_bind(&article.web_title)
                    .push_bind(&article.web_url)
                    .push_bind(&article.api_url)
                    .push_bind(article.is_hosted)
                    .push_bind(&article.pillar_id)
                    .push_bind(&article.pillar_name)
                    .push_bind(article.thumbnail())
                    .push_bind(article.trail_text())
                    .push_bind(now)
                    .push_bind(order_index);
            });

            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        tracing::debug!(count = articles.len(), "Replaced cached article generation");
        Ok(())
    }

    /// Get the cached generation in original fetch order.
    pub async fn get_cached_articles(&self) -> Result<Vec<Article>> {
        let sql = format!("SELECT {ARTICLE_COLUMNS} FROM cached_articles ORDER BY order_index ASC");
        let rows = sqlx::query_as::<_, ArticleDbRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(ArticleDbRow::into_article).collect())
    }

    /// Timestamp (epoch milliseconds) of the cached generation, if any.
    pub async fn cached_generation_time(&self) -> Result<Option<i64>> {
        let row: (Option<i64>,) = sqlx::query_as("SELECT MAX(cached_at) FROM cached_articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    pub async fn cached_article_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cached_articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}

// ============================================================================
// ArticleCache
// ============================================================================

/// Best-effort offline cache of the latest page-1 fetch.
///
/// Every failure is logged and degrades to an empty or negative result;
/// nothing here returns an error to the caller.
#[derive(Clone)]
pub struct ArticleCache {
    db: Database,
}

impl ArticleCache {
    /// Reference freshness window
    pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60 * 60);

    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Clear the previous generation and store `articles` in order.
    pub async fn replace_all(&self, articles: &[Article]) {
        if let Err(e) = self.db.replace_cached_articles(articles).await {
            tracing::warn!(error = %e, count = articles.len(), "Failed to cache articles");
        }
    }

    pub async fn read_all(&self) -> Vec<Article> {
        match self.db.get_cached_articles().await {
            Ok(articles) => articles,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read cached articles");
                Vec::new()
            }
        }
    }

    /// True iff a generation exists and was written within `max_age`.
    pub async fn is_fresh(&self, max_age: Duration) -> bool {
        let cached_at = match self.db.cached_generation_time().await {
            Ok(Some(ts)) => ts,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read cache timestamp");
                return false;
            }
        };

        let age_ms = chrono::Utc::now().timestamp_millis().saturating_sub(cached_at);
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        age_ms <= max_age_ms
    }

    pub async fn exists(&self) -> bool {
        match self.db.cached_article_count().await {
            Ok(count) => count > 0,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to count cached articles");
                false
            }
        }
    }
}
