use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::api::{Article, ArticleFields};

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another instance of the application has locked the database
    #[error("Another instance of newsline appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Saved lists
// ============================================================================

/// Which saved list an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    Favorite,
    Blocked,
}

impl ListKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ListKind::Favorite => "favorite",
            ListKind::Blocked => "blocked",
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "favorite" | "favorites" => Ok(ListKind::Favorite),
            "blocked" => Ok(ListKind::Blocked),
            other => Err(format!("unknown list '{other}' (expected favorites or blocked)")),
        }
    }
}

/// Full state of both saved lists, published after every mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SavedListsSnapshot {
    pub favorite_ids: HashSet<String>,
    pub blocked_ids: HashSet<String>,
    /// Most recently added first
    pub favorites: Vec<Article>,
    /// Most recently added first
    pub blocked: Vec<Article>,
}

impl SavedListsSnapshot {
    pub fn ids(&self, kind: ListKind) -> &HashSet<String> {
        match kind {
            ListKind::Favorite => &self.favorite_ids,
            ListKind::Blocked => &self.blocked_ids,
        }
    }

    pub fn articles(&self, kind: ListKind) -> &[Article] {
        match kind {
            ListKind::Favorite => &self.favorites,
            ListKind::Blocked => &self.blocked,
        }
    }
}

// ============================================================================
// Row types
// ============================================================================

/// Article columns shared by `cached_articles` and `saved_articles`.
pub(crate) const ARTICLE_COLUMNS: &str = "article_id, kind, section_id, section_name, \
     web_publication_date, web_title, web_url, api_url, is_hosted, pillar_id, pillar_name, \
     thumbnail, trail_text";

/// Internal row type for article snapshots (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ArticleDbRow {
    pub article_id: String,
    pub kind: String,
    pub section_id: String,
    pub section_name: String,
    pub web_publication_date: String,
    pub web_title: String,
    pub web_url: String,
    pub api_url: String,
    pub is_hosted: bool,
    pub pillar_id: Option<String>,
    pub pillar_name: Option<String>,
    pub thumbnail: Option<String>,
    pub trail_text: Option<String>,
}

impl ArticleDbRow {
    pub(crate) fn into_article(self) -> Article {
        let fields = if self.thumbnail.is_some() || self.trail_text.is_some() {
            Some(ArticleFields {
                thumbnail: self.thumbnail,
                trail_text: self.trail_text,
            })
        } else {
            None
        };

        Article {
            id: self.article_id,
            kind: self.kind,
            section_id: self.section_id,
            section_name: self.section_name,
            web_publication_date: self.web_publication_date,
            web_title: self.web_title,
            web_url: self.web_url,
            api_url: self.api_url,
            is_hosted: self.is_hosted,
            pillar_id: self.pillar_id,
            pillar_name: self.pillar_name,
            fields,
        }
    }
}
