use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::api::{Article, NavigationBlock};
use crate::storage::{ListKind, SavedListsSnapshot};

/// 1-indexed article positions after which a navigation block is inserted.
pub const NAVIGATION_SLOTS: [usize; 3] = [3, 6, 9];

// ============================================================================
// ListingTab
// ============================================================================

/// Which listing the user is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingTab {
    #[default]
    All,
    Favorites,
    Blocked,
}

impl ListingTab {
    /// The saved list a tab is restricted to, if any.
    pub fn list_kind(self) -> Option<ListKind> {
        match self {
            ListingTab::All => None,
            ListingTab::Favorites => Some(ListKind::Favorite),
            ListingTab::Blocked => Some(ListKind::Blocked),
        }
    }
}

impl fmt::Display for ListingTab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ListingTab::All => "all",
            ListingTab::Favorites => "favorites",
            ListingTab::Blocked => "blocked",
        })
    }
}

impl FromStr for ListingTab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(ListingTab::All),
            "favorites" | "favorite" => Ok(ListingTab::Favorites),
            "blocked" => Ok(ListingTab::Blocked),
            other => Err(format!(
                "unknown tab '{other}' (expected all, favorites or blocked)"
            )),
        }
    }
}

// ============================================================================
// ListItem
// ============================================================================

/// One row of the displayed feed.
#[derive(Debug, Clone, PartialEq)]
pub enum ListItem {
    Article(Article),
    Navigation(NavigationBlock),
}

impl ListItem {
    /// Stable identity, unique across both kinds in one list.
    pub fn id(&self) -> String {
        match self {
            ListItem::Article(article) => format!("article_{}", article.id),
            ListItem::Navigation(block) => format!("nav_{}", block.id),
        }
    }

    pub fn as_article(&self) -> Option<&Article> {
        match self {
            ListItem::Article(article) => Some(article),
            ListItem::Navigation(_) => None,
        }
    }
}

// ============================================================================
// Filtering and interleaving
// ============================================================================

/// Articles visible on `tab`.
///
/// - `All`: `live` minus blocked ids.
/// - `Favorites` / `Blocked`: live, then cached, then stored snapshots,
///   restricted to the tab's id set; the first occurrence of an id wins.
pub fn filter_articles(
    tab: ListingTab,
    live: &[Article],
    cached: &[Article],
    saved: &SavedListsSnapshot,
) -> Vec<Article> {
    let Some(kind) = tab.list_kind() else {
        return live
            .iter()
            .filter(|a| !saved.blocked_ids.contains(&a.id))
            .cloned()
            .collect();
    };

    let wanted = saved.ids(kind);
    if wanted.is_empty() {
        return Vec::new();
    }

    let mut seen: HashSet<String> = HashSet::with_capacity(wanted.len());
    live.iter()
        .chain(cached)
        .chain(saved.articles(kind))
        .filter(|a| wanted.contains(&a.id))
        .filter(|a| seen.insert(a.id.clone()))
        .cloned()
        .collect()
}

/// Build the display sequence for `tab`.
///
/// Navigation blocks are only interleaved on `All`, one after each of the
/// [`NAVIGATION_SLOTS`] positions, until either slots or blocks run out.
pub fn compose(
    tab: ListingTab,
    articles: Vec<Article>,
    blocks: &[NavigationBlock],
) -> Vec<ListItem> {
    if articles.is_empty() {
        return Vec::new();
    }

    let interleave = tab == ListingTab::All && !blocks.is_empty();
    let mut next_blocks = blocks.iter();
    let mut items = Vec::with_capacity(articles.len() + NAVIGATION_SLOTS.len());

    for (index, article) in articles.into_iter().enumerate() {
        items.push(ListItem::Article(article));

        let position = index + 1;
        if interleave && NAVIGATION_SLOTS.contains(&position) {
            if let Some(block) = next_blocks.next() {
                items.push(ListItem::Navigation(block.clone()));
            }
        }
    }

    items
}
