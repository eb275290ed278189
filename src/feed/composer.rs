use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use super::layout::{compose, filter_articles, ListItem, ListingTab};
use crate::api::{ApiError, Article, ArticlePage, FeedSource, NavigationBlock};
use crate::storage::{ArticleCache, SavedLists, SavedListsSnapshot};

/// Articles requested per page
pub const PAGE_SIZE: u32 = 10;

/// Message shown for every connectivity-class failure
pub const NO_CONNECTION_MESSAGE: &str = "No Internet Connection";

// ============================================================================
// State
// ============================================================================

/// Lifecycle of the feed listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Loaded,
    Empty,
    Offline,
    Error,
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoadState::Idle => "idle",
            LoadState::Loading => "loading",
            LoadState::Loaded => "loaded",
            LoadState::Empty => "empty",
            LoadState::Offline => "offline",
            LoadState::Error => "error",
        })
    }
}

/// Page cursor for the "all" feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            current_page: 1,
            total_pages: 1,
        }
    }
}

impl Pagination {
    pub fn has_more_pages(&self) -> bool {
        self.current_page < self.total_pages
    }
}

// ============================================================================
// FeedComposer
// ============================================================================

/// Owns the feed listing: pagination, navigation promos, saved-list overlay
/// and offline fallback.
///
/// All mutation goes through `&mut self`; callers serialize user actions
/// (refresh, load more, tab switches) onto one owner. The only concurrency
/// inside is the paired first-page fetch.
pub struct FeedComposer {
    source: Arc<dyn FeedSource>,
    cache: ArticleCache,
    saved: SavedLists,
    saved_rx: broadcast::Receiver<Arc<SavedListsSnapshot>>,
    saved_state: Arc<SavedListsSnapshot>,

    state: LoadState,
    articles: Vec<Article>,
    cached_articles: Vec<Article>,
    navigation_blocks: Vec<NavigationBlock>,
    pagination: Pagination,
    active_tab: ListingTab,
    is_offline: bool,
    is_loading_more: bool,
    error_message: Option<String>,
    show_alert: bool,
    cache_max_age: Duration,
}

impl FeedComposer {
    /// Subscribe to saved-list changes and load the current saved lists and
    /// cache generation. Store failures are logged and start empty.
    pub async fn new(source: Arc<dyn FeedSource>, cache: ArticleCache, saved: SavedLists) -> Self {
        let saved_rx = saved.subscribe();
        let saved_state = match saved.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load saved lists, starting empty");
                SavedListsSnapshot::default()
            }
        };
        let cached_articles = cache.read_all().await;

        Self {
            source,
            cache,
            saved,
            saved_rx,
            saved_state: Arc::new(saved_state),
            state: LoadState::Idle,
            articles: Vec::new(),
            cached_articles,
            navigation_blocks: Vec::new(),
            pagination: Pagination::default(),
            active_tab: ListingTab::All,
            is_offline: false,
            is_loading_more: false,
            error_message: None,
            show_alert: false,
            cache_max_age: ArticleCache::DEFAULT_MAX_AGE,
        }
    }

    pub fn with_cache_max_age(mut self, max_age: Duration) -> Self {
        self.cache_max_age = max_age;
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    pub fn cached_articles(&self) -> &[Article] {
        &self.cached_articles
    }

    pub fn navigation_blocks(&self) -> &[NavigationBlock] {
        &self.navigation_blocks
    }

    pub fn pagination(&self) -> Pagination {
        self.pagination
    }

    pub fn active_tab(&self) -> ListingTab {
        self.active_tab
    }

    pub fn is_offline(&self) -> bool {
        self.is_offline
    }

    pub fn is_loading_more(&self) -> bool {
        self.is_loading_more
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// One-shot alert flag raised by non-connectivity errors.
    pub fn show_alert(&self) -> bool {
        self.show_alert
    }

    pub fn favorite_ids(&self) -> &HashSet<String> {
        &self.saved_state.favorite_ids
    }

    pub fn blocked_ids(&self) -> &HashSet<String> {
        &self.saved_state.blocked_ids
    }

    pub fn select_tab(&mut self, tab: ListingTab) {
        if self.active_tab != tab {
            tracing::debug!(from = %self.active_tab, to = %tab, "Switching tab");
            self.active_tab = tab;
        }
    }

    pub fn dismiss_alert(&mut self) {
        self.show_alert = false;
    }

    /// Whether the cache generation is within the configured max age.
    pub async fn cache_is_fresh(&self) -> bool {
        self.cache.is_fresh(self.cache_max_age).await
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Fetch page 1 and the navigation blocks, falling back to the cache.
    ///
    /// A call made while a load is already running is ignored.
    pub async fn load_initial_data(&mut self) {
        if self.state == LoadState::Loading {
            tracing::debug!("Initial load already in progress, ignoring");
            return;
        }

        self.state = LoadState::Loading;
        self.pagination.current_page = 1;
        self.is_offline = false;

        match self.fetch_first_page().await {
            Ok((page, blocks)) => self.apply_first_page(page, blocks).await,
            Err(err) => {
                let cached = self.cache.read_all().await;
                if !cached.is_empty() {
                    tracing::info!(
                        error = %err,
                        cached = cached.len(),
                        "Initial load failed, showing cached articles"
                    );
                    self.articles = cached.clone();
                    self.cached_articles = cached;
                    self.pagination = Pagination::default();
                    self.is_offline = true;
                    self.state = LoadState::Offline;
                } else if err.is_cancellation() {
                    tracing::debug!("Initial load cancelled");
                    self.state = LoadState::Idle;
                } else {
                    self.handle_error(&err);
                }
            }
        }
    }

    /// Pull-to-refresh: re-fetch page 1 and the navigation blocks.
    ///
    /// Failures never replace data already on screen; they only surface when
    /// there is nothing to show.
    pub async fn refresh(&mut self) {
        match self.fetch_first_page().await {
            Ok((page, blocks)) => self.apply_first_page(page, blocks).await,
            Err(err) if err.is_cancellation() => {
                tracing::debug!("Refresh cancelled");
            }
            Err(err) if !self.articles.is_empty() => {
                tracing::warn!(error = %err, "Refresh failed, keeping current articles");
            }
            Err(err) => self.handle_error(&err),
        }
    }

    /// Fetch the next page and append it.
    ///
    /// Only runs on the "all" tab, while more pages remain and no other
    /// load-more is in flight. On failure the page cursor is rolled back and
    /// loaded articles are left untouched.
    pub async fn load_more(&mut self) {
        if self.active_tab != ListingTab::All
            || !self.pagination.has_more_pages()
            || self.is_loading_more
        {
            return;
        }

        self.is_loading_more = true;
        self.pagination.current_page += 1;
        let page = self.pagination.current_page;

        match self.source.fetch_article_page(page, PAGE_SIZE).await {
            Ok(result) => {
                tracing::debug!(page, count = result.articles.len(), "Loaded more articles");
                merge_articles(&mut self.articles, result.articles);
                self.pagination.total_pages = result.total_pages.max(1);
            }
            Err(err) => {
                self.pagination.current_page -= 1;
                tracing::warn!(page, error = %err, "Load more failed, page rolled back");
                self.handle_error(&err);
            }
        }

        self.is_loading_more = false;
    }

    /// Trigger [`load_more`](Self::load_more) when `item` is the last row of
    /// the current listing.
    pub async fn handle_item_visible(&mut self, item: &ListItem) {
        let is_last = self
            .list_items()
            .last()
            .is_some_and(|last| last.id() == item.id());
        if is_last {
            self.load_more().await;
        }
    }

    async fn fetch_first_page(&self) -> Result<(ArticlePage, Vec<NavigationBlock>), ApiError> {
        tokio::try_join!(
            self.source.fetch_article_page(1, PAGE_SIZE),
            self.source.fetch_navigation_blocks(),
        )
    }

    async fn apply_first_page(&mut self, page: ArticlePage, blocks: Vec<NavigationBlock>) {
        self.pagination = Pagination {
            current_page: 1,
            total_pages: page.total_pages.max(1),
        };
        self.articles = page.articles;
        self.navigation_blocks = blocks;

        self.cache.replace_all(&self.articles).await;
        self.cached_articles = self.articles.clone();

        self.is_offline = false;
        self.error_message = None;
        self.state = if self.articles.is_empty() {
            LoadState::Empty
        } else {
            LoadState::Loaded
        };
        tracing::debug!(
            articles = self.articles.len(),
            blocks = self.navigation_blocks.len(),
            total_pages = self.pagination.total_pages,
            state = %self.state,
            "First page loaded"
        );
    }

    /// Turn a failure into user-visible state.
    ///
    /// Cancellations are dropped, connectivity failures switch to offline,
    /// everything else sets an error message and raises the alert.
    fn handle_error(&mut self, err: &ApiError) {
        if err.is_cancellation() {
            tracing::debug!("Ignoring cancelled request");
            return;
        }

        if err.is_connectivity() {
            tracing::info!(error = %err, "Connectivity lost, switching to offline");
            self.is_offline = true;
            self.error_message = Some(NO_CONNECTION_MESSAGE.to_string());
            self.state = LoadState::Offline;
            return;
        }

        tracing::warn!(error = %err, "Feed request failed");
        self.error_message = Some(err.to_string());
        self.state = LoadState::Error;
        self.show_alert = true;
    }

    // ========================================================================
    // Composition
    // ========================================================================

    /// Articles visible on the active tab.
    pub fn filtered_articles(&self) -> Vec<Article> {
        filter_articles(
            self.active_tab,
            &self.articles,
            &self.cached_articles,
            &self.saved_state,
        )
    }

    /// The display sequence for the active tab.
    pub fn list_items(&self) -> Vec<ListItem> {
        compose(
            self.active_tab,
            self.filtered_articles(),
            &self.navigation_blocks,
        )
    }

    /// Whether the active tab should show its empty placeholder.
    ///
    /// The "all" tab only reports empty once something has been loaded (or
    /// restored offline); saved-list tabs depend on membership alone.
    pub fn is_empty(&self) -> bool {
        let empty = self.filtered_articles().is_empty();
        match self.active_tab {
            ListingTab::All => {
                empty && matches!(self.state, LoadState::Loaded | LoadState::Offline)
            }
            ListingTab::Favorites | ListingTab::Blocked => empty,
        }
    }

    /// Look up an article by id: live, then cached, then stored snapshots.
    pub fn find_article(&self, id: &str) -> Option<Article> {
        self.articles
            .iter()
            .chain(&self.cached_articles)
            .chain(&self.saved_state.favorites)
            .chain(&self.saved_state.blocked)
            .find(|a| a.id == id)
            .cloned()
    }

    // ========================================================================
    // Saved lists
    // ========================================================================

    /// Flip favorite membership. Returns the new state, or `None` if the
    /// store rejected the change.
    pub async fn toggle_favorite(&mut self, article: &Article) -> Option<bool> {
        let result = self.saved.toggle_favorite(article).await;
        self.apply_pending_saved_changes();
        match result {
            Ok(is_favorite) => Some(is_favorite),
            Err(e) => {
                tracing::warn!(article_id = %article.id, error = %e, "Failed to toggle favorite");
                None
            }
        }
    }

    /// Flip blocked membership. Returns the new state, or `None` if the
    /// store rejected the change.
    pub async fn toggle_blocked(&mut self, article: &Article) -> Option<bool> {
        let result = self.saved.toggle_blocked(article).await;
        self.apply_pending_saved_changes();
        match result {
            Ok(is_blocked) => Some(is_blocked),
            Err(e) => {
                tracing::warn!(article_id = %article.id, error = %e, "Failed to toggle blocked");
                None
            }
        }
    }

    /// Apply every saved-list snapshot already delivered to this composer.
    pub fn apply_pending_saved_changes(&mut self) {
        let mut latest = None;
        loop {
            match self.saved_rx.try_recv() {
                Ok(snapshot) => latest = Some(snapshot),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Saved-list subscriber lagged");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        if let Some(snapshot) = latest {
            self.saved_state = snapshot;
        }
    }

    /// Wait for the next saved-list change and apply it.
    ///
    /// Returns `false` once the store has been dropped. Intended for a
    /// `tokio::select!` loop alongside user input.
    pub async fn next_saved_change(&mut self) -> bool {
        loop {
            match self.saved_rx.recv().await {
                Ok(snapshot) => {
                    self.saved_state = snapshot;
                    return true;
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Saved-list subscriber lagged");
                }
                Err(RecvError::Closed) => return false,
            }
        }
    }
}

/// Append `incoming` to `articles`; an id already present is replaced in place.
fn merge_articles(articles: &mut Vec<Article>, incoming: Vec<Article>) {
    for article in incoming {
        match articles.iter().position(|a| a.id == article.id) {
            Some(index) => articles[index] = article,
            None => articles.push(article),
        }
    }
}
