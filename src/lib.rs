//! newsline: a paginated news feed client with an offline article cache and
//! persistent favorite/blocked lists.
//!
//! - [`api`] talks to the remote news API
//! - [`storage`] persists the article cache and saved lists in SQLite
//! - [`feed`] composes the displayed listing and drives loading

pub mod api;
pub mod config;
pub mod feed;
pub mod storage;
pub mod util;

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use crate::api::{ApiError, Article, ArticlePage, FeedSource, NavigationBlock, NavigationMode};

    pub fn article(id: &str) -> Article {
        Article {
            id: id.to_string(),
            kind: "article".to_string(),
            section_id: "world".to_string(),
            section_name: "World news".to_string(),
            web_publication_date: "2024-01-15T10:30:00Z".to_string(),
            web_title: format!("Headline {id}"),
            web_url: format!("https://news.example.com/{id}"),
            api_url: format!("https://news-api.example.com/{id}"),
            is_hosted: false,
            pillar_id: None,
            pillar_name: None,
            fields: None,
        }
    }

    /// `n` articles with ids `a1..=an`.
    pub fn articles(n: usize) -> Vec<Article> {
        articles_from(1, n)
    }

    /// `n` articles with ids starting at `a{start}`.
    pub fn articles_from(start: usize, n: usize) -> Vec<Article> {
        (start..start + n).map(|i| article(&format!("a{i}"))).collect()
    }

    pub fn navigation_block(id: i64) -> NavigationBlock {
        NavigationBlock {
            id,
            title: format!("Promo {id}"),
            subtitle: None,
            title_symbol: None,
            button_title: "Open".to_string(),
            button_symbol: None,
            navigation: NavigationMode::Push,
        }
    }

    /// Feed source that replays queued responses and records requested pages.
    ///
    /// An exhausted page queue answers with `InvalidRequest`; an exhausted
    /// navigation queue answers with no blocks.
    #[derive(Default)]
    pub struct ScriptedSource {
        pages: Mutex<VecDeque<Result<ArticlePage, ApiError>>>,
        blocks: Mutex<VecDeque<Result<Vec<NavigationBlock>, ApiError>>>,
        requested: Mutex<Vec<u32>>,
    }

    impl ScriptedSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_page(&self, result: Result<Vec<Article>, ApiError>, total_pages: u32) {
            let page = result.map(|articles| ArticlePage {
                articles,
                total_pages,
            });
            self.pages.lock().unwrap().push_back(page);
        }

        pub fn push_blocks(&self, result: Result<Vec<NavigationBlock>, ApiError>) {
            self.blocks.lock().unwrap().push_back(result);
        }

        pub fn requested_pages(&self) -> Vec<u32> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FeedSource for ScriptedSource {
        async fn fetch_article_page(
            &self,
            page: u32,
            _page_size: u32,
        ) -> Result<ArticlePage, ApiError> {
            self.requested.lock().unwrap().push(page);
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::InvalidRequest("no scripted page".into())))
        }

        async fn fetch_navigation_blocks(&self) -> Result<Vec<NavigationBlock>, ApiError> {
            self.blocks
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }
}
