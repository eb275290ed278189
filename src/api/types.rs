use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

// ============================================================================
// Articles
// ============================================================================

/// Optional extra fields requested with `show-fields=thumbnail,trailText`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trail_text: Option<String>,
}

/// A single feed article as delivered by the news API.
///
/// Two articles are equal when their ids are equal; a later fetch of the same
/// id replaces the whole record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub section_id: String,
    pub section_name: String,
    /// ISO-8601, with or without fractional seconds
    pub web_publication_date: String,
    pub web_title: String,
    pub web_url: String,
    pub api_url: String,
    #[serde(default)]
    pub is_hosted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pillar_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pillar_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<ArticleFields>,
}

impl PartialEq for Article {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Article {}

impl Hash for Article {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Article {
    pub fn thumbnail(&self) -> Option<&str> {
        self.fields.as_ref().and_then(|f| f.thumbnail.as_deref())
    }

    pub fn trail_text(&self) -> Option<&str> {
        self.fields.as_ref().and_then(|f| f.trail_text.as_deref())
    }

    /// Parses `web_publication_date` into a UTC timestamp.
    ///
    /// Accepts full RFC 3339 (`2024-01-15T10:30:00.123Z`, `+01:00` offsets)
    /// as well as a bare `YYYY-MM-DDTHH:MM:SS` which is taken as UTC.
    /// Returns `None` for anything else.
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.web_publication_date.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// One page of the article feed.
#[derive(Debug, Clone)]
pub struct ArticlePage {
    pub articles: Vec<Article>,
    pub total_pages: u32,
}

/// Wire shape of `GET /news-feed`.
///
/// Only the fields the client reads; `status`, `total`, `startIndex`,
/// `pageSize` and `orderBy` are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FeedResponse {
    #[serde(default)]
    pub current_page: u32,
    pub pages: u32,
    pub results: Vec<Article>,
}

// ============================================================================
// Navigation blocks
// ============================================================================

/// How a navigation block presents its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationMode {
    Push,
    Modal,
    FullScreen,
}

/// A promotional card fetched from `GET /navigation`.
///
/// Field names match the wire format (`title_symbol`, `button_title`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationBlock {
    pub id: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_symbol: Option<String>,
    pub button_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_symbol: Option<String>,
    pub navigation: NavigationMode,
}

/// Wire shape of `GET /navigation`.
#[derive(Debug, Deserialize)]
pub(crate) struct NavigationResponse {
    pub results: Vec<NavigationBlock>,
}

// ============================================================================
// Error body
// ============================================================================

/// Wire shape of an error response body (`{"error": {...}}`).
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ErrorBody {
    pub status_code: u16,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    const ARTICLE_JSON: &str = r#"{
        "id": "world/2024/jan/15/story",
        "type": "article",
        "sectionId": "world",
        "sectionName": "World news",
        "webPublicationDate": "2024-01-15T10:30:00Z",
        "webTitle": "A story",
        "webUrl": "https://news.example.com/world/2024/jan/15/story",
        "apiUrl": "https://api.example.com/world/2024/jan/15/story",
        "isHosted": false,
        "pillarId": "pillar/news",
        "pillarName": "News",
        "fields": {"thumbnail": "https://img.example.com/1.jpg", "trailText": "Trail"}
    }"#;

    #[test]
    fn test_article_wire_names() {
        let article: Article = serde_json::from_str(ARTICLE_JSON).unwrap();
        assert_eq!(article.id, "world/2024/jan/15/story");
        assert_eq!(article.kind, "article");
        assert_eq!(article.section_name, "World news");
        assert_eq!(article.pillar_name.as_deref(), Some("News"));
        assert_eq!(article.thumbnail(), Some("https://img.example.com/1.jpg"));
        assert_eq!(article.trail_text(), Some("Trail"));
    }

    #[test]
    fn test_article_optional_fields_missing() {
        let json = r#"{
            "id": "a", "type": "article", "sectionId": "s", "sectionName": "S",
            "webPublicationDate": "2024-01-15T10:30:00Z", "webTitle": "T",
            "webUrl": "https://x", "apiUrl": "https://y", "isHosted": true
        }"#;
        let article: Article = serde_json::from_str(json).unwrap();
        assert!(article.fields.is_none());
        assert!(article.pillar_id.is_none());
        assert!(article.thumbnail().is_none());
    }

    #[test]
    fn test_article_equality_is_by_id() {
        let a: Article = serde_json::from_str(ARTICLE_JSON).unwrap();
        let mut b = a.clone();
        b.web_title = "Rewritten headline".to_string();
        assert_eq!(a, b);
    }

    #[test]
    fn test_published_at_with_and_without_fraction() {
        let mut article: Article = serde_json::from_str(ARTICLE_JSON).unwrap();
        let whole = article.published_at().unwrap();
        assert_eq!(whole.hour(), 10);
        assert_eq!(whole.minute(), 30);

        article.web_publication_date = "2024-01-15T10:30:00.250Z".to_string();
        let fractional = article.published_at().unwrap();
        assert_eq!(fractional.timestamp_subsec_millis(), 250);

        article.web_publication_date = "2024-01-15T10:30:00".to_string();
        assert_eq!(article.published_at().unwrap().day(), 15);

        article.web_publication_date = "yesterday".to_string();
        assert!(article.published_at().is_none());
    }

    #[test]
    fn test_feed_response_needs_only_pages_and_results() {
        let json = format!(r#"{{"pages": 4, "results": [{ARTICLE_JSON}]}}"#);
        let response: FeedResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(response.pages, 4);
        assert_eq!(response.current_page, 0);
        assert_eq!(response.results.len(), 1);

        assert!(serde_json::from_str::<FeedResponse>(r#"{"results": []}"#).is_err());
    }

    #[test]
    fn test_navigation_block_snake_case_wire_names() {
        let json = r#"{
            "id": 7,
            "title": "Newsletter",
            "subtitle": "Daily briefing",
            "title_symbol": "envelope",
            "button_title": "Sign up",
            "button_symbol": "arrow.right",
            "navigation": "full_screen"
        }"#;
        let block: NavigationBlock = serde_json::from_str(json).unwrap();
        assert_eq!(block.id, 7);
        assert_eq!(block.title_symbol.as_deref(), Some("envelope"));
        assert_eq!(block.button_title, "Sign up");
        assert_eq!(block.navigation, NavigationMode::FullScreen);
    }

    #[test]
    fn test_navigation_modes() {
        let push: NavigationMode = serde_json::from_str("\"push\"").unwrap();
        let modal: NavigationMode = serde_json::from_str("\"modal\"").unwrap();
        assert_eq!(push, NavigationMode::Push);
        assert_eq!(modal, NavigationMode::Modal);
        assert!(serde_json::from_str::<NavigationMode>("\"sideways\"").is_err());
    }
}
