use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::types::{
    ArticlePage, ErrorEnvelope, FeedResponse, NavigationBlock, NavigationResponse,
};

const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024; // 10MB
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fields requested alongside every article page
const SHOW_FIELDS: &str = "thumbnail,trailText";

// ============================================================================
// Error Types
// ============================================================================

/// Connectivity sub-classification of transport failures.
///
/// The first four variants mean "the device is offline or the host is
/// unreachable" and drive the offline fallback in the composer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    NotConnected,
    ConnectionLost,
    TimedOut,
    CannotConnectToHost,
    Other,
}

/// Errors raised by the remote feed client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The endpoint URL could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// Network-level failure (DNS, connection, TLS, timeout, ...)
    #[error("Network error: {message}")]
    Transport {
        kind: Connectivity,
        message: String,
    },
    /// HTTP 401
    #[error("Unauthorized: check the configured API key")]
    Unauthorized,
    /// Non-2xx response with a decodable error body
    #[error("Server error {code}: {reason}")]
    ServerRejected { code: u16, reason: String },
    /// Response body did not match the expected shape
    #[error("Could not decode response: {0}")]
    Decoding(String),
    /// The operation was superseded or aborted.
    ///
    /// `FeedClient` never returns this; it is for other [`FeedSource`]
    /// implementations and callers that abort a fetch (for example a source
    /// that drops a request when a newer one starts).
    #[error("Request cancelled")]
    Cancelled,
}

impl ApiError {
    /// True for failures that mean the operation was cancelled rather than failed.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ApiError::Cancelled)
    }

    /// True for transport failures caused by missing or lost connectivity.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            ApiError::Transport {
                kind: Connectivity::NotConnected
                    | Connectivity::ConnectionLost
                    | Connectivity::TimedOut
                    | Connectivity::CannotConnectToHost,
                ..
            }
        )
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        let kind = classify_reqwest(&err);
        ApiError::Transport {
            kind,
            message: err.to_string(),
        }
    }
}

/// Walks the error source chain looking for an I/O error kind before falling
/// back to reqwest's own coarse flags.
fn classify_reqwest(err: &reqwest::Error) -> Connectivity {
    let mut source: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(err);
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            use std::io::ErrorKind;
            match io.kind() {
                ErrorKind::NotConnected => return Connectivity::NotConnected,
                ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                | ErrorKind::UnexpectedEof => return Connectivity::ConnectionLost,
                ErrorKind::TimedOut => return Connectivity::TimedOut,
                ErrorKind::ConnectionRefused | ErrorKind::AddrNotAvailable => {
                    return Connectivity::CannotConnectToHost
                }
                _ => {}
            }
        }
        source = inner.source();
    }

    if err.is_timeout() {
        Connectivity::TimedOut
    } else if err.is_connect() {
        Connectivity::CannotConnectToHost
    } else if err.is_request() || err.is_body() {
        Connectivity::ConnectionLost
    } else {
        Connectivity::Other
    }
}

// ============================================================================
// FeedSource
// ============================================================================

/// Remote source of article pages and navigation blocks.
///
/// Implementations never retry; retry and fallback belong to the caller.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_article_page(&self, page: u32, page_size: u32)
        -> Result<ArticlePage, ApiError>;

    async fn fetch_navigation_blocks(&self) -> Result<Vec<NavigationBlock>, ApiError>;
}

// ============================================================================
// FeedClient
// ============================================================================

/// HTTP implementation of [`FeedSource`].
///
/// Every request carries the configured `Authorization` value.
pub struct FeedClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: SecretString,
    timeout: Duration,
}

impl std::fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl FeedClient {
    pub fn new(http: reqwest::Client, base_url: Url, api_key: SecretString) -> Self {
        Self {
            http,
            base_url,
            api_key,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::InvalidRequest(format!("{path}: {e}")))
    }

    /// GET `url` and return the raw body of a 2xx response.
    async fn get_bytes(&self, url: Url) -> Result<Vec<u8>, ApiError> {
        tracing::debug!(url = %url, "GET");
        let request = self
            .http
            .get(url.clone())
            .header("Authorization", self.api_key.expose_secret());

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| ApiError::Transport {
                kind: Connectivity::TimedOut,
                message: format!("no response within {}s", self.timeout.as_secs()),
            })?
            .map_err(ApiError::from_reqwest)?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            tracing::warn!(url = %url, "Request rejected as unauthorized");
            return Err(ApiError::Unauthorized);
        }

        let bytes = read_limited_bytes(response, MAX_RESPONSE_SIZE).await?;

        if !status.is_success() {
            return match serde_json::from_slice::<ErrorEnvelope>(&bytes) {
                Ok(envelope) => {
                    tracing::warn!(
                        url = %url,
                        status = envelope.error.status_code,
                        reason = %envelope.error.reason,
                        "Server rejected request"
                    );
                    Err(ApiError::ServerRejected {
                        code: envelope.error.status_code,
                        reason: envelope.error.reason,
                    })
                }
                Err(e) => Err(ApiError::Decoding(format!(
                    "HTTP {} with unrecognised error body: {e}",
                    status.as_u16()
                ))),
            };
        }

        Ok(bytes)
    }
}

#[async_trait]
impl FeedSource for FeedClient {
    async fn fetch_article_page(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<ArticlePage, ApiError> {
        let mut url = self.endpoint("news-feed")?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("page-size", &page_size.to_string())
            .append_pair("show-fields", SHOW_FIELDS);

        let bytes = self.get_bytes(url).await?;
        let response: FeedResponse =
            serde_json::from_slice(&bytes).map_err(|e| ApiError::Decoding(e.to_string()))?;

        tracing::debug!(
            page = response.current_page,
            pages = response.pages,
            count = response.results.len(),
            "Fetched article page"
        );

        Ok(ArticlePage {
            articles: response.results,
            total_pages: response.pages.max(1),
        })
    }

    async fn fetch_navigation_blocks(&self) -> Result<Vec<NavigationBlock>, ApiError> {
        let url = self.endpoint("navigation")?;
        let bytes = self.get_bytes(url).await?;
        let response: NavigationResponse =
            serde_json::from_slice(&bytes).map_err(|e| ApiError::Decoding(e.to_string()))?;

        tracing::debug!(count = response.results.len(), "Fetched navigation blocks");
        Ok(response.results)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, ApiError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ApiError::Decoding(format!(
                "response of {len} bytes exceeds {limit} byte limit"
            )));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ApiError::from_reqwest)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ApiError::Decoding(format!(
                "response exceeds {limit} byte limit"
            )));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED_BODY: &str = r#"{
        "status": "ok",
        "total": 25,
        "startIndex": 1,
        "pageSize": 10,
        "currentPage": 1,
        "pages": 3,
        "orderBy": "newest",
        "results": [
            {
                "id": "a1", "type": "article", "sectionId": "world",
                "sectionName": "World", "webPublicationDate": "2024-01-15T10:30:00Z",
                "webTitle": "First", "webUrl": "https://news.example.com/a1",
                "apiUrl": "https://api.example.com/a1", "isHosted": false,
                "fields": {"thumbnail": "https://img.example.com/a1.jpg"}
            },
            {
                "id": "a2", "type": "article", "sectionId": "sport",
                "sectionName": "Sport", "webPublicationDate": "2024-01-15T09:00:00.5Z",
                "webTitle": "Second", "webUrl": "https://news.example.com/a2",
                "apiUrl": "https://api.example.com/a2", "isHosted": false
            }
        ]
    }"#;

    const NAVIGATION_BODY: &str = r#"{
        "results": [
            {"id": 1, "title": "Podcasts", "button_title": "Listen", "navigation": "push"},
            {"id": 2, "title": "Puzzles", "subtitle": "Daily", "title_symbol": "puzzle",
             "button_title": "Play", "button_symbol": "play", "navigation": "modal"}
        ]
    }"#;

    fn client_for(server: &MockServer) -> FeedClient {
        let base = Url::parse(&format!("{}/", server.uri())).unwrap();
        FeedClient::new(
            reqwest::Client::new(),
            base,
            SecretString::from("test-key".to_string()),
        )
    }

    #[tokio::test]
    async fn test_fetch_article_page_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/news-feed"))
            .and(query_param("page", "1"))
            .and(query_param("page-size", "10"))
            .and(query_param("show-fields", "thumbnail,trailText"))
            .and(header("Authorization", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED_BODY))
            .expect(1)
            .mount(&server)
            .await;

        let page = client_for(&server).fetch_article_page(1, 10).await.unwrap();
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.articles.len(), 2);
        assert_eq!(page.articles[0].id, "a1");
        assert_eq!(
            page.articles[0].thumbnail(),
            Some("https://img.example.com/a1.jpg")
        );
    }

    #[tokio::test]
    async fn test_fetch_navigation_blocks_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/navigation"))
            .and(header("Authorization", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string(NAVIGATION_BODY))
            .mount(&server)
            .await;

        let blocks = client_for(&server).fetch_navigation_blocks().await.unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].subtitle.as_deref(), Some("Daily"));
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = client_for(&server).fetch_navigation_blocks().await;
        match result {
            Err(ApiError::Unauthorized) => {}
            other => panic!("Expected Unauthorized, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_rejected_with_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string(
                r#"{"error": {"statusCode": 503, "reason": "Maintenance"}}"#,
            ))
            .expect(1) // no retry inside the client
            .mount(&server)
            .await;

        let result = client_for(&server).fetch_article_page(2, 10).await;
        match result {
            Err(ApiError::ServerRejected { code, reason }) => {
                assert_eq!(code, 503);
                assert_eq!(reason, "Maintenance");
            }
            other => panic!("Expected ServerRejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_status_with_unknown_body_is_decoding() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let result = client_for(&server).fetch_article_page(1, 10).await;
        assert!(matches!(result, Err(ApiError::Decoding(_))));
    }

    #[tokio::test]
    async fn test_malformed_body_is_decoding() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"results": 5}"#))
            .mount(&server)
            .await;

        let result = client_for(&server).fetch_article_page(1, 10).await;
        assert!(matches!(result, Err(ApiError::Decoding(_))));
    }

    #[tokio::test]
    async fn test_timeout_is_connectivity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(NAVIGATION_BODY)
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).with_timeout(Duration::from_millis(50));
        let err = client.fetch_navigation_blocks().await.unwrap_err();
        assert!(err.is_connectivity(), "got {:?}", err);
        assert!(matches!(
            err,
            ApiError::Transport {
                kind: Connectivity::TimedOut,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connectivity() {
        // Nothing listens on port 9 of localhost in the test environment
        let base = Url::parse("http://127.0.0.1:9/").unwrap();
        let client = FeedClient::new(
            reqwest::Client::new(),
            base,
            SecretString::from("k".to_string()),
        );
        let err = client.fetch_article_page(1, 10).await.unwrap_err();
        assert!(err.is_connectivity(), "got {:?}", err);
        assert!(!err.is_cancellation());
    }

    #[test]
    fn test_error_classification() {
        assert!(ApiError::Cancelled.is_cancellation());
        assert!(!ApiError::Cancelled.is_connectivity());
        assert!(!ApiError::Unauthorized.is_connectivity());
        let other = ApiError::Transport {
            kind: Connectivity::Other,
            message: "tls".into(),
        };
        assert!(!other.is_connectivity());
    }

    #[test]
    fn test_debug_masks_api_key() {
        let client = FeedClient::new(
            reqwest::Client::new(),
            Url::parse("https://api.example.com/").unwrap(),
            SecretString::from("super-secret".to_string()),
        );
        let debug = format!("{:?}", client);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
