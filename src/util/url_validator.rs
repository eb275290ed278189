use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur when validating the API base URL.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// Only https is accepted for remote hosts; plain http only for loopback.
    #[error("Unsupported scheme: {0} (https required)")]
    UnsupportedScheme(String),
    /// Credentials, query strings and fragments are not allowed in a base URL.
    #[error("Base URL must not contain {0}")]
    UnexpectedComponent(&'static str),
    #[error("URL has no host")]
    MissingHost,
}

/// Validates the configured API base URL.
///
/// The API key is sent with every request, so the base URL must be `https`.
/// Plain `http` is accepted only for loopback hosts (`localhost`,
/// `127.0.0.1`, `::1`), which is what local mock servers use.
///
/// The returned URL always ends in `/` so endpoint paths can be joined onto
/// it without dropping a path prefix.
///
/// # Examples
///
/// ```
/// use newsline::util::validate_base_url;
///
/// let url = validate_base_url("https://news-api.example.com/v2").unwrap();
/// assert_eq!(url.as_str(), "https://news-api.example.com/v2/");
///
/// assert!(validate_base_url("http://127.0.0.1:8080").is_ok());
/// assert!(validate_base_url("http://news-api.example.com").is_err());
/// assert!(validate_base_url("ftp://news-api.example.com").is_err());
/// ```
pub fn validate_base_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let mut url = Url::parse(url_str.trim())?;

    let host = url.host_str().ok_or(UrlValidationError::MissingHost)?;
    match url.scheme() {
        "https" => {}
        "http" if is_loopback(host) => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(UrlValidationError::UnexpectedComponent("credentials"));
    }
    if url.query().is_some() {
        return Err(UrlValidationError::UnexpectedComponent("a query string"));
    }
    if url.fragment().is_some() {
        return Err(UrlValidationError::UnexpectedComponent("a fragment"));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

fn is_loopback(host: &str) -> bool {
    if host == "localhost" {
        return true;
    }
    // Strip brackets from IPv6 addresses for parsing
    let host = host.trim_start_matches('[').trim_end_matches(']');
    host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_https_accepted() {
        let url = validate_base_url("https://news-api.example.com").unwrap();
        assert_eq!(url.as_str(), "https://news-api.example.com/");
    }

    #[test]
    fn test_path_prefix_gets_trailing_slash() {
        let url = validate_base_url("https://example.com/api/v1").unwrap();
        assert_eq!(url.path(), "/api/v1/");
        assert_eq!(url.join("news-feed").unwrap().path(), "/api/v1/news-feed");
    }

    #[test]
    fn test_plain_http_rejected_for_remote_hosts() {
        assert!(matches!(
            validate_base_url("http://news-api.example.com"),
            Err(UrlValidationError::UnsupportedScheme(_))
        ));
        assert!(validate_base_url("http://192.168.1.10").is_err());
    }

    #[test]
    fn test_plain_http_allowed_for_loopback() {
        assert!(validate_base_url("http://localhost:3000").is_ok());
        assert!(validate_base_url("http://127.0.0.1:54321").is_ok());
        assert!(validate_base_url("http://[::1]:8080").is_ok());
    }

    #[test]
    fn test_other_schemes_rejected() {
        assert!(validate_base_url("file:///etc/passwd").is_err());
        assert!(validate_base_url("ftp://example.com").is_err());
    }

    #[test]
    fn test_unparseable_rejected() {
        assert!(matches!(
            validate_base_url("not a url"),
            Err(UrlValidationError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_components_rejected() {
        assert!(validate_base_url("https://user:pw@example.com").is_err());
        assert!(validate_base_url("https://example.com/?key=1").is_err());
        assert!(validate_base_url("https://example.com/#top").is_err());
    }
}
