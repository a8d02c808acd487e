//! Network and file access.
//!
//! Everything that talks to a remote server goes through the [`Fetcher`]
//! trait so the image cache and the discussion search can be exercised with
//! in-memory fakes. [`HttpFetcher`] is the production implementation, a
//! blocking reqwest client with a fixed per-request timeout.

use std::fs;
use std::path::{Path, PathBuf};
#[cfg(feature = "http")]
use std::time::Duration;

#[cfg(feature = "http")]
use reqwest::blocking::Client;
#[cfg(feature = "http")]
use reqwest::header::CONTENT_TYPE;
#[cfg(feature = "http")]
use url::Url;

#[cfg(feature = "http")]
use crate::QuireError;
use crate::Result;

/// HTTP client configuration.
///
/// This struct controls timeout and user agent settings for HTTP requests.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Request timeout in seconds.
    pub timeout: u64,
    /// Custom User-Agent string.
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { timeout: 30, user_agent: "Mozilla/5.0 (compatible; Quire/0.1)".to_string() }
    }
}

/// A completed GET request, whatever its status.
#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    pub status: u16,
    /// Raw `Content-Type` header value, if any.
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn ok(body: impl Into<Vec<u8>>, content_type: Option<&str>) -> Self {
        Self { status: 200, content_type: content_type.map(str::to_string), body: body.into() }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Performs blocking GET requests.
///
/// Implementations must be safe to share between worker threads. Transport
/// failures are errors; non-200 responses are returned as responses so the
/// caller can report the status.
pub trait Fetcher: Send + Sync {
    fn get(&self, url: &str) -> Result<FetchResponse>;
}

/// Blocking reqwest-backed [`Fetcher`].
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    config: FetchConfig,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(QuireError::HttpError)?;
        Ok(Self { client, config })
    }
}

#[cfg(feature = "http")]
impl Fetcher for HttpFetcher {
    fn get(&self, url: &str) -> Result<FetchResponse> {
        let parsed_url = Url::parse(url).map_err(|e| QuireError::InvalidUrl(e.to_string()))?;

        let response = self.client.get(parsed_url).send().map_err(|e| {
            if e.is_timeout() {
                QuireError::Timeout { timeout: self.config.timeout }
            } else {
                QuireError::HttpError(e)
            }
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes()?.to_vec();

        Ok(FetchResponse { status, content_type, body })
    }
}

/// Reads a text file, reporting a missing file as [`QuireError::FileNotFound`].
///
/// [`QuireError::FileNotFound`]: crate::QuireError::FileNotFound
pub fn fetch_file(path: &Path) -> Result<String> {
    let path_buf = PathBuf::from(path);

    if !path_buf.exists() {
        Err(crate::QuireError::FileNotFound(path_buf))
    } else {
        fs::read_to_string(&path_buf).map_err(crate::QuireError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QuireError;

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.timeout, 30);
        assert!(config.user_agent.contains("Quire"));
    }

    #[cfg(feature = "http")]
    #[test]
    fn test_fetch_url_invalid() {
        let fetcher = HttpFetcher::new(FetchConfig::default()).unwrap();
        let result = fetcher.get("not-a-url");
        assert!(matches!(result, Err(QuireError::InvalidUrl(_))));
    }

    #[test]
    fn test_fetch_file_not_found() {
        let result = fetch_file(Path::new("/nonexistent/path/file.html"));
        assert!(matches!(result, Err(QuireError::FileNotFound(_))));
    }

    #[test]
    fn test_fetch_file_reads_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.html");
        fs::write(&path, "<p>x</p>").unwrap();
        assert_eq!(fetch_file(&path).unwrap(), "<p>x</p>");
    }

    #[test]
    fn test_response_status() {
        assert!(FetchResponse::ok(vec![1, 2], Some("image/png")).is_ok());
        assert!(!FetchResponse { status: 404, ..Default::default() }.is_ok());
    }
}
