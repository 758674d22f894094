use std::path::PathBuf;
use std::time::Duration;

use favsync_core::BookmarkNode;
use futures_util::future::BoxFuture;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} returned {status}")]
    Status { url: Url, status: StatusCode },
    #[error("request to {0} timed out")]
    Timeout(Url),
    #[error("invalid source url: {0}")]
    Url(#[from] url::ParseError),
    #[error("document is not a bookmark forest: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Where the upstream bookmark document comes from.
pub trait BookmarkSource: Send + Sync {
    fn fetch_document(&self) -> BoxFuture<'_, Result<String, SourceError>>;

    fn describe(&self) -> String;
}

/// Turns the raw upstream document into a forest.
pub trait DocumentParser: Send + Sync {
    fn parse(&self, raw: &str) -> Result<Vec<BookmarkNode>, SourceError>;
}

#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl BookmarkSource for FileSource {
    fn fetch_document(&self) -> BoxFuture<'_, Result<String, SourceError>> {
        Box::pin(async move {
            tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|source| SourceError::Io {
                    path: self.path.clone(),
                    source,
                })
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HttpSource {
    http: Client,
    url: Url,
    timeout: Duration,
}

impl HttpSource {
    pub fn new(url: Url) -> Self {
        Self::with_http(Client::new(), url)
    }

    pub fn with_http(http: Client, url: Url) -> Self {
        Self {
            http,
            url,
            timeout: DEFAULT_SOURCE_TIMEOUT,
        }
    }

    /// Deadline for the whole download, body included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn download(&self) -> Result<String, SourceError> {
        let response = self.http.get(self.url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: self.url.clone(),
                status,
            });
        }
        Ok(response.text().await?)
    }
}

impl BookmarkSource for HttpSource {
    fn fetch_document(&self) -> BoxFuture<'_, Result<String, SourceError>> {
        Box::pin(async move {
            tokio::time::timeout(self.timeout, self.download())
                .await
                .map_err(|_| SourceError::Timeout(self.url.clone()))?
        })
    }

    fn describe(&self) -> String {
        self.url.to_string()
    }
}

/// Accepts the persisted snapshot shape, so an exported `bookmarks.json`
/// can be fed straight back in as a source.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonForestParser;

impl DocumentParser for JsonForestParser {
    fn parse(&self, raw: &str) -> Result<Vec<BookmarkNode>, SourceError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// `http://` and `https://` values become an [`HttpSource`] bounded by
/// `timeout`, anything else is read as a local path.
pub fn source_from_spec(
    spec: &str,
    timeout: Duration,
) -> Result<Box<dyn BookmarkSource>, SourceError> {
    let trimmed = spec.trim();
    let lowered = trimmed.to_ascii_lowercase();
    if lowered.starts_with("http://") || lowered.starts_with("https://") {
        let source = HttpSource::new(Url::parse(trimmed)?).with_timeout(timeout);
        return Ok(Box::new(source));
    }
    Ok(Box::new(FileSource::new(trimmed)))
}
