use std::future::Future;
use std::time::Duration;

use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::scrape::find_icon_href;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const DIRECT_ICON_PATH: &str = "/favicon.ico";

#[derive(Debug, Error)]
pub enum IconError {
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("url has no network origin: {0}")]
    OpaqueOrigin(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("request to {0} timed out")]
    Timeout(Url),
    #[error("{url} returned {status}")]
    Status { url: Url, status: StatusCode },
    #[error("{url} served non-image content type {content_type:?}")]
    NotImage {
        url: Url,
        content_type: Option<String>,
    },
    #[error("{0} returned an empty body")]
    Empty(Url),
    #[error("no icon link found on {0}")]
    NoIconLink(Url),
    #[error("icon not found (direct: {direct}; page: {page})")]
    NotFound {
        direct: Box<IconError>,
        page: Box<IconError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// DNS failure, connection refused or any other connect error.
    Unreachable,
    Timeout,
    /// The host answered but the response was not a usable icon.
    Rejected,
    NoIconLink,
    InvalidUrl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStage {
    DirectPath,
    PageScrape,
}

#[derive(Debug, Clone)]
pub struct IconFetch {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub source: Url,
    pub stage: AcquireStage,
}

#[derive(Clone)]
pub struct IconClient {
    http: Client,
    timeout: Duration,
}

impl IconClient {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_http(Client::new(), timeout)
    }

    pub fn with_http(http: Client, timeout: Duration) -> Self {
        Self { http, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Tries `{origin}/favicon.ico` first, then scrapes the origin's root page
    /// for an icon link. Every request gets its own deadline.
    pub async fn acquire(&self, url: &str) -> Result<IconFetch, IconError> {
        let origin = origin_of(url)?;
        let direct_url = origin.join(DIRECT_ICON_PATH)?;
        let direct = match self.fetch_image(direct_url.clone()).await {
            Ok((bytes, content_type)) => {
                return Ok(IconFetch {
                    bytes,
                    content_type,
                    source: direct_url,
                    stage: AcquireStage::DirectPath,
                });
            }
            Err(err) => {
                debug!(url, error = %err, "direct favicon attempt failed");
                err
            }
        };

        match self.scrape(&origin).await {
            Ok(fetch) => Ok(fetch),
            Err(page) => {
                debug!(url, error = %page, "page scrape attempt failed");
                Err(IconError::NotFound {
                    direct: Box::new(direct),
                    page: Box::new(page),
                })
            }
        }
    }

    async fn scrape(&self, origin: &Url) -> Result<IconFetch, IconError> {
        let html = self.fetch_page(origin.clone()).await?;
        let href = find_icon_href(&html).ok_or_else(|| IconError::NoIconLink(origin.clone()))?;
        let icon_url = origin.join(&href)?;
        let (bytes, content_type) = self.fetch_image(icon_url.clone()).await?;
        Ok(IconFetch {
            bytes,
            content_type,
            source: icon_url,
            stage: AcquireStage::PageScrape,
        })
    }

    async fn fetch_page(&self, url: Url) -> Result<String, IconError> {
        self.bounded(url.clone(), async {
            let response = self.http.get(url.clone()).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(IconError::Status { url, status });
            }
            Ok(response.text().await?)
        })
        .await
    }

    async fn fetch_image(&self, url: Url) -> Result<(Vec<u8>, Option<String>), IconError> {
        self.bounded(url.clone(), async {
            let response = self.http.get(url.clone()).send().await?;
            let content_type = validate_image_response(&url, &response)?;
            let bytes = response.bytes().await?;
            if bytes.is_empty() {
                return Err(IconError::Empty(url));
            }
            Ok((bytes.to_vec(), content_type))
        })
        .await
    }

    async fn bounded<T, F>(&self, url: Url, attempt: F) -> Result<T, IconError>
    where
        F: Future<Output = Result<T, IconError>>,
    {
        match tokio::time::timeout(self.timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(IconError::Timeout(url)),
        }
    }
}

impl Default for IconClient {
    fn default() -> Self {
        Self::new()
    }
}

impl IconError {
    pub fn kind(&self) -> FailureKind {
        match self {
            IconError::Url(_) | IconError::OpaqueOrigin(_) => FailureKind::InvalidUrl,
            IconError::Request(err) if err.is_timeout() => FailureKind::Timeout,
            IconError::Request(err) if err.is_connect() => FailureKind::Unreachable,
            IconError::Request(_) => FailureKind::Rejected,
            IconError::Timeout(_) => FailureKind::Timeout,
            IconError::Status { .. } | IconError::NotImage { .. } | IconError::Empty(_) => {
                FailureKind::Rejected
            }
            IconError::NoIconLink(_) => FailureKind::NoIconLink,
            IconError::NotFound { page, .. } => page.kind(),
        }
    }

    /// True when no attempt ever reached the host.
    pub fn is_host_unreachable(&self) -> bool {
        match self {
            IconError::NotFound { direct, page } => {
                direct.is_host_unreachable() && page.is_host_unreachable()
            }
            other => matches!(
                other.kind(),
                FailureKind::Unreachable | FailureKind::Timeout
            ),
        }
    }
}

fn origin_of(url: &str) -> Result<Url, IconError> {
    let parsed = Url::parse(url)?;
    let origin = parsed.origin();
    if !origin.is_tuple() {
        return Err(IconError::OpaqueOrigin(url.to_string()));
    }
    Ok(Url::parse(&origin.ascii_serialization())?)
}

fn validate_image_response(
    url: &Url,
    response: &reqwest::Response,
) -> Result<Option<String>, IconError> {
    let status = response.status();
    if !status.is_success() {
        return Err(IconError::Status {
            url: url.clone(),
            status,
        });
    }
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string());
    let is_image = content_type
        .as_deref()
        .is_some_and(|value| value.to_ascii_lowercase().starts_with("image/"));
    if !is_image {
        return Err(IconError::NotImage {
            url: url.clone(),
            content_type,
        });
    }
    let declared_length = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());
    if declared_length == Some(0) {
        return Err(IconError::Empty(url.clone()));
    }
    Ok(content_type)
}
