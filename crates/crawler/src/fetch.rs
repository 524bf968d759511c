//! Page fetching.
//!
//! [`PageFetcher`] is the transport seam used by the engine. The production
//! implementation is [`HttpFetcher`] over `reqwest`.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use url::Url;

use crate::options::{CrawlOptions, MAX_REDIRECTS};

/// A fetched response body with the metadata needed for classification.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl FetchedPage {
    fn content_type_contains(&self, needle: &str) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains(needle))
    }

    /// Whether the response should be parsed as a JSON or YAML document.
    pub fn is_document(&self) -> bool {
        let path = self.url.path();
        self.content_type_contains("json")
            || self.content_type_contains("yaml")
            || path.ends_with(".json")
            || path.ends_with(".yaml")
            || path.ends_with(".yml")
    }

    pub fn is_html(&self) -> bool {
        self.content_type_contains("text/html")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Invalid header {0}")]
    InvalidHeader(String),
}

/// Fetches one URL.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError>;
}

/// Builds a fetcher configured for one crawl.
pub trait FetcherFactory: Send + Sync {
    fn build(&self, options: &CrawlOptions) -> Result<Arc<dyn PageFetcher>, FetchError>;
}

// ---------------------------------------------------------------------------
// HttpFetcher
// ---------------------------------------------------------------------------

/// [`PageFetcher`] over a `reqwest` client.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(options: &CrawlOptions) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &options.auth_headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| FetchError::InvalidHeader(name.clone()))?;
            let header_value =
                HeaderValue::from_str(value).map_err(|_| FetchError::InvalidHeader(name.clone()))?;
            headers.insert(header_name, header_value);
        }

        let redirect = if options.follow_redirects {
            reqwest::redirect::Policy::limited(MAX_REDIRECTS)
        } else {
            reqwest::redirect::Policy::none()
        };

        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .user_agent(options.user_agent.as_str())
            .default_headers(headers)
            .redirect(redirect)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        Ok(FetchedPage {
            url: final_url,
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

/// Builds an [`HttpFetcher`] per crawl.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpFetcherFactory;

impl FetcherFactory for HttpFetcherFactory {
    fn build(&self, options: &CrawlOptions) -> Result<Arc<dyn PageFetcher>, FetchError> {
        let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::new(options)?);
        Ok(fetcher)
    }
}
