//! In-memory fetcher for tests.
//!
//! Enabled for this crate's unit tests and, through the `testing` feature,
//! for other crates' test suites.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use url::Url;

use crate::fetch::{FetchError, FetchedPage, FetcherFactory, PageFetcher};
use crate::options::CrawlOptions;

type FetchHook = Box<dyn Fn(&Url) + Send + Sync>;

#[derive(Debug, Clone)]
struct StaticPage {
    content_type: String,
    body: String,
}

/// Serves a fixed set of pages and records every URL it is asked for.
///
/// Unknown URLs answer with HTTP 404.
#[derive(Default)]
pub struct StaticFetcher {
    pages: HashMap<String, StaticPage>,
    fetched: Mutex<Vec<String>>,
    built_with: Mutex<Vec<CrawlOptions>>,
    hook: Mutex<Option<FetchHook>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, content_type: &str, body: impl Into<String>) -> Self {
        self.pages.insert(
            url.to_string(),
            StaticPage {
                content_type: content_type.to_string(),
                body: body.into(),
            },
        );
        self
    }

    /// An HTML page whose body is one anchor per link.
    pub fn html(self, url: &str, links: &[&str]) -> Self {
        self.page(url, "text/html; charset=utf-8", html_page(links))
    }

    pub fn json(self, url: &str, value: &serde_json::Value) -> Self {
        self.page(url, "application/json", value.to_string())
    }

    /// Run `hook` at the start of every fetch, before the page is returned.
    pub fn set_hook(&self, hook: impl Fn(&Url) + Send + Sync + 'static) {
        *self.hook.lock().unwrap_or_else(|e| e.into_inner()) = Some(Box::new(hook));
    }

    /// Every URL fetched so far, in order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetched().iter().filter(|u| *u == url).count()
    }

    /// Options passed to [`FetcherFactory::build`], one entry per build.
    pub fn built_with(&self) -> Vec<CrawlOptions> {
        self.built_with
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Minimal HTML document linking to each of `links`.
pub fn html_page(links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!("<a href=\"{href}\">{href}</a>\n"))
        .collect();
    format!("<html><body>\n{anchors}</body></html>")
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        self.fetched
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());

        if let Some(hook) = self
            .hook
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            hook(url);
        }

        match self.pages.get(url.as_str()) {
            Some(page) => Ok(FetchedPage {
                url: url.clone(),
                status: 200,
                content_type: Some(page.content_type.clone()),
                body: page.body.clone(),
            }),
            None => Err(FetchError::HttpStatus {
                status: 404,
                url: url.to_string(),
            }),
        }
    }
}

impl FetcherFactory for Arc<StaticFetcher> {
    fn build(&self, options: &CrawlOptions) -> Result<Arc<dyn PageFetcher>, FetchError> {
        self.built_with
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(options.clone());
        let fetcher: Arc<dyn PageFetcher> = self.clone();
        Ok(fetcher)
    }
}
