//! Depth-bounded crawl over an explicit worklist.
//!
//! The worklist is a deque of [`PendingUrl`] entries. The front is the next
//! URL to visit and a page's links are pushed onto the front in document
//! order, which gives a depth-first pre-order walk: a parent is always
//! visited before its children.
//!
//! Cancellation is checked before every fetch. When it fires the engine
//! stops with [`CrawlError::Cancelled`] and [`CrawlerEngine::checkpoint`]
//! holds everything still to do.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use specforge_core::checkpoint::{CrawlCheckpoint, PendingUrl};
use specforge_core::openapi::{is_openapi_document, looks_like_spec_url, parse_document};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::fetch::{FetchError, FetchedPage, PageFetcher};
use crate::links::{extract_links, normalize};

/// Progress report sent after each URL is claimed for a visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlProgress {
    pub processed: usize,
    /// Grows as links are discovered. An estimate, not a cap.
    pub total: usize,
    pub url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("Crawl cancelled")]
    Cancelled,

    #[error("Invalid crawl URL {url}: {reason}")]
    InvalidSeed { url: String, reason: String },
}

/// Result of visiting one URL.
enum Visit {
    /// A spec document was found. Its links are not followed.
    Spec,
    /// An HTML page with these outgoing links.
    Links(Vec<Url>),
    /// Anything else, including per-URL failures.
    Nothing,
}

/// Crawl state for one job. Never share an engine between jobs.
pub struct CrawlerEngine {
    fetcher: Arc<dyn PageFetcher>,
    cancel: CancellationToken,
    rate_limit: Option<Duration>,

    visited: HashSet<String>,
    /// `visited` in visit order, for stable checkpoints.
    visit_order: Vec<String>,
    pending: VecDeque<PendingUrl>,
    /// URLs currently in `pending`.
    queued: HashSet<String>,
    specs: Vec<String>,
    processed: usize,
    total: usize,
}

impl CrawlerEngine {
    pub fn new(fetcher: Arc<dyn PageFetcher>, cancel: CancellationToken) -> Self {
        Self {
            fetcher,
            cancel,
            rate_limit: None,
            visited: HashSet::new(),
            visit_order: Vec::new(),
            pending: VecDeque::new(),
            queued: HashSet::new(),
            specs: Vec::new(),
            processed: 0,
            total: 0,
        }
    }

    /// Wait this long before every fetch.
    pub fn with_rate_limit(mut self, rate_limit: Option<Duration>) -> Self {
        self.rate_limit = rate_limit.filter(|d| !d.is_zero());
        self
    }

    /// Crawl from `seed`, following links up to `max_depth` hops.
    ///
    /// Returns the URLs of every OpenAPI/Swagger document found.
    pub async fn crawl(
        &mut self,
        seed: &str,
        max_depth: u32,
        on_progress: &(dyn Fn(&CrawlProgress) + Send + Sync),
    ) -> Result<Vec<String>, CrawlError> {
        let seed_url = Url::parse(seed).map_err(|e| CrawlError::InvalidSeed {
            url: seed.to_string(),
            reason: e.to_string(),
        })?;
        let seed_url = normalize(seed_url).ok_or_else(|| CrawlError::InvalidSeed {
            url: seed.to_string(),
            reason: "only http and https URLs can be crawled".into(),
        })?;

        self.visited.clear();
        self.visit_order.clear();
        self.pending.clear();
        self.queued.clear();
        self.specs.clear();
        self.processed = 0;
        self.total = 1;
        self.push_front(vec![PendingUrl::new(seed_url.as_str(), 0)]);

        tracing::info!(seed = %seed_url, max_depth, "Crawl started");
        self.run(max_depth, on_progress).await
    }

    /// Continue a crawl from a saved checkpoint.
    pub async fn resume_from_checkpoint(
        &mut self,
        checkpoint: CrawlCheckpoint,
        max_depth: u32,
        on_progress: &(dyn Fn(&CrawlProgress) + Send + Sync),
    ) -> Result<Vec<String>, CrawlError> {
        let checkpoint = checkpoint.normalized();

        self.visit_order.clear();
        self.visited.clear();
        for url in checkpoint.visited {
            if self.visited.insert(url.clone()) {
                self.visit_order.push(url);
            }
        }
        self.pending.clear();
        self.queued.clear();
        self.push_front(checkpoint.pending);
        self.specs = checkpoint.specs;
        self.processed = self.visited.len();
        self.total = self.visited.len() + self.pending.len();

        tracing::info!(
            visited = self.visited.len(),
            pending = self.pending.len(),
            specs = self.specs.len(),
            "Crawl resumed from checkpoint",
        );
        self.run(max_depth, on_progress).await
    }

    /// Snapshot of the current crawl state. `visited` and `pending` are
    /// always disjoint.
    pub fn checkpoint(&self) -> CrawlCheckpoint {
        CrawlCheckpoint {
            visited: self.visit_order.clone(),
            pending: self.pending.iter().cloned().collect(),
            specs: self.specs.clone(),
        }
    }

    pub fn specs(&self) -> &[String] {
        &self.specs
    }

    pub fn processed_count(&self) -> usize {
        self.processed
    }

    pub fn total_count(&self) -> usize {
        self.total
    }

    // ---------------------------------------------------------------------
    // Worklist
    // ---------------------------------------------------------------------

    /// Push entries onto the front, keeping their order. Entries already
    /// visited or queued are skipped. Returns how many were added.
    fn push_front(&mut self, entries: Vec<PendingUrl>) -> usize {
        let fresh: Vec<PendingUrl> = entries
            .into_iter()
            .filter(|e| !self.visited.contains(&e.url))
            .filter(|e| self.queued.insert(e.url.clone()))
            .collect();
        let added = fresh.len();
        for entry in fresh.into_iter().rev() {
            self.pending.push_front(entry);
        }
        added
    }

    fn pop_front(&mut self) -> Option<PendingUrl> {
        let entry = self.pending.pop_front()?;
        self.queued.remove(&entry.url);
        Some(entry)
    }

    /// Put an interrupted entry back as if it was never claimed.
    fn unclaim(&mut self, entry: PendingUrl) {
        if self.visited.remove(&entry.url) {
            self.visit_order.pop();
            self.processed -= 1;
        }
        self.queued.insert(entry.url.clone());
        self.pending.push_front(entry);
    }

    async fn run(
        &mut self,
        max_depth: u32,
        on_progress: &(dyn Fn(&CrawlProgress) + Send + Sync),
    ) -> Result<Vec<String>, CrawlError> {
        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(
                    visited = self.visited.len(),
                    pending = self.pending.len(),
                    "Crawl cancelled",
                );
                return Err(CrawlError::Cancelled);
            }

            let Some(entry) = self.pop_front() else {
                break;
            };
            if self.visited.contains(&entry.url) || entry.depth > max_depth {
                continue;
            }
            let url = match Url::parse(&entry.url) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(url = %entry.url, error = %e, "Skipping unparseable URL");
                    continue;
                }
            };

            self.visited.insert(entry.url.clone());
            self.visit_order.push(entry.url.clone());
            self.processed += 1;
            on_progress(&CrawlProgress {
                processed: self.processed,
                total: self.total,
                url: entry.url.clone(),
            });

            let fetched = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                result = fetch_after_delay(self.fetcher.as_ref(), &url, self.rate_limit) => Some(result),
            };
            let Some(fetched) = fetched else {
                tracing::debug!(url = %url, "Fetch interrupted by cancellation");
                self.unclaim(entry);
                continue;
            };

            match classify(&url, fetched) {
                Visit::Spec => {
                    tracing::info!(url = %url, "OpenAPI document found");
                    self.specs.push(entry.url);
                }
                Visit::Links(links) => {
                    let children = self.follow(&url, entry.depth, max_depth, links);
                    let added = self.push_front(children);
                    self.total += added;
                    tracing::debug!(url = %url, depth = entry.depth, added, "Page crawled");
                }
                Visit::Nothing => {}
            }
        }

        tracing::info!(
            visited = self.visited.len(),
            specs = self.specs.len(),
            "Crawl finished",
        );
        Ok(self.specs.clone())
    }

    /// Links from `page` worth visiting at `depth + 1`.
    ///
    /// Spec-looking links are followed across origins; other links only
    /// within the page's origin.
    fn follow(&self, page: &Url, depth: u32, max_depth: u32, links: Vec<Url>) -> Vec<PendingUrl> {
        if depth >= max_depth {
            return Vec::new();
        }
        let origin = page.origin();
        links
            .into_iter()
            .filter(|link| !self.visited.contains(link.as_str()))
            .filter(|link| looks_like_spec_url(link.as_str()) || link.origin() == origin)
            .map(|link| PendingUrl::new(String::from(link), depth + 1))
            .collect()
    }
}

async fn fetch_after_delay(
    fetcher: &dyn PageFetcher,
    url: &Url,
    delay: Option<Duration>,
) -> Result<FetchedPage, FetchError> {
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    fetcher.fetch(url).await
}

fn classify(url: &Url, fetched: Result<FetchedPage, FetchError>) -> Visit {
    let page = match fetched {
        Ok(page) => page,
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "Fetch failed");
            return Visit::Nothing;
        }
    };

    if page.is_document() {
        match parse_document(&page.body, page.url.path()) {
            Ok(doc) if is_openapi_document(&doc) => return Visit::Spec,
            Ok(_) => {}
            Err(e) => tracing::debug!(url = %url, error = %e, "Document did not parse"),
        }
    }

    if page.is_html() {
        return Visit::Links(extract_links(&page.body, &page.url));
    }
    Visit::Nothing
}
