//! OpenAPI document discovery by link crawling.
//!
//! One [`CrawlerEngine`] is built per crawl job. It walks an explicit
//! worklist of `(url, depth)` entries, stops cooperatively when its
//! cancellation token fires, and can snapshot and resume its state through
//! [`CrawlCheckpoint`](specforge_core::checkpoint::CrawlCheckpoint).

pub mod engine;
pub mod fetch;
pub mod links;
pub mod options;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use engine::{CrawlError, CrawlProgress, CrawlerEngine};
pub use fetch::{FetchError, FetchedPage, FetcherFactory, HttpFetcher, HttpFetcherFactory, PageFetcher};
pub use options::CrawlOptions;
