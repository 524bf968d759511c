//! Crawl checkpoint data types.
//!
//! A [`CrawlCheckpoint`] is a snapshot of one crawl's progress. It is stored
//! on the job when a crawl is interrupted and consumed by the next attempt.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// A URL still waiting to be visited, with the depth it was discovered at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUrl {
    pub url: String,
    pub depth: u32,
}

impl PendingUrl {
    pub fn new(url: impl Into<String>, depth: u32) -> Self {
        Self {
            url: url.into(),
            depth,
        }
    }
}

/// Snapshot of a crawl: what was visited, what remains, what was found.
///
/// Persisted as `{visited: string[], pending: {url, depth}[], specs: string[]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlCheckpoint {
    pub visited: Vec<String>,
    pub pending: Vec<PendingUrl>,
    pub specs: Vec<String>,
}

impl CrawlCheckpoint {
    /// Whether no pending URL has already been visited.
    pub fn is_disjoint(&self) -> bool {
        let visited: HashSet<&str> = self.visited.iter().map(String::as_str).collect();
        self.pending
            .iter()
            .all(|entry| !visited.contains(entry.url.as_str()))
    }

    /// Drop pending entries that were already visited or appear twice,
    /// keeping the first occurrence of each URL in order.
    pub fn normalized(mut self) -> Self {
        let mut seen: HashSet<String> = self.visited.iter().cloned().collect();
        self.pending.retain(|entry| seen.insert(entry.url.clone()));
        self
    }
}
