use std::collections::BTreeMap;
use std::time::Duration;

use specforge_core::job::CrawlRequestOptions;

pub const DEFAULT_USER_AGENT: &str = "SpecForge-Crawler/1.0";

/// Per-request timeout for crawl fetches.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum redirect hops when redirects are enabled.
pub const MAX_REDIRECTS: usize = 5;

/// Transport settings for one crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOptions {
    /// Extra headers sent with every request (e.g. `Authorization`).
    pub auth_headers: BTreeMap<String, String>,
    /// Delay applied before each fetch.
    pub rate_limit: Option<Duration>,
    pub user_agent: String,
    pub follow_redirects: bool,
    pub request_timeout: Duration,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            auth_headers: BTreeMap::new(),
            rate_limit: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            follow_redirects: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl From<&CrawlRequestOptions> for CrawlOptions {
    fn from(req: &CrawlRequestOptions) -> Self {
        let defaults = Self::default();
        Self {
            auth_headers: req.auth_headers.clone(),
            rate_limit: req
                .rate_limit_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            user_agent: req
                .user_agent
                .clone()
                .filter(|ua| !ua.is_empty())
                .unwrap_or(defaults.user_agent),
            follow_redirects: req.follow_redirects.unwrap_or(true),
            request_timeout: defaults.request_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_empty_request() {
        let opts = CrawlOptions::from(&CrawlRequestOptions::default());
        assert_eq!(opts, CrawlOptions::default());
        assert_eq!(opts.user_agent, "SpecForge-Crawler/1.0");
    }

    #[test]
    fn zero_rate_limit_means_none() {
        let req = CrawlRequestOptions {
            rate_limit_ms: Some(0),
            ..Default::default()
        };
        assert_eq!(CrawlOptions::from(&req).rate_limit, None);

        let req = CrawlRequestOptions {
            rate_limit_ms: Some(250),
            follow_redirects: Some(false),
            ..Default::default()
        };
        let opts = CrawlOptions::from(&req);
        assert_eq!(opts.rate_limit, Some(Duration::from_millis(250)));
        assert!(!opts.follow_redirects);
    }
}
