//! Anchor extraction from HTML pages.

use std::collections::HashSet;

use scraper::{Html, Selector};
use url::Url;

/// Normalize a URL for crawling: drop the fragment, reject non-HTTP schemes.
pub fn normalize(mut url: Url) -> Option<Url> {
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

/// Absolute, de-duplicated `a[href]` targets of an HTML page, in document order.
///
/// Relative links resolve against `base`. Unparseable and non-HTTP links are
/// dropped.
pub fn extract_links(html: &str, base: &Url) -> Vec<Url> {
    let selector = match Selector::parse("a[href]") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    let document = Html::parse_document(html);

    let mut seen = HashSet::new();
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .filter_map(normalize)
        .filter(|url| seen.insert(url.as_str().to_string()))
        .collect()
}
