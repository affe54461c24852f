//! The extractor seam, meta-robots detection, and link extraction
//!
//! Structured-data extraction (JSON-LD, OpenGraph, JS variables) is an
//! external collaborator behind the `Extractor` trait; the crawler only
//! passes its opaque output through to storage. Meta-robots directives and
//! link extraction are handled here because they change scheduling
//! behavior.

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

/// Opaque structured data returned by an extractor collaborator
#[derive(Debug, Clone, Default)]
pub struct ExtractedData {
    pub jsonld: String,
    pub opengraph: String,
    pub meta: String,
    pub hydration: String,
    pub js: String,
}

/// Extractor collaborator contract
///
/// Implementations receive HTML text and return JSON-serializable string
/// fields that the crawler stores without interpretation.
pub trait Extractor: Send + Sync {
    fn extract(&self, html: &str) -> ExtractedData;
}

/// Default extractor that produces no structured data
pub struct NoopExtractor;

impl Extractor for NoopExtractor {
    fn extract(&self, _html: &str) -> ExtractedData {
        ExtractedData::default()
    }
}

/// Meta-robots directives found in a page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetaRobots {
    /// The page asked not to be indexed; its body is not persisted
    pub noindex: bool,

    /// The page asked for its links not to be followed
    pub nofollow: bool,
}

/// Detects `<meta name="robots">` directives with a pair of regexes,
/// covering both attribute orders
pub struct MetaRobotsDetector {
    name_first: Regex,
    content_first: Regex,
}

impl MetaRobotsDetector {
    pub fn new() -> Self {
        Self {
            name_first: Regex::new(
                r#"(?is)<meta[^>]*name\s*=\s*["']robots["'][^>]*content\s*=\s*["']([^"']*)["']"#,
            )
            .expect("meta robots regex"),
            content_first: Regex::new(
                r#"(?is)<meta[^>]*content\s*=\s*["']([^"']*)["'][^>]*name\s*=\s*["']robots["']"#,
            )
            .expect("meta robots regex"),
        }
    }

    /// Scans HTML for robots directives
    pub fn detect(&self, html: &str) -> MetaRobots {
        let content = self
            .name_first
            .captures(html)
            .or_else(|| self.content_first.captures(html))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_lowercase())
            .unwrap_or_default();

        MetaRobots {
            noindex: content.contains("noindex"),
            nofollow: content.contains("nofollow"),
        }
    }
}

impl Default for MetaRobotsDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Extracts followable links from an HTML page
///
/// Includes `<a href>` anchors and, when `follow_canonical` is set, the
/// `rel="canonical"` target. Skips `javascript:`, `mailto:`, `tel:`, and
/// `data:` schemes, fragment-only anchors, download links, and (when
/// `respect_nofollow` is set) `rel="nofollow"` anchors. Relative hrefs
/// resolve against the base URL.
pub fn extract_links(
    html: &str,
    base_url: &Url,
    follow_canonical: bool,
    respect_nofollow: bool,
) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();

    if let Ok(selector) = Selector::parse("a[href]") {
        for element in document.select(&selector) {
            if element.value().attr("download").is_some() {
                continue;
            }

            if respect_nofollow {
                let rel = element.value().attr("rel").unwrap_or("");
                if rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("nofollow")) {
                    continue;
                }
            }

            if let Some(href) = element.value().attr("href") {
                if let Some(absolute) = resolve_link(href, base_url) {
                    links.push(absolute);
                }
            }
        }
    }

    if follow_canonical {
        if let Ok(selector) = Selector::parse(r#"link[rel="canonical"][href]"#) {
            for element in document.select(&selector) {
                if let Some(href) = element.value().attr("href") {
                    if let Some(absolute) = resolve_link(href, base_url) {
                        links.push(absolute);
                    }
                }
            }
        }
    }

    links
}

/// Resolves an href to an absolute HTTP(S) URL, or None if it should be
/// excluded
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return None;
    }

    match base_url.join(href) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Some(url.to_string()),
        _ => None,
    }
}
