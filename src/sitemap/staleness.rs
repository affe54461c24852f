//! Staleness evaluation for previously crawled URLs
//!
//! Given the stored crawl timestamp for a URL and the sitemap's lastmod and
//! changefreq metadata, decides whether the URL needs a fresh fetch.

use chrono::{DateTime, NaiveDate, Utc};

/// The freshness verdict for a sitemap URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No existing row; the URL has never been crawled
    New,

    /// The existing row is outdated: the sitemap reports a newer lastmod,
    /// or the row is past its changefreq window
    Stale,

    /// The existing row is current; the URL is skipped
    Fresh,
}

/// Maps a sitemap changefreq value to an expected freshness window in hours
///
/// Unknown or empty values fall back to weekly (168 hours).
pub fn changefreq_hours(changefreq: &str) -> i64 {
    match changefreq.trim().to_lowercase().as_str() {
        "always" => 0,
        "hourly" => 1,
        "daily" => 24,
        "weekly" => 168,
        "monthly" => 720,
        "yearly" => 8760,
        "never" => 87600,
        _ => 168,
    }
}

/// Parses a sitemap `<lastmod>` value
///
/// Accepts full W3C datetime (RFC 3339) or a bare `YYYY-MM-DD` date, which
/// is interpreted as midnight UTC. Returns None for anything else.
pub fn parse_lastmod(lastmod: &str) -> Option<DateTime<Utc>> {
    let value = lastmod.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Evaluates the freshness of a URL
///
/// # Arguments
///
/// * `crawled_at` - Timestamp of the existing row, or None if absent
/// * `lastmod` - The sitemap `<lastmod>` value (may be empty)
/// * `changefreq` - The sitemap `<changefreq>` value (may be empty)
/// * `now` - The current wall-clock time
pub fn evaluate(
    crawled_at: Option<DateTime<Utc>>,
    lastmod: &str,
    changefreq: &str,
    now: DateTime<Utc>,
) -> Freshness {
    let Some(crawled_at) = crawled_at else {
        return Freshness::New;
    };

    if let Some(modified) = parse_lastmod(lastmod) {
        if modified > crawled_at {
            return Freshness::Stale;
        }
    }

    let window = chrono::Duration::hours(changefreq_hours(changefreq));
    if now - crawled_at > window {
        return Freshness::Stale;
    }

    Freshness::Fresh
}
