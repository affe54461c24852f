//! Sitemap handling: XML parsing, per-host discovery, and staleness
//!
//! This module handles:
//! - Parsing sitemap and sitemap-index XML (gzip auto-detected)
//! - Locating sitemaps per host (robots.txt directives, then a bruteforce
//!   list of common paths) with a persistent discovery cache
//! - Deciding whether a previously crawled URL is stale

mod discovery;
mod parser;
mod staleness;

pub use discovery::{discover_host, DiscoveredUrl};
pub use parser::{parse, SitemapData, SitemapEntry};
pub use staleness::{changefreq_hours, evaluate, parse_lastmod, Freshness};
