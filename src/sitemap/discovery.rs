//! Per-host sitemap discovery
//!
//! Discovery runs before the crawl in SITES mode. For each hostname it
//! checks the persistent cache, then robots.txt `Sitemap:` directives,
//! then a bruteforce list of common sitemap locations, and finally
//! expands sitemap indexes recursively. Individual fetch failures
//! downgrade to warnings; a host proceeds with whatever was found.

use crate::config::CrawlConfig;
use crate::crawler::{FetchRequest, Transport};
use crate::scheduler::{ConnectionLimiter, DomainTable};
use crate::sitemap::parser::{self, SitemapData};
use crate::storage::Store;
use crate::url::normalize_url;
use std::collections::HashSet;
use std::time::Duration;

/// Bound on nested sitemap-index expansion
const MAX_SITEMAP_DEPTH: u32 = 4;

/// Byte cap for sitemap fetches
const SITEMAP_MAX_BYTES: u64 = 50 * 1024 * 1024;

/// Common sitemap locations probed when robots.txt names none
pub const COMMON_SITEMAP_PATHS: &[&str] = &[
    "/sitemap.xml",
    "/sitemap_index.xml",
    "/sitemap-index.xml",
    "/sitemapindex.xml",
    "/sitemap/sitemap.xml",
    "/sitemaps/sitemap.xml",
    "/sitemap1.xml",
    "/sitemap-1.xml",
    "/post-sitemap.xml",
    "/page-sitemap.xml",
    "/product-sitemap.xml",
    "/category-sitemap.xml",
    "/wp-sitemap.xml",
];

/// One URL found through sitemap discovery, with its metadata
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredUrl {
    pub url: String,
    pub lastmod: String,
    pub changefreq: String,
    pub priority: String,
}

/// Discovers the sitemap URLs for one hostname
///
/// Fresh cache rows win; otherwise robots.txt directives, then the
/// bruteforce list. Everything discovered is persisted back to the cache.
/// Robots rules fetched along the way pre-seed the domain table so the
/// crawl phase does not fetch robots.txt again.
pub fn discover_host(
    host: &str,
    transport: &dyn Transport,
    store: &dyn Store,
    domains: &DomainTable,
    limiter: &ConnectionLimiter,
    config: &CrawlConfig,
) -> Vec<DiscoveredUrl> {
    let (base, auth) = host_base(host);

    match store.cached_sitemap_urls(&auth, config.sitemap_cache_hours) {
        Ok(cached) if !cached.is_empty() => {
            tracing::debug!("Using {} cached sitemap URLs for {}", cached.len(), auth);
            return cached;
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("Sitemap cache lookup failed for {}: {}", auth, e),
    }

    let mut results: Vec<DiscoveredUrl> = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut stack: Vec<(String, u32)> = Vec::new();

    // robots.txt names sitemaps and, as a side effect, gives us the
    // politeness rules for this host
    let robots_url = format!("{}/robots.txt", base);
    let response = fetch(transport, limiter, config, &robots_url);
    if response.status == 200 {
        let text = String::from_utf8_lossy(&response.body);
        let data = crate::robots::parse(&text);
        domains.seed_from_discovery(&auth, data.rules_for(&config.user_agent));
        for sitemap in data.sitemaps {
            stack.push((sitemap, 0));
        }
    }

    if stack.is_empty() {
        // Probe the usual suspects; the first parseable hit wins
        for path in COMMON_SITEMAP_PATHS {
            let probe_url = format!("{}{}", base, path);
            let response = fetch(transport, limiter, config, &probe_url);
            if response.status != 200 {
                continue;
            }
            let data = parser::parse(&response.body);
            if data.is_empty() {
                continue;
            }
            tracing::debug!("Bruteforce found sitemap at {}", probe_url);
            visited.insert(visit_key(&probe_url));
            expand(data, 0, &mut stack, &mut results);
            break;
        }
    }

    while let Some((sitemap_url, depth)) = stack.pop() {
        if depth > MAX_SITEMAP_DEPTH {
            tracing::warn!(
                "Sitemap nesting exceeded depth {} at {}, skipping",
                MAX_SITEMAP_DEPTH,
                sitemap_url
            );
            continue;
        }

        if !visited.insert(visit_key(&sitemap_url)) {
            continue;
        }

        let response = fetch(transport, limiter, config, &sitemap_url);
        if response.status != 200 {
            tracing::warn!(
                "Sitemap fetch failed for {} (status {}): {}",
                sitemap_url,
                response.status,
                response.error
            );
            continue;
        }

        expand(parser::parse(&response.body), depth, &mut stack, &mut results);
    }

    dedup(&mut results);

    if !results.is_empty() {
        if let Err(e) = store.replace_sitemap_cache(&auth, &results) {
            tracing::warn!("Failed to persist sitemap cache for {}: {}", auth, e);
        }
    }

    tracing::info!("Discovered {} sitemap URLs for {}", results.len(), auth);
    results
}

/// Folds parsed sitemap data into the expansion state
fn expand(
    data: SitemapData,
    depth: u32,
    stack: &mut Vec<(String, u32)>,
    results: &mut Vec<DiscoveredUrl>,
) {
    if data.is_index {
        for nested in data.nested {
            stack.push((nested, depth + 1));
        }
    } else {
        results.extend(data.urls.into_iter().map(|entry| DiscoveredUrl {
            url: entry.loc,
            lastmod: entry.lastmod,
            changefreq: entry.changefreq,
            priority: entry.priority,
        }));
    }
}

fn fetch(
    transport: &dyn Transport,
    limiter: &ConnectionLimiter,
    config: &CrawlConfig,
    url: &str,
) -> crate::crawler::FetchResponse {
    let _permit = limiter.acquire();
    transport.fetch(&FetchRequest {
        url,
        timeout: Duration::from_secs(config.timeout_seconds),
        max_bytes: SITEMAP_MAX_BYTES,
    })
}

/// Splits a SITES argument into a base URL and an authority
///
/// Accepts a bare hostname ("example.com", assumed https) or a full
/// origin ("http://example.com:8080").
pub fn host_base(host: &str) -> (String, String) {
    let with_scheme = if host.contains("://") {
        host.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", host.trim_end_matches('/'))
    };

    let auth = match normalize_url(&with_scheme) {
        Ok(url) => crate::url::authority(&url),
        Err(_) => host.to_lowercase(),
    };

    (with_scheme, auth)
}

/// Cycle-detection key: the normalized URL when parseable
fn visit_key(url: &str) -> String {
    normalize_url(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

fn dedup(results: &mut Vec<DiscoveredUrl>) {
    let mut seen = HashSet::new();
    results.retain(|entry| seen.insert(entry.url.clone()));
}
