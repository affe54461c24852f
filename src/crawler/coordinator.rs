//! Crawl orchestration
//!
//! The two entry points mirror the host's CRAWL modes:
//! - `crawl_urls`: seed URLs are fetched directly (and links expanded
//!   when configured)
//! - `crawl_sites`: hostnames are expanded through sitemap discovery,
//!   staleness-evaluated against the store, and then fetched
//!
//! Both build a `CrawlContext`, seed the queue, run the worker pool,
//! drain the batcher, and report the row counts.

use crate::config::{validate, CrawlConfig};
use crate::crawler::extract::{Extractor, NoopExtractor};
use crate::crawler::interrupt::InterruptHandle;
use crate::crawler::outcome::ErrorKind;
use crate::crawler::pipeline::CrawlContext;
use crate::crawler::progress::ProgressCallback;
use crate::crawler::transport::{HttpTransport, Transport};
use crate::crawler::worker::run_workers;
use crate::scheduler::{QueueEntry, UrlSource};
use crate::sitemap::{discover_host, evaluate, DiscoveredUrl, Freshness};
use crate::storage::{PageRecord, Store};
use crate::url::{like_match, normalize_url};
use crate::{CrawlError, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

/// Counts returned by a crawl
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlReport {
    /// Rows inserted into the store
    pub inserted: u64,

    /// Rows updated in the store
    pub updated: u64,

    /// URLs that reached a successful terminal outcome
    pub completed: u64,

    /// URLs that failed permanently or exhausted their retries
    pub failed: u64,

    /// URLs skipped (robots, staleness, filters, caps)
    pub skipped: u64,
}

impl CrawlReport {
    /// The count the CRAWL call returns to the user
    pub fn rows_written(&self) -> u64 {
        self.inserted + self.updated
    }
}

/// Crawls a list of seed URLs with the default transport and extractor
pub fn crawl_urls(
    config: CrawlConfig,
    store: Arc<dyn Store>,
    seeds: &[String],
) -> Result<CrawlReport> {
    let transport = HttpTransport::new(&config)?;
    crawl_urls_with(
        config,
        store,
        Box::new(transport),
        Box::new(NoopExtractor),
        InterruptHandle::new(),
        None,
        seeds,
    )
}

/// Crawls a list of seed URLs with explicit collaborators
pub fn crawl_urls_with(
    mut config: CrawlConfig,
    store: Arc<dyn Store>,
    transport: Box<dyn Transport>,
    extractor: Box<dyn Extractor>,
    interrupt: InterruptHandle,
    progress_callback: Option<ProgressCallback>,
    seeds: &[String],
) -> Result<CrawlReport> {
    validate(&mut config)?;

    let follow_links = config.follow_links;
    let ctx = Arc::new(CrawlContext::new(
        config,
        Arc::clone(&store),
        transport,
        extractor,
        interrupt,
        progress_callback,
    ));

    let mut enqueued: u64 = 0;
    for seed in seeds {
        match normalize_url(seed) {
            Ok(url) => {
                let text = url.to_string();
                if !ctx.mark_seen(&text) {
                    continue;
                }

                let is_update = match store.crawled_at(&text)? {
                    Some(_) if !ctx.config.update_stale => {
                        tracing::debug!("Skipping already-crawled seed {}", text);
                        ctx.progress.add_skipped();
                        continue;
                    }
                    Some(_) => true,
                    None => false,
                };

                ctx.enqueue_new(QueueEntry {
                    url: text,
                    retry_count: 0,
                    is_update,
                    earliest_fetch: Instant::now(),
                    source: UrlSource::Seed,
                    depth: 0,
                });
                enqueued += 1;
            }
            Err(e) => {
                // A malformed seed still gets a row so the output table
                // records the decision
                tracing::warn!("Rejecting malformed seed {}: {}", seed, e);
                let mut record = PageRecord::new(seed.clone(), String::new());
                record.error = format!("Invalid URL: {}", e);
                record.error_type = ErrorKind::ParseError;
                record.crawled_at = Utc::now();
                ctx.batcher.submit(vec![record]).map_err(CrawlError::from)?;
                ctx.progress.add_failed();
            }
        }
    }

    if !follow_links {
        ctx.progress.set_total(enqueued);
    }

    finish_crawl(&ctx)
}

/// Expands hostnames through sitemap discovery and crawls the results
pub fn crawl_sites(
    config: CrawlConfig,
    store: Arc<dyn Store>,
    hosts: &[String],
) -> Result<CrawlReport> {
    let transport = HttpTransport::new(&config)?;
    crawl_sites_with(
        config,
        store,
        Box::new(transport),
        Box::new(NoopExtractor),
        InterruptHandle::new(),
        None,
        hosts,
    )
}

/// SITES-mode crawl with explicit collaborators
pub fn crawl_sites_with(
    mut config: CrawlConfig,
    store: Arc<dyn Store>,
    transport: Box<dyn Transport>,
    extractor: Box<dyn Extractor>,
    interrupt: InterruptHandle,
    progress_callback: Option<ProgressCallback>,
    hosts: &[String],
) -> Result<CrawlReport> {
    validate(&mut config)?;

    let follow_links = config.follow_links;
    let ctx = Arc::new(CrawlContext::new(
        config,
        Arc::clone(&store),
        transport,
        extractor,
        interrupt,
        progress_callback,
    ));

    let discovered = discover_all(&ctx, &store, hosts);
    let enqueued = enqueue_discovered(&ctx, &store, discovered)?;

    if !follow_links {
        ctx.progress.set_total(enqueued);
    }

    finish_crawl(&ctx)
}

/// Runs sitemap discovery for every host, in parallel threads bounded by
/// the worker count
fn discover_all(
    ctx: &Arc<CrawlContext>,
    store: &Arc<dyn Store>,
    hosts: &[String],
) -> Vec<DiscoveredUrl> {
    if hosts.is_empty() {
        return Vec::new();
    }

    let parallelism = (ctx.config.threads as usize).min(hosts.len()).max(1);

    std::thread::scope(|scope| {
        let mut handles = Vec::new();

        for chunk in hosts.chunks(hosts.len().div_ceil(parallelism)) {
            let ctx = Arc::clone(ctx);
            let store = Arc::clone(store);
            handles.push(scope.spawn(move || {
                let mut found = Vec::new();
                for host in chunk {
                    if ctx.interrupt.is_interrupted() {
                        break;
                    }
                    found.extend(discover_host(
                        host,
                        &*ctx.transport,
                        &*store,
                        &ctx.domains,
                        &ctx.limiter,
                        &ctx.config,
                    ));
                }
                found
            }));
        }

        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap_or_default())
            .collect()
    })
}

/// Evaluates staleness for discovered URLs and enqueues the work:
/// all NEW URLs first, then STALE ones (when updating), FRESH omitted
fn enqueue_discovered(
    ctx: &Arc<CrawlContext>,
    store: &Arc<dyn Store>,
    discovered: Vec<DiscoveredUrl>,
) -> Result<u64> {
    let now = Utc::now();
    let mut new_urls: Vec<String> = Vec::new();
    let mut stale_urls: Vec<String> = Vec::new();

    for entry in discovered {
        let Ok(url) = normalize_url(&entry.url) else {
            tracing::warn!("Skipping malformed sitemap URL {}", entry.url);
            continue;
        };
        let text = url.to_string();

        if !like_match(&ctx.config.url_filter, &text) {
            continue;
        }

        let existing = store.crawled_at(&text)?;
        match evaluate(existing, &entry.lastmod, &entry.changefreq, now) {
            Freshness::New => new_urls.push(text),
            Freshness::Stale if ctx.config.update_stale => stale_urls.push(text),
            Freshness::Stale | Freshness::Fresh => {
                ctx.progress.add_skipped();
            }
        }
    }

    let mut enqueued = 0;
    for (urls, is_update) in [(new_urls, false), (stale_urls, true)] {
        for url in urls {
            if !ctx.mark_seen(&url) {
                continue;
            }
            ctx.enqueue_new(QueueEntry {
                url,
                retry_count: 0,
                is_update,
                earliest_fetch: Instant::now(),
                source: UrlSource::Sitemap,
                depth: 0,
            });
            enqueued += 1;
        }
    }

    Ok(enqueued)
}

/// Runs the pool, drains the batcher, and assembles the report
fn finish_crawl(ctx: &Arc<CrawlContext>) -> Result<CrawlReport> {
    run_workers(ctx);
    ctx.queue.shutdown();

    ctx.batcher.flush().map_err(CrawlError::from)?;

    if let Some(message) = ctx.batcher.failure() {
        tracing::error!("Crawl aborted by store failure: {}", message);
    }

    ctx.progress.report_final();

    let totals = ctx.batcher.totals();
    let progress = ctx.progress.snapshot();

    if ctx.interrupt.is_interrupted() {
        tracing::info!(
            "Crawl interrupted; {} rows persisted",
            totals.inserted + totals.updated
        );
    }

    Ok(CrawlReport {
        inserted: totals.inserted,
        updated: totals.updated,
        completed: progress.completed,
        failed: progress.failed,
        skipped: progress.skipped,
    })
}
