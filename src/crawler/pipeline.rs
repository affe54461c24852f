//! The per-entry fetch pipeline
//!
//! For one queue entry: block-deferral, robots fetch and consultation,
//! politeness admission (atomic slot reservation for delayed domains,
//! parallelism caps otherwise), the transport call under the global
//! connection limiter, outcome classification, backoff bookkeeping, and
//! link expansion.
//!
//! Locking discipline: the domain lock is held only for short critical
//! sections; the one write that must happen before the network call is the
//! slot reservation (`last_crawl_time`), which is what makes the
//! crawl-delay contract hold across threads.

use crate::config::CrawlConfig;
use crate::crawler::batcher::{ResultBatcher, WorkerBuffer};
use crate::crawler::extract::{extract_links, Extractor, MetaRobotsDetector};
use crate::crawler::interrupt::InterruptHandle;
use crate::crawler::outcome::{
    classify_status, content_type_allowed, error_kind_for_status, Disposition, ErrorKind,
};
use crate::crawler::progress::{ProgressCallback, ProgressReporter};
use crate::crawler::transport::{FetchRequest, FetchResponse, Transport};
use crate::scheduler::{
    fib_backoff, parse_retry_after, ActiveRequest, ConnectionLimiter, DomainSlot, DomainTable,
    QueueEntry, UrlQueue, UrlSource,
};
use crate::storage::{PageRecord, StorageResult, Store};
use crate::url::{authority, like_match, normalize_url, surt_key};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// Maximum retries per URL (attempts = retries + 1)
pub const MAX_RETRIES: u8 = 5;

/// Crawl-delay waits at or below this are slept inline by the worker;
/// longer waits re-queue the entry instead of tying up the thread
const MAX_INLINE_WAIT: Duration = Duration::from_millis(250);

/// Byte cap for robots.txt fetches
const ROBOTS_MAX_BYTES: u64 = 512 * 1024;

/// Acceptable skew between the server Date header and the local clock
const DATE_SANITY_WINDOW_MINS: i64 = 15;

/// Shared state for one crawl
pub struct CrawlContext {
    pub config: CrawlConfig,
    pub queue: UrlQueue,
    pub domains: DomainTable,
    pub limiter: ConnectionLimiter,
    pub transport: Box<dyn Transport>,
    pub extractor: Box<dyn Extractor>,
    pub batcher: ResultBatcher,
    pub progress: ProgressReporter,
    pub interrupt: InterruptHandle,
    meta_robots: MetaRobotsDetector,

    /// Entries enqueued but not yet terminal; the pool finishes when this
    /// reaches zero with an empty queue
    outstanding: AtomicU64,

    /// Pages fetched so far, for the max_crawl_pages cap
    pages_fetched: AtomicU64,

    /// URLs ever enqueued, for link-expansion dedup
    seen: Mutex<HashSet<String>>,
}

impl CrawlContext {
    pub fn new(
        config: CrawlConfig,
        store: Arc<dyn Store>,
        transport: Box<dyn Transport>,
        extractor: Box<dyn Extractor>,
        interrupt: InterruptHandle,
        progress_callback: Option<ProgressCallback>,
    ) -> Self {
        let batch_size = config.batch_size;
        let limiter = ConnectionLimiter::new(config.max_total_connections);
        let domains = DomainTable::new(config.clone());

        Self {
            config,
            queue: UrlQueue::new(),
            domains,
            limiter,
            transport,
            extractor,
            batcher: ResultBatcher::new(store, batch_size),
            progress: ProgressReporter::new(progress_callback),
            interrupt,
            meta_robots: MetaRobotsDetector::new(),
            outstanding: AtomicU64::new(0),
            pages_fetched: AtomicU64::new(0),
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Enqueues a brand-new entry, counting it as outstanding work
    pub fn enqueue_new(&self, entry: QueueEntry) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.progress.add_enqueued(1);
        self.queue.push(entry);
    }

    /// Re-queues an entry already counted as outstanding
    fn requeue(&self, entry: QueueEntry) {
        self.queue.push(entry);
    }

    /// Marks an entry terminal
    fn finish_entry(&self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }

    /// True when no enqueued entry is awaiting a terminal outcome
    pub fn is_idle(&self) -> bool {
        self.outstanding.load(Ordering::SeqCst) == 0
    }

    /// Records a URL as enqueued so link expansion will not add it again.
    /// Returns false if it was already known.
    pub fn mark_seen(&self, url: &str) -> bool {
        self.seen.lock().insert(url.to_string())
    }

    fn page_cap_reached(&self) -> bool {
        self.pages_fetched.load(Ordering::SeqCst) >= self.config.max_crawl_pages
    }
}

/// Runs one queue entry through the pipeline
///
/// Returns an error only for store failures, which are fatal to the crawl.
pub fn process_entry(
    ctx: &CrawlContext,
    entry: QueueEntry,
    buffer: &mut WorkerBuffer,
) -> StorageResult<()> {
    let url = match Url::parse(&entry.url) {
        Ok(url) => url,
        Err(e) => {
            // Entries are normalized before they are enqueued, so this is
            // a defect in the caller; still emit a row rather than lose
            // the URL silently
            let mut record = PageRecord::new(entry.url.clone(), String::new());
            record.http_status = 0;
            record.error = format!("Invalid URL: {}", e);
            record.error_type = ErrorKind::ParseError;
            record.is_update = entry.is_update;
            emit(ctx, buffer, record)?;
            ctx.progress.add_failed();
            ctx.finish_entry();
            return Ok(());
        }
    };

    let auth = authority(&url);
    let slot = ctx.domains.get_or_create(&auth);

    // Deferral on a domain-wide block does not consume a retry
    {
        let state = slot.state.lock();
        if let Some(until) = state.blocked_until_after(Instant::now()) {
            drop(state);
            ctx.requeue(QueueEntry {
                earliest_fetch: until,
                ..entry
            });
            return Ok(());
        }
    }

    ensure_robots(ctx, &auth, &url, &slot);

    if ctx.config.respect_robots_txt {
        let allowed = slot.state.lock().rules.is_allowed(&robots_path(&url));
        if !allowed {
            slot.state.lock().urls_skipped += 1;
            if ctx.config.log_skipped {
                let mut record = base_record(&entry, &url);
                record.http_status = -1;
                record.error = "Disallowed by robots.txt".to_string();
                record.error_type = ErrorKind::RobotsDisallowed;
                emit(ctx, buffer, record)?;
            }
            ctx.progress.add_skipped();
            ctx.finish_entry();
            return Ok(());
        }
    }

    if ctx.page_cap_reached() {
        slot.state.lock().urls_skipped += 1;
        ctx.progress.add_skipped();
        ctx.finish_entry();
        return Ok(());
    }

    // Politeness admission; None means the entry was re-queued
    let Some(active) = admit(ctx, &entry, &slot) else {
        return Ok(());
    };

    let response = {
        let _permit = ctx.limiter.acquire();
        ctx.transport.fetch(&FetchRequest {
            url: &entry.url,
            timeout: Duration::from_secs(ctx.config.timeout_seconds),
            max_bytes: ctx.config.max_response_bytes,
        })
    };

    // Release the domain's active-request slot before the (possibly
    // slow) post-processing
    drop(active);

    let disposition = classify_status(response.status);

    match disposition {
        Disposition::Retryable => handle_retryable(ctx, entry, &url, &slot, response, buffer),
        Disposition::Permanent => handle_permanent(ctx, entry, &url, &slot, response, buffer),
        Disposition::Success => handle_success(ctx, entry, &url, &slot, response, buffer),
    }
}

/// Fetches robots.txt for a domain if it is missing or expired
///
/// The per-domain robots gate serializes the fetch: one worker downloads
/// while same-domain workers wait for the rules instead of racing past
/// them. The domain state lock is never held across the fetch.
fn ensure_robots(ctx: &CrawlContext, auth: &str, url: &Url, slot: &Arc<DomainSlot>) {
    if !slot.state.lock().robots_cache_expired() {
        return;
    }

    let _gate = slot.robots_gate.lock();

    // Another worker may have fetched while we waited on the gate
    if !slot.state.lock().robots_cache_expired() {
        return;
    }

    let robots_url = format!("{}://{}/robots.txt", url.scheme(), auth);
    let response = {
        let _permit = ctx.limiter.acquire();
        ctx.transport.fetch(&FetchRequest {
            url: &robots_url,
            timeout: Duration::from_secs(ctx.config.timeout_seconds),
            max_bytes: ROBOTS_MAX_BYTES,
        })
    };

    let rules = if response.status == 200 {
        let text = String::from_utf8_lossy(&response.body);
        crate::robots::parse(&text).rules_for(&ctx.config.user_agent)
    } else {
        // Missing or unreachable robots.txt means allow-all under the
        // default delay
        if response.status <= 0 {
            tracing::warn!(
                "Failed to fetch {}: {}; crawling under default policy",
                robots_url,
                response.error
            );
        }
        Default::default()
    };

    slot.state.lock().apply_rules(rules, &ctx.config);
}

/// Admits the entry to fetch, enforcing the politeness contracts
///
/// For a domain with a robots crawl delay, requests are strictly
/// serialized: the slot is claimed by writing `last_crawl_time` under the
/// domain lock before any I/O. Short waits are slept inline; longer ones
/// re-queue the entry at the time the slot opens. Domains without a delay
/// are bounded by `max_parallel_per_domain`.
fn admit(ctx: &CrawlContext, entry: &QueueEntry, slot: &Arc<DomainSlot>) -> Option<ActiveRequest> {
    loop {
        let mut state = slot.state.lock();
        let now = Instant::now();

        if let Some(until) = state.blocked_until_after(now) {
            drop(state);
            ctx.requeue(QueueEntry {
                earliest_fetch: until,
                ..entry.clone()
            });
            return None;
        }

        if state.has_crawl_delay {
            if state.active_requests > 0 {
                // Another worker holds the serialized slot; try again
                // after roughly one delay window
                let delay = Duration::from_secs_f64(state.crawl_delay);
                drop(state);
                ctx.requeue(QueueEntry {
                    earliest_fetch: now + delay + small_jitter(),
                    ..entry.clone()
                });
                return None;
            }

            if let Some(wait) = state.time_until_slot(now) {
                if wait <= MAX_INLINE_WAIT {
                    drop(state);
                    std::thread::sleep(wait);
                    continue;
                }
                drop(state);
                ctx.requeue(QueueEntry {
                    earliest_fetch: now + wait,
                    ..entry.clone()
                });
                return None;
            }

            // Atomic slot reservation: the claim happens before the lock
            // is released, so no other thread can take this window
            state.reserve_slot(now);
            return Some(ActiveRequest::new(Arc::clone(slot)));
        }

        if state.active_requests >= ctx.config.max_parallel_per_domain {
            drop(state);
            ctx.requeue(QueueEntry {
                earliest_fetch: now + small_jitter(),
                ..entry.clone()
            });
            return None;
        }

        state.reserve_slot(now);
        return Some(ActiveRequest::new(Arc::clone(slot)));
    }
}

fn handle_retryable(
    ctx: &CrawlContext,
    entry: QueueEntry,
    url: &Url,
    slot: &Arc<DomainSlot>,
    response: FetchResponse,
    buffer: &mut WorkerBuffer,
) -> StorageResult<()> {
    let cap = Duration::from_secs(ctx.config.max_retry_backoff_seconds);

    let (until, errors) = {
        let mut state = slot.state.lock();
        let backoff = parse_retry_after(&response.retry_after, Utc::now())
            .unwrap_or_else(|| fib_backoff(state.consecutive_errors + 1, cap));
        let until = state.record_retryable(Instant::now(), backoff);
        (until, state.consecutive_errors)
    };

    let kind = if response.status <= 0 {
        response.error_kind
    } else {
        error_kind_for_status(response.status)
    };

    tracing::debug!(
        "Retryable failure for {} (status {}, {} consecutive); domain {} blocked",
        entry.url,
        response.status,
        errors,
        authority(url)
    );

    if entry.retry_count >= MAX_RETRIES {
        slot.state.lock().urls_failed += 1;

        let mut record = base_record(&entry, url);
        fill_from_response(&mut record, &response);
        record.error_type = kind;
        if record.error.is_empty() {
            record.error = format!("HTTP {} after {} retries", response.status, MAX_RETRIES);
        }
        emit(ctx, buffer, record)?;
        ctx.progress.add_failed();
        ctx.finish_entry();
        return Ok(());
    }

    ctx.requeue(QueueEntry {
        retry_count: entry.retry_count + 1,
        earliest_fetch: until,
        ..entry
    });
    Ok(())
}

fn handle_permanent(
    ctx: &CrawlContext,
    entry: QueueEntry,
    url: &Url,
    slot: &Arc<DomainSlot>,
    response: FetchResponse,
    buffer: &mut WorkerBuffer,
) -> StorageResult<()> {
    {
        let mut state = slot.state.lock();
        // The server answered; a definitive 4xx is not a reason to keep
        // the domain blocked
        state.consecutive_errors = 0;
        state.blocked_until = None;
        state.urls_failed += 1;
    }
    ctx.pages_fetched.fetch_add(1, Ordering::SeqCst);

    let mut record = base_record(&entry, url);
    fill_from_response(&mut record, &response);
    record.error = format!("HTTP {}", response.status);
    record.error_type = error_kind_for_status(response.status);
    record.crawled_at = crawl_timestamp(&response.server_date);

    ctx.progress.add_bytes(response.body.len() as u64);
    emit(ctx, buffer, record)?;
    ctx.progress.add_failed();
    ctx.finish_entry();
    Ok(())
}

fn handle_success(
    ctx: &CrawlContext,
    entry: QueueEntry,
    url: &Url,
    slot: &Arc<DomainSlot>,
    response: FetchResponse,
    buffer: &mut WorkerBuffer,
) -> StorageResult<()> {
    ctx.pages_fetched.fetch_add(1, Ordering::SeqCst);
    ctx.progress.add_bytes(response.body.len() as u64);

    let mut record = base_record(&entry, url);
    fill_from_response(&mut record, &response);
    record.crawled_at = crawl_timestamp(&response.server_date);

    // Size and content-type rejections are emitted but never retried
    if response.truncated {
        clear_politeness_failure(slot);
        slot.state.lock().urls_failed += 1;
        record.error = format!(
            "Response exceeded {} bytes and was discarded",
            ctx.config.max_response_bytes
        );
        record.error_type = ErrorKind::ContentTooLarge;
        emit(ctx, buffer, record)?;
        ctx.progress.add_failed();
        ctx.finish_entry();
        return Ok(());
    }

    if !content_type_allowed(
        &ctx.config.accept_content_types,
        &ctx.config.reject_content_types,
        &response.content_type,
    ) {
        clear_politeness_failure(slot);
        slot.state.lock().urls_failed += 1;
        record.error = format!("Content type rejected: {}", response.content_type);
        record.error_type = ErrorKind::ContentTypeRejected;
        emit(ctx, buffer, record)?;
        ctx.progress.add_failed();
        ctx.finish_entry();
        return Ok(());
    }

    let body_text = String::from_utf8_lossy(&response.body).into_owned();
    record.content_hash = hex::encode(Sha256::digest(&response.body));

    let is_html = response.content_type.contains("text/html")
        || response.content_type.contains("application/xhtml");

    let mut suppress_links = false;

    if is_html && !body_text.is_empty() {
        let meta = ctx.meta_robots.detect(&body_text);

        if meta.noindex {
            // The page asked to stay out of the index; the decision is
            // recorded but the content is not
            record.body = String::new();
        } else {
            record.extracted = ctx.extractor.extract(&body_text);
            record.body = body_text.clone();
        }

        if meta.nofollow && ctx.config.respect_nofollow {
            suppress_links = true;
        }
    } else {
        record.body = body_text.clone();
    }

    if ctx.config.follow_links
        && is_html
        && !suppress_links
        && entry.depth < ctx.config.max_crawl_depth
        && !ctx.page_cap_reached()
    {
        expand_links(ctx, url, &body_text, entry.depth);
    }

    slot.state
        .lock()
        .record_success(response.elapsed_ms as f64, &ctx.config);

    emit(ctx, buffer, record)?;
    ctx.progress.add_completed();
    ctx.finish_entry();
    Ok(())
}

/// Extracts, normalizes, scopes, filters, and enqueues links from a page
fn expand_links(ctx: &CrawlContext, base: &Url, html: &str, depth: u32) {
    let links = extract_links(
        html,
        base,
        ctx.config.follow_canonical,
        ctx.config.respect_nofollow,
    );

    for link in links {
        let Ok(normalized) = normalize_url(&link) else {
            continue;
        };

        if !in_scope(ctx, base, &normalized) {
            continue;
        }

        let text = normalized.to_string();

        if !like_match(&ctx.config.url_filter, &text) {
            continue;
        }

        if !ctx.mark_seen(&text) {
            continue;
        }

        ctx.enqueue_new(QueueEntry {
            url: text,
            retry_count: 0,
            is_update: false,
            earliest_fetch: Instant::now(),
            source: UrlSource::Link,
            depth: depth + 1,
        });
    }
}

/// A link is in scope when it shares the page's authority, or is a
/// subdomain of its host when allow_subdomains is set
fn in_scope(ctx: &CrawlContext, base: &Url, link: &Url) -> bool {
    if authority(base) == authority(link) {
        return true;
    }

    if !ctx.config.allow_subdomains {
        return false;
    }

    match (base.host_str(), link.host_str()) {
        (Some(base_host), Some(link_host)) => {
            let base_host = base_host.to_lowercase();
            let link_host = link_host.to_lowercase();
            link_host == base_host || link_host.ends_with(&format!(".{}", base_host))
        }
        _ => false,
    }
}

/// After a definitive server response, an earlier failure streak no
/// longer justifies blocking the domain
fn clear_politeness_failure(slot: &Arc<DomainSlot>) {
    let mut state = slot.state.lock();
    state.consecutive_errors = 0;
    state.blocked_until = None;
}

fn base_record(entry: &QueueEntry, url: &Url) -> PageRecord {
    let mut record = PageRecord::new(entry.url.clone(), surt_key(url));
    record.is_update = entry.is_update;
    record
}

fn fill_from_response(record: &mut PageRecord, response: &FetchResponse) {
    record.http_status = response.status;
    record.final_url = response.final_url.clone();
    record.redirect_count = response.redirect_count;
    record.content_type = response.content_type.clone();
    record.elapsed_ms = response.elapsed_ms;
    record.etag = response.etag.clone();
    record.last_modified = response.last_modified.clone();
    record.error = response.error.clone();
}

/// The crawl timestamp: the server Date header when it is within the
/// sanity window of the local clock, local time otherwise
fn crawl_timestamp(server_date: &str) -> DateTime<Utc> {
    let now = Utc::now();

    if let Ok(date) = DateTime::parse_from_rfc2822(server_date.trim()) {
        let date = date.with_timezone(&Utc);
        let skew = (date - now).num_minutes().abs();
        if skew <= DATE_SANITY_WINDOW_MINS {
            return date;
        }
    }

    now
}

/// The path (plus query) a URL presents to robots.txt matching
fn robots_path(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

fn emit(ctx: &CrawlContext, buffer: &mut WorkerBuffer, record: PageRecord) -> StorageResult<()> {
    if let Some(rows) = buffer.push(record) {
        ctx.batcher.submit(rows)?;
    }
    Ok(())
}

fn small_jitter() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(20..120))
}
