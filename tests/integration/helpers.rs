//! Shared fixtures for the integration tests

use spiderdb::crawler::{
    crawl_sites_with, crawl_urls_with, CrawlReport, HttpTransport, InterruptHandle, NoopExtractor,
};
use spiderdb::{CrawlConfig, SqliteStore, Store};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use wiremock::{Request, Respond, ResponseTemplate};

/// A configuration tuned for fast tests: no default delay, short timeout
pub fn test_config() -> CrawlConfig {
    let mut config = CrawlConfig::with_user_agent("TestBot/1.0");
    config.threads = 4;
    config.default_crawl_delay = 0.0;
    config.timeout_seconds = 5;
    config.follow_links = false;
    config
}

pub fn new_store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open_in_memory().unwrap())
}

/// Runs a URLS-mode crawl on a blocking thread
pub async fn run_crawl_urls(
    config: CrawlConfig,
    store: Arc<SqliteStore>,
    seeds: Vec<String>,
) -> CrawlReport {
    tokio::task::spawn_blocking(move || {
        let transport = HttpTransport::new(&config).unwrap();
        let store: Arc<dyn Store> = store;
        crawl_urls_with(
            config,
            store,
            Box::new(transport),
            Box::new(NoopExtractor),
            InterruptHandle::new(),
            None,
            &seeds,
        )
        .unwrap()
    })
    .await
    .unwrap()
}

/// Runs a SITES-mode crawl on a blocking thread
pub async fn run_crawl_sites(
    config: CrawlConfig,
    store: Arc<SqliteStore>,
    hosts: Vec<String>,
) -> CrawlReport {
    tokio::task::spawn_blocking(move || {
        let transport = HttpTransport::new(&config).unwrap();
        let store: Arc<dyn Store> = store;
        crawl_sites_with(
            config,
            store,
            Box::new(transport),
            Box::new(NoopExtractor),
            InterruptHandle::new(),
            None,
            &hosts,
        )
        .unwrap()
    })
    .await
    .unwrap()
}

/// The normalized form of a URL, as the store keys it
pub fn normalized(url: &str) -> String {
    spiderdb::url::normalize_url(url).unwrap().to_string()
}

/// Responder that records the instant of every request it serves
pub struct RecordingResponder {
    times: Arc<Mutex<Vec<Instant>>>,
    template: ResponseTemplate,
}

impl RecordingResponder {
    pub fn new(template: ResponseTemplate) -> (Self, Arc<Mutex<Vec<Instant>>>) {
        let times = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                times: Arc::clone(&times),
                template,
            },
            times,
        )
    }
}

impl Respond for RecordingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.times.lock().unwrap().push(Instant::now());
        self.template.clone()
    }
}

/// Responder that fails the first N requests, then succeeds
pub struct FailThenSucceed {
    remaining_failures: AtomicUsize,
    failure: ResponseTemplate,
    success: ResponseTemplate,
    pub served: Arc<AtomicUsize>,
}

impl FailThenSucceed {
    pub fn new(failures: usize, failure: ResponseTemplate, success: ResponseTemplate) -> Self {
        Self {
            remaining_failures: AtomicUsize::new(failures),
            failure,
            success,
            served: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Respond for FailThenSucceed {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.served.fetch_add(1, Ordering::SeqCst);

        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures.store(remaining - 1, Ordering::SeqCst);
            self.failure.clone()
        } else {
            self.success.clone()
        }
    }
}

/// Responder that counts how many times it was hit
pub struct CountingResponder {
    pub count: Arc<AtomicUsize>,
    template: ResponseTemplate,
}

impl CountingResponder {
    pub fn new(template: ResponseTemplate) -> (Self, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        (
            Self {
                count: Arc::clone(&count),
                template,
            },
            count,
        )
    }
}

impl Respond for CountingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.template.clone()
    }
}

/// Minimum gap between consecutive recorded instants
pub fn min_gap(times: &[Instant]) -> Option<std::time::Duration> {
    let mut sorted = times.to_vec();
    sorted.sort();
    sorted.windows(2).map(|w| w[1] - w[0]).min()
}
