use serde::Deserialize;

/// The maximum worker thread count the crawler will ever run with
pub const MAX_THREADS: u32 = 32;

/// Crawl configuration
///
/// Every recognized option with its default. The option names match the
/// named parameters accepted by the host's CRAWL call; a TOML file with
/// the same keys configures the CLI.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrawlConfig {
    /// User-agent string sent with every request and matched against
    /// robots.txt groups. Required; there is no default identity.
    pub user_agent: String,

    /// Number of worker threads (1..=32)
    pub threads: u32,

    /// Global cap on simultaneous connections across all domains
    pub max_total_connections: u32,

    /// Per-domain cap on simultaneous connections (only applies to
    /// domains without a robots.txt crawl delay, which are serialized)
    pub max_parallel_per_domain: u32,

    /// Per-request timeout in seconds
    pub timeout_seconds: u64,

    /// Delay between same-domain requests when robots.txt does not
    /// specify one, in seconds
    pub default_crawl_delay: f64,

    /// Lower clamp for crawl delays, in seconds
    pub min_crawl_delay: f64,

    /// Upper clamp for crawl delays, in seconds
    pub max_crawl_delay: f64,

    /// Cap on retry backoff, in seconds
    pub max_retry_backoff_seconds: u64,

    /// Honor robots.txt allow/disallow rules
    pub respect_robots_txt: bool,

    /// Skip rel="nofollow" links and honor meta-robots nofollow
    pub respect_nofollow: bool,

    /// Expand links found in fetched HTML pages
    pub follow_links: bool,

    /// Also follow rel="canonical" targets during link expansion
    pub follow_canonical: bool,

    /// Treat subdomains of a seed's domain as in-scope for link expansion
    pub allow_subdomains: bool,

    /// Maximum link depth from a seed
    pub max_crawl_depth: u32,

    /// Maximum number of pages fetched in one crawl
    pub max_crawl_pages: u64,

    /// Responses larger than this many bytes are discarded
    pub max_response_bytes: u64,

    /// Comma-separated content-type whitelist with wildcard patterns
    /// ("text/*"); empty accepts everything
    pub accept_content_types: String,

    /// Comma-separated content-type blacklist, applied after the whitelist
    pub reject_content_types: String,

    /// Request gzip/brotli response compression
    pub compress: bool,

    /// Sitemap discovery cache lifetime in hours
    pub sitemap_cache_hours: i64,

    /// Re-fetch URLs whose sitemap metadata marks them stale
    pub update_stale: bool,

    /// SQL LIKE pattern restricting which discovered URLs are fetched;
    /// empty fetches everything
    pub url_filter: String,

    /// Emit a synthetic row (status -1) for robots-disallowed URLs
    pub log_skipped: bool,

    /// Rows per bulk insert (1..=100)
    pub batch_size: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            user_agent: String::new(),
            threads: default_threads(),
            max_total_connections: 16,
            max_parallel_per_domain: 4,
            timeout_seconds: 30,
            default_crawl_delay: 1.0,
            min_crawl_delay: 0.0,
            max_crawl_delay: 60.0,
            max_retry_backoff_seconds: 600,
            respect_robots_txt: true,
            respect_nofollow: true,
            follow_links: true,
            follow_canonical: false,
            allow_subdomains: false,
            max_crawl_depth: 10,
            max_crawl_pages: 1000,
            max_response_bytes: 10 * 1024 * 1024,
            accept_content_types: String::new(),
            reject_content_types: String::new(),
            compress: true,
            sitemap_cache_hours: 24,
            update_stale: false,
            url_filter: String::new(),
            log_skipped: true,
            batch_size: 100,
        }
    }
}

impl CrawlConfig {
    /// Creates a validated configuration with the given user agent and
    /// defaults for everything else
    pub fn with_user_agent(user_agent: &str) -> Self {
        Self {
            user_agent: user_agent.to_string(),
            ..Default::default()
        }
    }
}

fn default_threads() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(4)
        .clamp(1, MAX_THREADS)
}
