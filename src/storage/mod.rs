//! Result persistence: the host-store contract and its SQLite backend
//!
//! The store is single-writer: all mutation goes through one connection
//! guarded by a mutex, and batches are written transactionally. Two tables
//! persist across runs: `crawl_results` (one row per URL) and
//! `sitemap_cache` (discovery results keyed by hostname and URL).

mod schema;
mod store;

pub use schema::{initialize_schema, SCHEMA_SQL};
pub use store::{SqliteStore, StoredResult};

use crate::crawler::{ErrorKind, ExtractedData};
use crate::sitemap::DiscoveredUrl;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Storage-specific errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid stored timestamp for {url}: {value}")]
    InvalidTimestamp { url: String, value: String },
}

/// Result type alias for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// One crawl result row
#[derive(Debug, Clone)]
pub struct PageRecord {
    /// Normalized URL (row identity)
    pub url: String,

    /// SURT key for sortable storage
    pub surt_key: String,

    /// URL after redirects, as reported by the transport
    pub final_url: String,

    /// Redirect hops taken
    pub redirect_count: u32,

    /// HTTP status; -1 is the synthetic robots-disallowed marker
    pub http_status: i32,

    /// Response body (empty when filtered or disallowed)
    pub body: String,

    /// Content-Type header value
    pub content_type: String,

    /// Wall-clock time of the fetch
    pub elapsed_ms: i64,

    /// Crawl timestamp: the server Date header when sane, local otherwise
    pub crawled_at: DateTime<Utc>,

    /// Human-readable error message, empty on success
    pub error: String,

    /// Error class for the `error_type` column
    pub error_type: ErrorKind,

    /// ETag header value
    pub etag: String,

    /// Last-Modified header value
    pub last_modified: String,

    /// SHA-256 of the response body, hex-encoded
    pub content_hash: String,

    /// True when this row updates an existing one
    pub is_update: bool,

    /// Opaque extractor output, stored as-is
    pub extracted: ExtractedData,
}

impl PageRecord {
    /// Creates an empty record for a URL
    pub fn new(url: String, surt_key: String) -> Self {
        Self {
            url,
            surt_key,
            final_url: String::new(),
            redirect_count: 0,
            http_status: 0,
            body: String::new(),
            content_type: String::new(),
            elapsed_ms: 0,
            crawled_at: Utc::now(),
            error: String::new(),
            error_type: ErrorKind::None,
            etag: String::new(),
            last_modified: String::new(),
            content_hash: String::new(),
            is_update: false,
            extracted: ExtractedData::default(),
        }
    }
}

/// Counts from one batch write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub inserted: u64,
    pub updated: u64,
}

/// Host-store contract
///
/// The crawler depends only on this trait; `SqliteStore` is the provided
/// backend. Implementations must accept batches of up to 100 rows and
/// write them transactionally.
pub trait Store: Send + Sync {
    /// Writes a batch of rows, inserting new URLs and updating existing
    /// ones. Returns the insert/update counts.
    fn write_batch(&self, rows: &[PageRecord]) -> StorageResult<BatchOutcome>;

    /// Returns the stored crawl timestamp for a URL, if any
    fn crawled_at(&self, url: &str) -> StorageResult<Option<DateTime<Utc>>>;

    /// Returns cached sitemap URLs for a hostname that are younger than
    /// `max_age_hours`
    fn cached_sitemap_urls(
        &self,
        hostname: &str,
        max_age_hours: i64,
    ) -> StorageResult<Vec<DiscoveredUrl>>;

    /// Replaces the cached sitemap URLs for a hostname
    fn replace_sitemap_cache(
        &self,
        hostname: &str,
        urls: &[DiscoveredUrl],
    ) -> StorageResult<()>;

    /// Total number of result rows
    fn count_results(&self) -> StorageResult<u64>;
}
