//! spiderdb: a polite, SQL-embedded web crawler
//!
//! This crate implements a concurrent crawl scheduler that fetches sets of
//! seed URLs (or expands hostnames through their sitemaps) and persists the
//! responses into a SQL table, while enforcing per-domain politeness:
//! robots.txt rules, crawl delays, 429 blocking with Fibonacci backoff, and
//! adaptive rate limiting.

pub mod config;
pub mod crawler;
pub mod robots;
pub mod scheduler;
pub mod sitemap;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for spiderdb operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Crawl interrupted")]
    Interrupted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for spiderdb operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::CrawlConfig;
pub use crawler::{crawl_sites, crawl_urls, CrawlReport, InterruptHandle};
pub use storage::{PageRecord, SqliteStore, Store};
pub use url::{authority, normalize_url, surt_key};
