//! Database schema definitions

/// SQL schema for the crawl database
pub const SCHEMA_SQL: &str = r#"
-- One row per crawled URL; the URL is the row identity for the
-- INSERT-or-UPDATE path
CREATE TABLE IF NOT EXISTS crawl_results (
    url TEXT PRIMARY KEY,
    surt_key TEXT NOT NULL,
    http_status INTEGER NOT NULL,
    body TEXT,
    content_type TEXT,
    elapsed_ms INTEGER NOT NULL DEFAULT 0,
    crawled_at TEXT NOT NULL,
    error TEXT,
    error_type TEXT NOT NULL DEFAULT 'NONE',
    etag TEXT,
    last_modified TEXT,
    content_hash TEXT,
    final_url TEXT,
    redirect_count INTEGER NOT NULL DEFAULT 0,
    jsonld TEXT,
    opengraph TEXT,
    meta TEXT,
    hydration TEXT,
    js TEXT
);

CREATE INDEX IF NOT EXISTS idx_crawl_results_surt ON crawl_results(surt_key);
CREATE INDEX IF NOT EXISTS idx_crawl_results_status ON crawl_results(http_status);

-- Sitemap discovery cache, persisted across crawls
CREATE TABLE IF NOT EXISTS sitemap_cache (
    hostname TEXT NOT NULL,
    url TEXT NOT NULL,
    lastmod TEXT,
    changefreq TEXT,
    priority TEXT,
    discovered_at TEXT NOT NULL,
    PRIMARY KEY (hostname, url)
);

CREATE INDEX IF NOT EXISTS idx_sitemap_cache_host ON sitemap_cache(hostname);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)
}
