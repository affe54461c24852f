//! SQLite implementation of the host-store contract

use crate::crawler::ErrorKind;
use crate::sitemap::DiscoveredUrl;
use crate::storage::schema::initialize_schema;
use crate::storage::{BatchOutcome, PageRecord, StorageError, StorageResult, Store};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQLite storage backend
///
/// The connection mutex is the single-writer lock: batch writes, cache
/// updates, and reads all serialize through it.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the crawl database at the given path
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for testing)
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Fetches a stored row for assertions in tests and diagnostics
    pub fn get_result(&self, url: &str) -> StorageResult<Option<StoredResult>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT url, http_status, body, content_type, error, error_type,
                        final_url, redirect_count, crawled_at
                 FROM crawl_results WHERE url = ?1",
                params![url],
                |row| {
                    Ok(StoredResult {
                        url: row.get(0)?,
                        http_status: row.get(1)?,
                        body: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        content_type: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                        error: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                        error_type: row.get(5)?,
                        final_url: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                        redirect_count: row.get(7)?,
                        crawled_at: row.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }
}

/// A row read back from `crawl_results`
#[derive(Debug, Clone)]
pub struct StoredResult {
    pub url: String,
    pub http_status: i32,
    pub body: String,
    pub content_type: String,
    pub error: String,
    pub error_type: String,
    pub final_url: String,
    pub redirect_count: u32,
    pub crawled_at: String,
}

impl StoredResult {
    pub fn error_kind(&self) -> Option<ErrorKind> {
        ErrorKind::from_db_string(&self.error_type)
    }
}

impl Store for SqliteStore {
    fn write_batch(&self, rows: &[PageRecord]) -> StorageResult<BatchOutcome> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut outcome = BatchOutcome::default();

        {
            let mut exists_stmt =
                tx.prepare_cached("SELECT 1 FROM crawl_results WHERE url = ?1")?;
            let mut insert_stmt = tx.prepare_cached(
                "INSERT INTO crawl_results (
                    url, surt_key, http_status, body, content_type, elapsed_ms,
                    crawled_at, error, error_type, etag, last_modified,
                    content_hash, final_url, redirect_count,
                    jsonld, opengraph, meta, hydration, js
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                           ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
            )?;
            let mut update_stmt = tx.prepare_cached(
                "UPDATE crawl_results SET
                    surt_key = ?2, http_status = ?3, body = ?4, content_type = ?5,
                    elapsed_ms = ?6, crawled_at = ?7, error = ?8, error_type = ?9,
                    etag = ?10, last_modified = ?11, content_hash = ?12,
                    final_url = ?13, redirect_count = ?14,
                    jsonld = ?15, opengraph = ?16, meta = ?17, hydration = ?18,
                    js = ?19
                 WHERE url = ?1",
            )?;

            for row in rows {
                let exists = exists_stmt
                    .query_row(params![row.url], |_| Ok(()))
                    .optional()?
                    .is_some();

                let values = params![
                    row.url,
                    row.surt_key,
                    row.http_status,
                    row.body,
                    row.content_type,
                    row.elapsed_ms,
                    row.crawled_at.to_rfc3339(),
                    row.error,
                    row.error_type.to_db_string(),
                    row.etag,
                    row.last_modified,
                    row.content_hash,
                    row.final_url,
                    row.redirect_count,
                    row.extracted.jsonld,
                    row.extracted.opengraph,
                    row.extracted.meta,
                    row.extracted.hydration,
                    row.extracted.js,
                ];

                if exists {
                    update_stmt.execute(values)?;
                    outcome.updated += 1;
                } else {
                    insert_stmt.execute(values)?;
                    outcome.inserted += 1;
                }
            }
        }

        tx.commit()?;
        Ok(outcome)
    }

    fn crawled_at(&self, url: &str) -> StorageResult<Option<DateTime<Utc>>> {
        let conn = self.conn.lock();
        let value: Option<String> = conn
            .query_row(
                "SELECT crawled_at FROM crawl_results WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()?;

        match value {
            None => Ok(None),
            Some(text) => DateTime::parse_from_rfc3339(&text)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(|_| StorageError::InvalidTimestamp {
                    url: url.to_string(),
                    value: text,
                }),
        }
    }

    fn cached_sitemap_urls(
        &self,
        hostname: &str,
        max_age_hours: i64,
    ) -> StorageResult<Vec<DiscoveredUrl>> {
        let cutoff = (Utc::now() - chrono::Duration::hours(max_age_hours)).to_rfc3339();
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT url, lastmod, changefreq, priority FROM sitemap_cache
             WHERE hostname = ?1 AND discovered_at > ?2
             ORDER BY url",
        )?;

        let urls = stmt
            .query_map(params![hostname, cutoff], |row| {
                Ok(DiscoveredUrl {
                    url: row.get(0)?,
                    lastmod: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    changefreq: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    priority: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(urls)
    }

    fn replace_sitemap_cache(
        &self,
        hostname: &str,
        urls: &[DiscoveredUrl],
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM sitemap_cache WHERE hostname = ?1",
            params![hostname],
        )?;

        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO sitemap_cache
                    (hostname, url, lastmod, changefreq, priority, discovered_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;

            for entry in urls {
                stmt.execute(params![
                    hostname,
                    entry.url,
                    entry.lastmod,
                    entry.changefreq,
                    entry.priority,
                    now,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn count_results(&self) -> StorageResult<u64> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM crawl_results", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
