//! Result batching between workers and the store
//!
//! Workers accumulate rows in small per-thread buffers and flush them into
//! a shared pending list; the batcher drains pending in store-sized chunks
//! under the store's single-writer lock. A store failure is fatal and is
//! surfaced to the coordinator after the failing batch.

use crate::storage::{BatchOutcome, PageRecord, StorageResult, Store};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Rows a worker buffers before handing them to the shared batcher
pub const WORKER_BUFFER_ROWS: usize = 20;

/// Per-worker result buffer
///
/// Not shared; each worker owns one and flushes it into the batcher when
/// full and once on exit.
pub struct WorkerBuffer {
    rows: Vec<PageRecord>,
}

impl WorkerBuffer {
    pub fn new() -> Self {
        Self {
            rows: Vec::with_capacity(WORKER_BUFFER_ROWS),
        }
    }

    /// Adds a row; returns the buffered rows when the buffer fills
    pub fn push(&mut self, record: PageRecord) -> Option<Vec<PageRecord>> {
        self.rows.push(record);
        if self.rows.len() >= WORKER_BUFFER_ROWS {
            Some(std::mem::take(&mut self.rows))
        } else {
            None
        }
    }

    /// Takes whatever is buffered
    pub fn drain(&mut self) -> Vec<PageRecord> {
        std::mem::take(&mut self.rows)
    }
}

impl Default for WorkerBuffer {
    fn default() -> Self {
        Self::new()
    }
}

struct BatcherInner {
    pending: Vec<PageRecord>,
    totals: BatchOutcome,
    failed: Option<String>,
}

/// Shared result batcher
pub struct ResultBatcher {
    store: Arc<dyn Store>,
    batch_size: usize,
    inner: Mutex<BatcherInner>,
}

impl ResultBatcher {
    pub fn new(store: Arc<dyn Store>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size,
            inner: Mutex::new(BatcherInner {
                pending: Vec::new(),
                totals: BatchOutcome::default(),
                failed: None,
            }),
        }
    }

    /// Adds rows to the pending list and writes any full batches
    pub fn submit(&self, rows: Vec<PageRecord>) -> StorageResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.lock();
        inner.pending.extend(rows);

        while inner.pending.len() >= self.batch_size {
            let batch: Vec<PageRecord> = inner.pending.drain(..self.batch_size).collect();
            self.write(&mut inner, batch)?;
        }

        Ok(())
    }

    /// Writes everything still pending
    pub fn flush(&self) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        while !inner.pending.is_empty() {
            let take = inner.pending.len().min(self.batch_size);
            let batch: Vec<PageRecord> = inner.pending.drain(..take).collect();
            self.write(&mut inner, batch)?;
        }
        Ok(())
    }

    fn write(&self, inner: &mut BatcherInner, batch: Vec<PageRecord>) -> StorageResult<()> {
        let batch = dedup_last_wins(batch);

        match self.store.write_batch(&batch) {
            Ok(outcome) => {
                inner.totals.inserted += outcome.inserted;
                inner.totals.updated += outcome.updated;
                Ok(())
            }
            Err(e) => {
                tracing::error!("Store insertion failed, aborting crawl: {}", e);
                inner.failed = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Running insert/update totals
    pub fn totals(&self) -> BatchOutcome {
        self.inner.lock().totals
    }

    /// The store failure message, if a write has failed
    pub fn failure(&self) -> Option<String> {
        self.inner.lock().failed.clone()
    }
}

/// Deduplicates a batch by URL; the later record wins
fn dedup_last_wins(batch: Vec<PageRecord>) -> Vec<PageRecord> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Option<PageRecord>> = Vec::with_capacity(batch.len());

    for record in batch {
        match index.get(&record.url) {
            Some(&pos) => out[pos] = Some(record),
            None => {
                index.insert(record.url.clone(), out.len());
                out.push(Some(record));
            }
        }
    }

    out.into_iter().flatten().collect()
}
