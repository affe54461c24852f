//! The worker pool
//!
//! A fixed pool of OS threads. Each worker loops on `wait_and_pop` with a
//! short timeout and runs the fetch pipeline on every entry. The pool
//! finishes when the queue is empty and no entry is awaiting a terminal
//! outcome (in-flight work may still re-queue), or when an interrupt or a
//! fatal store failure asks it to stop.

use crate::crawler::batcher::WorkerBuffer;
use crate::crawler::pipeline::{process_entry, CrawlContext};
use std::sync::Arc;
use std::time::Duration;

/// How long a worker blocks on the queue before re-checking exit
/// conditions
const POP_TIMEOUT: Duration = Duration::from_millis(250);

/// Runs the worker pool to completion
pub fn run_workers(ctx: &Arc<CrawlContext>) {
    let threads = ctx.config.threads as usize;
    tracing::debug!("Starting {} crawl workers", threads);

    let handles: Vec<_> = (0..threads)
        .map(|id| {
            let ctx = Arc::clone(ctx);
            std::thread::Builder::new()
                .name(format!("crawl-worker-{}", id))
                .spawn(move || worker_loop(&ctx, id))
                .expect("failed to spawn worker thread")
        })
        .collect();

    for handle in handles {
        if handle.join().is_err() {
            tracing::error!("A crawl worker panicked");
        }
    }
}

fn worker_loop(ctx: &CrawlContext, id: usize) {
    let mut buffer = WorkerBuffer::new();

    loop {
        if ctx.interrupt.is_interrupted() {
            tracing::debug!("Worker {} stopping on interrupt", id);
            break;
        }

        if ctx.batcher.failure().is_some() {
            break;
        }

        match ctx.queue.wait_and_pop(POP_TIMEOUT) {
            Some(entry) => {
                if let Err(e) = process_entry(ctx, entry, &mut buffer) {
                    tracing::error!("Worker {} stopping on store failure: {}", id, e);
                    break;
                }
            }
            None => {
                if ctx.queue.is_empty() && ctx.is_idle() {
                    break;
                }
            }
        }
    }

    // Hand the remaining buffered rows to the batcher; partial results
    // persist even on interrupt
    let rows = buffer.drain();
    if let Err(e) = ctx.batcher.submit(rows) {
        tracing::error!("Worker {} failed to flush its buffer: {}", id, e);
    }
}
