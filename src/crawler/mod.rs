//! The crawl engine: transport, fetch pipeline, worker pool, batching,
//! progress, and cancellation
//!
//! `coordinator` wires everything together; the other submodules are the
//! pieces: `transport` talks HTTP, `pipeline` processes one queue entry
//! under the politeness contracts, `worker` runs the thread pool,
//! `batcher` moves results to the store, `outcome` classifies responses,
//! `extract` handles the extractor seam and link expansion.

mod batcher;
mod coordinator;
mod extract;
mod interrupt;
mod outcome;
mod pipeline;
mod progress;
mod transport;
mod worker;

pub use batcher::{ResultBatcher, WorkerBuffer, WORKER_BUFFER_ROWS};
pub use coordinator::{crawl_sites, crawl_sites_with, crawl_urls, crawl_urls_with, CrawlReport};
pub use extract::{
    extract_links, ExtractedData, Extractor, MetaRobots, MetaRobotsDetector, NoopExtractor,
};
pub use interrupt::{InterruptAction, InterruptHandle};
pub use outcome::{
    classify_status, content_type_allowed, error_kind_for_status, Disposition, ErrorKind,
};
pub use pipeline::{process_entry, CrawlContext, MAX_RETRIES};
pub use progress::{ProgressCallback, ProgressReporter, ProgressSnapshot};
pub use transport::{FetchRequest, FetchResponse, HttpTransport, Transport};
pub use worker::run_workers;
