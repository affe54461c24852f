//! Crawl scheduling: the URL queue, per-domain politeness state, retry
//! backoff, and the global connection limiter
//!
//! The scheduler is the part of the crawler that must stay correct under
//! concurrency: its invariants (one in-flight request per delayed domain,
//! per-domain and global connection caps, domain-wide 429 blocks) hold
//! across all worker threads.

mod backoff;
mod domain;
mod limiter;
mod queue;

pub use backoff::{fib_backoff, parse_retry_after};
pub use domain::{ActiveRequest, DomainSlot, DomainState, DomainTable};
pub use limiter::{ConnectionLimiter, ConnectionPermit};
pub use queue::{QueueEntry, UrlQueue, UrlSource};
