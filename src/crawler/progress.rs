//! Progress reporting through atomic counters
//!
//! Workers bump counters on every terminal outcome; the host observes
//! them through a callback invoked at most every 250 ms. When the total
//! is unknown (link-following mode), the percentage reports -1.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Minimum interval between progress callbacks
const REPORT_INTERVAL: Duration = Duration::from_millis(250);

/// A point-in-time view of crawl progress
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub bytes_downloaded: u64,

    /// Completion percentage, or -1.0 when the total is unknown
    pub percent: f64,
}

/// Host callback invoked with throttled progress snapshots
pub type ProgressCallback = Box<dyn Fn(&ProgressSnapshot) + Send + Sync>;

/// Atomic progress counters with a throttled callback
pub struct ProgressReporter {
    enqueued: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    bytes_downloaded: AtomicU64,

    /// Known total URL count, or None in link-following mode
    total: Mutex<Option<u64>>,

    callback: Option<ProgressCallback>,
    last_report: Mutex<Instant>,
}

impl ProgressReporter {
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            enqueued: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            bytes_downloaded: AtomicU64::new(0),
            total: Mutex::new(None),
            callback,
            last_report: Mutex::new(Instant::now() - REPORT_INTERVAL),
        }
    }

    /// Fixes the total URL count, enabling real percentages
    pub fn set_total(&self, total: u64) {
        *self.total.lock() = Some(total);
    }

    pub fn add_enqueued(&self, n: u64) {
        self.enqueued.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.maybe_report();
    }

    pub fn add_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.maybe_report();
    }

    pub fn add_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        self.maybe_report();
    }

    pub fn add_bytes(&self, n: u64) {
        self.bytes_downloaded.fetch_add(n, Ordering::Relaxed);
    }

    /// Current counter values
    pub fn snapshot(&self) -> ProgressSnapshot {
        let completed = self.completed.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let skipped = self.skipped.load(Ordering::Relaxed);

        let percent = match *self.total.lock() {
            Some(total) if total > 0 => {
                let done = (completed + failed + skipped).min(total);
                done as f64 / total as f64 * 100.0
            }
            Some(_) => 100.0,
            None => -1.0,
        };

        ProgressSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            completed,
            failed,
            skipped,
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            percent,
        }
    }

    /// Invokes the callback if the report interval has elapsed
    fn maybe_report(&self) {
        let Some(callback) = &self.callback else {
            return;
        };

        let mut last = self.last_report.lock();
        if last.elapsed() < REPORT_INTERVAL {
            return;
        }
        *last = Instant::now();
        drop(last);

        callback(&self.snapshot());
    }

    /// Invokes the callback unconditionally (end-of-crawl summary)
    pub fn report_final(&self) {
        if let Some(callback) = &self.callback {
            callback(&self.snapshot());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_counters_accumulate() {
        let reporter = ProgressReporter::new(None);
        reporter.add_enqueued(10);
        reporter.add_completed();
        reporter.add_completed();
        reporter.add_failed();
        reporter.add_skipped();
        reporter.add_bytes(4096);

        let snapshot = reporter.snapshot();
        assert_eq!(snapshot.enqueued, 10);
        assert_eq!(snapshot.completed, 2);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.skipped, 1);
        assert_eq!(snapshot.bytes_downloaded, 4096);
    }

    #[test]
    fn test_percent_unknown_total() {
        let reporter = ProgressReporter::new(None);
        reporter.add_completed();
        assert_eq!(reporter.snapshot().percent, -1.0);
    }

    #[test]
    fn test_percent_with_total() {
        let reporter = ProgressReporter::new(None);
        reporter.set_total(4);
        reporter.add_completed();
        reporter.add_failed();
        assert!((reporter.snapshot().percent - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_percent_counts_skipped() {
        let reporter = ProgressReporter::new(None);
        reporter.set_total(2);
        reporter.add_skipped();
        reporter.add_skipped();
        assert!((reporter.snapshot().percent - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_callback_throttled() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let reporter = ProgressReporter::new(Some(Box::new(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        })));

        // A burst of completions within the interval triggers one call
        for _ in 0..50 {
            reporter.add_completed();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_report_final_always_fires() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let reporter = ProgressReporter::new(Some(Box::new(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        })));

        reporter.add_completed();
        reporter.report_final();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
