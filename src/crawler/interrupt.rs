//! Cooperative cancellation
//!
//! A process-wide flag checked by workers between queue pops and after
//! I/O. The first interrupt requests a graceful stop: workers finish
//! their in-flight request, batches flush, and partial results persist.
//! A second interrupt within the grace window asks for an immediate
//! process exit; the decision is returned to the caller (the CLI) so the
//! library itself never terminates the process.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Window in which a second interrupt escalates to a hard exit
const HARD_EXIT_WINDOW: Duration = Duration::from_secs(3);

/// What the caller should do after delivering an interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// Let workers wind down and flush
    Graceful,

    /// Terminate the process immediately
    HardExit,
}

struct Inner {
    interrupted: AtomicBool,
    first_at: Mutex<Option<Instant>>,
}

/// Shared interrupt flag
#[derive(Clone)]
pub struct InterruptHandle {
    inner: Arc<Inner>,
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                interrupted: AtomicBool::new(false),
                first_at: Mutex::new(None),
            }),
        }
    }

    /// Delivers an interrupt and reports how to react
    ///
    /// The first call flips the flag and starts the grace window. A
    /// second call within the window escalates; a later one restarts it.
    pub fn interrupt(&self) -> InterruptAction {
        self.inner.interrupted.store(true, Ordering::SeqCst);

        let mut first_at = self.inner.first_at.lock();
        let now = Instant::now();

        match *first_at {
            Some(at) if now.duration_since(at) <= HARD_EXIT_WINDOW => InterruptAction::HardExit,
            _ => {
                *first_at = Some(now);
                InterruptAction::Graceful
            }
        }
    }

    /// True once any interrupt has been delivered
    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::SeqCst)
    }
}

impl Default for InterruptHandle {
    fn default() -> Self {
        Self::new()
    }
}
