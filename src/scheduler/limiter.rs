//! Global connection limiter
//!
//! A counting semaphore bounding simultaneous connections across all
//! domains. Workers acquire a permit around the HTTP call; the RAII
//! permit releases on every exit path.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

struct Inner {
    available: Mutex<u32>,
    cond: Condvar,
}

/// Counting semaphore for the `max_total_connections` cap
#[derive(Clone)]
pub struct ConnectionLimiter {
    inner: Arc<Inner>,
    capacity: u32,
}

/// RAII permit; releases its connection slot on drop
pub struct ConnectionPermit {
    inner: Arc<Inner>,
}

impl ConnectionLimiter {
    pub fn new(capacity: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                available: Mutex::new(capacity),
                cond: Condvar::new(),
            }),
            capacity,
        }
    }

    /// Blocks until a connection slot is free
    pub fn acquire(&self) -> ConnectionPermit {
        let mut available = self.inner.available.lock();
        while *available == 0 {
            self.inner.cond.wait(&mut available);
        }
        *available -= 1;
        ConnectionPermit {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Takes a slot if one is free, without blocking
    pub fn try_acquire(&self) -> Option<ConnectionPermit> {
        let mut available = self.inner.available.lock();
        if *available == 0 {
            return None;
        }
        *available -= 1;
        Some(ConnectionPermit {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Slots currently in use
    pub fn in_use(&self) -> u32 {
        self.capacity - *self.inner.available.lock()
    }
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        let mut available = self.inner.available.lock();
        *available += 1;
        drop(available);
        self.inner.cond.notify_one();
    }
}
