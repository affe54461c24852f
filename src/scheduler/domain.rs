//! Per-domain politeness state and the concurrent domain table
//!
//! Every registered authority (host:port) gets a `DomainState` guarded by
//! its own lock. The table's coarse lock covers only lookup and insertion;
//! mutation happens under the per-domain lock, and network I/O always
//! happens with both released. The one deliberate exception is the atomic
//! slot reservation: `last_crawl_time` is written under the domain lock
//! *before* the request goes out, so no other thread can claim the same
//! delay window.

use crate::config::CrawlConfig;
use crate::robots::RobotsRules;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long fetched robots.txt data stays valid
const ROBOTS_CACHE_HOURS: i64 = 24;

/// EMA smoothing factor for response times
const EMA_ALPHA: f64 = 0.2;

/// Responses needed before adaptive delay adjustments kick in
const EMA_WARMUP: u32 = 8;

/// Consecutive fast responses required before lowering the delay
const FAST_STREAK_REQUIRED: u32 = 3;

/// Politeness state for one domain
#[derive(Debug, Clone)]
pub struct DomainState {
    /// When the last request slot was claimed (monotonic)
    pub last_crawl_time: Option<Instant>,

    /// Current delay between requests, in seconds
    pub crawl_delay: f64,

    /// Floor the adaptive limiter will not lower the delay below
    pub delay_floor: f64,

    /// True when robots.txt specified a delay; such domains are strictly
    /// serialized
    pub has_crawl_delay: bool,

    /// Robots rules selected for our user agent
    pub rules: RobotsRules,

    /// True once robots.txt has been fetched for this domain
    pub robots_fetched: bool,

    /// Wall-clock fetch time, for the 24 h robots cache
    pub robots_fetched_at: Option<DateTime<Utc>>,

    /// All requests to this domain are deferred until this instant
    pub blocked_until: Option<Instant>,

    /// Retryable failures since the last success
    pub consecutive_errors: u32,

    /// Requests currently in flight
    pub active_requests: u32,

    /// Exponential moving average of response times, in milliseconds
    pub ema_response_ms: f64,

    /// Responses folded into the EMA so far
    pub response_count: u32,

    /// Consecutive responses faster than half the EMA
    fast_streak: u32,

    pub urls_crawled: u32,
    pub urls_failed: u32,
    pub urls_skipped: u32,
}

impl DomainState {
    /// Creates a fresh state under the default policy
    pub fn new(config: &CrawlConfig) -> Self {
        let delay = config
            .default_crawl_delay
            .clamp(config.min_crawl_delay, config.max_crawl_delay);

        Self {
            last_crawl_time: None,
            crawl_delay: delay,
            delay_floor: config.min_crawl_delay,
            has_crawl_delay: false,
            rules: RobotsRules::default(),
            robots_fetched: false,
            robots_fetched_at: None,
            blocked_until: None,
            consecutive_errors: 0,
            active_requests: 0,
            ema_response_ms: 0.0,
            response_count: 0,
            fast_streak: 0,
            urls_crawled: 0,
            urls_failed: 0,
            urls_skipped: 0,
        }
    }

    /// True when robots.txt needs to be (re-)fetched
    pub fn robots_cache_expired(&self) -> bool {
        if !self.robots_fetched {
            return true;
        }
        match self.robots_fetched_at {
            Some(at) => Utc::now() - at > chrono::Duration::hours(ROBOTS_CACHE_HOURS),
            None => true,
        }
    }

    /// Installs robots rules for this domain and derives the crawl delay
    ///
    /// The effective delay is the stricter of Crawl-delay and the
    /// Request-rate-derived value, clamped into the configured bounds.
    /// When robots.txt sets no delay, the default applies and the domain
    /// is not serialized.
    pub fn apply_rules(&mut self, rules: RobotsRules, config: &CrawlConfig) {
        self.has_crawl_delay = rules.has_crawl_delay();

        let delay = rules
            .effective_delay()
            .unwrap_or(config.default_crawl_delay)
            .clamp(config.min_crawl_delay, config.max_crawl_delay);

        self.crawl_delay = delay;
        self.delay_floor = if self.has_crawl_delay {
            delay
        } else {
            config.min_crawl_delay
        };
        self.rules = rules;
        self.robots_fetched = true;
        self.robots_fetched_at = Some(Utc::now());
    }

    /// Returns the block expiry when the domain is currently blocked
    pub fn blocked_until_after(&self, now: Instant) -> Option<Instant> {
        self.blocked_until.filter(|until| *until > now)
    }

    /// Time remaining until the next crawl-delay slot opens, if any
    pub fn time_until_slot(&self, now: Instant) -> Option<Duration> {
        let last = self.last_crawl_time?;
        let ready = last + Duration::from_secs_f64(self.crawl_delay);
        if now < ready {
            Some(ready - now)
        } else {
            None
        }
    }

    /// Claims a request slot: stamps `last_crawl_time` and counts the
    /// request as active. Callers hold the domain lock and have already
    /// verified the slot is open.
    pub fn reserve_slot(&mut self, now: Instant) {
        self.last_crawl_time = Some(now);
        self.active_requests += 1;
    }

    /// Releases an active request slot
    pub fn release_slot(&mut self) {
        self.active_requests = self.active_requests.saturating_sub(1);
    }

    /// Records a successful response and adapts the crawl delay
    ///
    /// Clears any block and error streak. After the EMA warm-up, a
    /// response slower than twice the average raises the delay by 1.5x
    /// (capped); a sustained run of responses faster than half the
    /// average lowers it by 0.9x down to the floor.
    pub fn record_success(&mut self, response_ms: f64, config: &CrawlConfig) {
        self.consecutive_errors = 0;
        self.blocked_until = None;
        self.urls_crawled += 1;

        if self.response_count == 0 {
            self.ema_response_ms = response_ms;
        } else {
            self.ema_response_ms = EMA_ALPHA * response_ms + (1.0 - EMA_ALPHA) * self.ema_response_ms;
        }
        self.response_count += 1;

        if self.response_count <= EMA_WARMUP {
            return;
        }

        if response_ms > 2.0 * self.ema_response_ms {
            self.fast_streak = 0;
            self.crawl_delay = (self.crawl_delay * 1.5).min(config.max_crawl_delay);
        } else if response_ms < 0.5 * self.ema_response_ms {
            self.fast_streak += 1;
            if self.fast_streak >= FAST_STREAK_REQUIRED {
                self.crawl_delay = (self.crawl_delay * 0.9).max(self.delay_floor);
            }
        } else {
            self.fast_streak = 0;
        }
    }

    /// Records a retryable failure and blocks the whole domain until the
    /// backoff expires. Returns the block expiry.
    pub fn record_retryable(&mut self, now: Instant, backoff: Duration) -> Instant {
        self.consecutive_errors += 1;
        let until = now + backoff;
        self.blocked_until = Some(until);
        until
    }
}

/// One domain's slot in the table
///
/// `state` guards all politeness fields. `robots_gate` serializes robots
/// fetching so that only one worker downloads robots.txt for a domain
/// while the others wait for the rules instead of racing past them.
pub struct DomainSlot {
    pub state: Mutex<DomainState>,
    pub robots_gate: Mutex<()>,
}

/// RAII guard for an active request reservation
///
/// Dropping the guard releases the slot on every exit path, including
/// panics and early returns.
pub struct ActiveRequest {
    slot: Arc<DomainSlot>,
}

impl ActiveRequest {
    pub fn new(slot: Arc<DomainSlot>) -> Self {
        Self { slot }
    }
}

impl Drop for ActiveRequest {
    fn drop(&mut self) {
        self.slot.state.lock().release_slot();
    }
}

/// Concurrent map of authority -> domain state
///
/// The map lock is held only for lookup and insertion; all state
/// mutation goes through the per-domain lock.
pub struct DomainTable {
    map: Mutex<HashMap<String, Arc<DomainSlot>>>,
    config: CrawlConfig,
}

impl DomainTable {
    pub fn new(config: CrawlConfig) -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Returns the slot for an authority, creating it lazily under the
    /// default policy
    pub fn get_or_create(&self, authority: &str) -> Arc<DomainSlot> {
        let mut map = self.map.lock();
        Arc::clone(map.entry(authority.to_string()).or_insert_with(|| {
            Arc::new(DomainSlot {
                state: Mutex::new(DomainState::new(&self.config)),
                robots_gate: Mutex::new(()),
            })
        }))
    }

    /// Returns the slot for an authority if one exists
    pub fn try_get(&self, authority: &str) -> Option<Arc<DomainSlot>> {
        self.map.lock().get(authority).map(Arc::clone)
    }

    /// Pre-seeds a domain with robots rules obtained during sitemap
    /// discovery, so the crawl phase does not re-fetch robots.txt
    pub fn seed_from_discovery(&self, authority: &str, rules: RobotsRules) {
        let slot = self.get_or_create(authority);
        let mut state = slot.state.lock();
        if !state.robots_fetched {
            state.apply_rules(rules, &self.config);
        }
    }

    /// Snapshot of (authority, crawled, failed, skipped) counters
    pub fn counters(&self) -> Vec<(String, u32, u32, u32)> {
        let map = self.map.lock();
        map.iter()
            .map(|(authority, slot)| {
                let state = slot.state.lock();
                (
                    authority.clone(),
                    state.urls_crawled,
                    state.urls_failed,
                    state.urls_skipped,
                )
            })
            .collect()
    }
}
