//! Retry backoff: the Fibonacci schedule and Retry-After parsing

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Computes the Fibonacci backoff for a consecutive error count
///
/// The sequence starts at (3, 3) seconds: 3, 3, 6, 9, 15, 24, 39, ...
/// and is capped at `cap`. An error count of zero gets the first value.
/// The result is monotone non-decreasing in the error count.
pub fn fib_backoff(consecutive_errors: u32, cap: Duration) -> Duration {
    let mut a: u64 = 3;
    let mut b: u64 = 3;

    for _ in 1..consecutive_errors.max(1) {
        let next = a.saturating_add(b);
        a = b;
        b = next;

        if Duration::from_secs(a) >= cap {
            break;
        }
    }

    Duration::from_secs(a).min(cap)
}

/// Parses a Retry-After header value into a wait duration
///
/// Accepts delta-seconds ("120") or an HTTP-date (RFC 2822, e.g.
/// "Wed, 21 Oct 2015 07:28:00 GMT"). A date in the past yields a zero
/// wait. Returns None for unparseable values.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&Utc) - now;
    Some(Duration::from_secs(delta.num_seconds().max(0) as u64))
}
