//! Timestamp utilities
//!
//! All wall-clock reads in the scoring pipeline go through [`Clock`] so the
//! freshness rule and the time-boxed jobs can be driven deterministically.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Mutex;

/// Source of the current UTC time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Real wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock.
///
/// Every call to `now()` returns the current reading and then moves the clock
/// forward by `step` (zero by default), which lets a test decide exactly how
/// much time each unit of work appears to take.
#[derive(Debug)]
pub struct ManualClock {
    inner: Mutex<DateTime<Utc>>,
    step: Duration,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self::with_step(start, Duration::zero())
    }

    pub fn with_step(start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            inner: Mutex::new(start),
            step,
        }
    }

    /// Move the clock forward without reading it
    pub fn advance(&self, by: Duration) {
        let mut now = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let mut now = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let reading = *now;
        *now += self.step;
        reading
    }
}

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Storage representation: Unix milliseconds
pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Inverse of [`to_millis`]; out-of-range values clamp to the epoch
pub fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_default()
}

/// HTTP `Expires` header value, e.g. `07 Mar 2025 14:03:09 GMT`
pub fn http_expires(ts: DateTime<Utc>) -> String {
    ts.format("%d %b %Y %H:%M:%S GMT").to_string()
}
