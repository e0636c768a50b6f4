//! Staleness rule shared by the read path and the recompute orchestrator

use chrono::{DateTime, Duration, Utc};

use crate::db::ScoreRecord;

/// Default maximum record age before recomputation
pub const MAX_AGE_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    max_age: Duration,
}

impl FreshnessPolicy {
    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Whether a score must be (re)computed.
    ///
    /// True when there is no record, or when the record is strictly older
    /// than the maximum age. `depth` only influences what the calculator
    /// does, never staleness.
    pub fn needs_recomputation(
        &self,
        record: Option<&ScoreRecord>,
        _depth: u32,
        now: DateTime<Utc>,
    ) -> bool {
        match record {
            None => true,
            Some(record) => now - record.last_updated > self.max_age,
        }
    }
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self::new(Duration::days(MAX_AGE_DAYS))
    }
}
