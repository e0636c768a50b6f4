//! Score store contract
//!
//! The persistent store keeps one [`ScoreRecord`] per profile and answers the
//! handful of ordered queries the read path, the orchestrator, the
//! maintenance jobs and the reports need. Failures are reported through the
//! common [`Error`](crate::Error) taxonomy so callers can tell a transient
//! timeout from a quota breach.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::{Facet, RankedRow, ScanRow, ScoreRecord};
use crate::identity::Identity;
use crate::time::to_millis;
use crate::{Error, Result};

/// Keyset position in the `(platform_id, last_updated, key)` ordering.
///
/// A scan resumed from a cursor continues with the first record strictly
/// after it, so an interrupted pass neither skips nor repeats a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCursor {
    pub platform_id: i64,
    pub last_updated_ms: i64,
    pub key: String,
}

impl From<&ScanRow> for ScanCursor {
    fn from(row: &ScanRow) -> Self {
        Self {
            platform_id: row.platform_id,
            last_updated_ms: to_millis(row.last_updated),
            key: row.key.clone(),
        }
    }
}

impl fmt::Display for ScanCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

impl FromStr for ScanCursor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Score ordering for ranked reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankOrder {
    /// Highest score first
    Worst,
    /// Lowest score first
    Best,
}

#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Record stored under an exact key
    async fn get(&self, key: &str) -> Result<Option<ScoreRecord>>;

    /// Resolve an identity: by canonical key (falling back to the current
    /// screen name) or by platform id. When a platform id is duplicated the
    /// first record in scan order is returned.
    async fn find(&self, identity: &Identity) -> Result<Option<ScoreRecord>>;

    /// Insert or replace the record under `record.key`
    async fn put(&self, record: &ScoreRecord) -> Result<()>;

    /// Delete by key; true if a row was removed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Delete every record matching the identity's key, screen name or id
    async fn delete_matching(&self, identity: &Identity) -> Result<u64>;

    /// Screen names of records last updated before `before`, oldest first
    async fn stale_screen_names(&self, before: DateTime<Utc>, limit: usize) -> Result<Vec<String>>;

    /// Next page of the `(platform_id, last_updated, key)` ordered scan
    async fn scan_platform_ids(&self, after: Option<&ScanCursor>, limit: usize) -> Result<Vec<ScanRow>>;

    /// Distinct `(screen_name, platform_id, score)` rows ordered by score
    async fn ranked(&self, order: RankOrder, limit: usize) -> Result<Vec<RankedRow>>;

    /// Facet values of the highest-scored records
    async fn facet_values(&self, facet: Facet, limit: usize) -> Result<Vec<Vec<String>>>;
}
