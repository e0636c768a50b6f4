//! Recomputation orchestrator
//!
//! Fetches a profile and its timeline, runs the calculator and writes the
//! result. Every invocation performs at most one store write (create or
//! update) plus deletes, either for vanished profiles or for a record whose
//! handle has been taken over by a different account. Recomputing twice with the
//! same upstream data converges on the same grades, so redelivered requests
//! are harmless.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::calculator::{extract_facets, ScoreCalculator};
use crate::db::ScoreRecord;
use crate::fetch::{FetchError, Profile, ProfileSource, Timeline};
use crate::freshness::FreshnessPolicy;
use crate::identity::{canonical_key, Identity};
use crate::store::ScoreStore;
use crate::time::Clock;
use crate::Result;

/// Result of one recomputation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Outcome {
    /// New record written
    Created,
    /// Stale record rewritten; `regraded` is false when no timeline could be
    /// fetched and grades (and `last_updated`) were left untouched
    Updated { regraded: bool },
    /// Fresh record, or profile suspended upstream
    Skipped,
    /// Profile gone upstream; `removed` records deleted
    Deleted { removed: u64 },
    /// Transient upstream failure; retry later
    Deferred { reason: String },
}

impl Outcome {
    pub fn is_deferred(&self) -> bool {
        matches!(self, Outcome::Deferred { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Created => write!(f, "created"),
            Outcome::Updated { .. } => write!(f, "updated"),
            Outcome::Skipped => write!(f, "skipped"),
            Outcome::Deleted { .. } => write!(f, "deleted"),
            Outcome::Deferred { .. } => write!(f, "deferred"),
        }
    }
}

#[derive(Clone)]
pub struct Recomputer {
    store: Arc<dyn ScoreStore>,
    source: Arc<dyn ProfileSource>,
    calculator: Arc<dyn ScoreCalculator>,
    policy: FreshnessPolicy,
    clock: Arc<dyn Clock>,
}

impl Recomputer {
    pub fn new(
        store: Arc<dyn ScoreStore>,
        source: Arc<dyn ProfileSource>,
        calculator: Arc<dyn ScoreCalculator>,
        policy: FreshnessPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            source,
            calculator,
            policy,
            clock,
        }
    }

    /// Bring the stored score for `identity` up to date.
    ///
    /// Store failures are returned as errors (transient ones are
    /// retryable); upstream failures are folded into the [`Outcome`].
    pub async fn recompute(&self, identity: &Identity, depth: u32) -> Result<Outcome> {
        let existing = self.store.find(identity).await?;
        let now = self.clock.now();

        if !self.policy.needs_recomputation(existing.as_ref(), depth, now) {
            return Ok(Outcome::Skipped);
        }

        let profile = match self.source.fetch_profile(identity).await {
            Ok(profile) => profile,
            Err(FetchError::NotFound(_)) => {
                warn!(identity = %identity, "Profile does not exist");
                let mut removed = self.store.delete_matching(identity).await?;
                if let Some(record) = &existing {
                    removed += self
                        .store
                        .delete_matching(&Identity::PlatformId(record.platform_id))
                        .await?;
                }
                info!(identity = %identity, removed, "Deleted old score");
                return Ok(Outcome::Deleted { removed });
            }
            Err(FetchError::Suspended(_)) => {
                warn!(identity = %identity, "Profile has been suspended");
                return Ok(Outcome::Skipped);
            }
            Err(FetchError::Transient(reason)) => {
                warn!(identity = %identity, reason = %reason, "Profile fetch failed, deferring");
                return Ok(Outcome::Deferred { reason });
            }
        };

        let timeline = self.source.fetch_timeline(identity).await;

        match existing {
            None => self.create(profile, timeline, depth, now).await,
            Some(record) if record.platform_id != profile.platform_id => {
                // The handle was renamed away and taken by another account:
                // the stored record describes a different profile.
                warn!(
                    identity = %identity,
                    stored_platform_id = record.platform_id,
                    platform_id = profile.platform_id,
                    "Handle now belongs to another account, replacing record"
                );
                self.store.delete(&record.key).await?;
                self.create(profile, timeline, depth, now).await
            }
            Some(mut record) => {
                record.screen_name = profile.screen_name.clone();
                let regraded = match timeline {
                    Some(timeline) => {
                        record.grades = self.calculator.score(&profile, Some(&timeline), depth);
                        record.score = record.grades.total();
                        let (hashtags, websites) = extract_facets(Some(&timeline));
                        record.hashtags = hashtags;
                        record.websites = websites;
                        record.timeline_text = Some(timeline.raw);
                        record.last_updated = now;
                        true
                    }
                    None => {
                        // Keep the record stale so the next refresh pass retries it
                        warn!(identity = %identity, "Timeline unavailable, grades left unchanged");
                        false
                    }
                };
                record.profile_text = profile.raw;
                self.store.put(&record).await?;
                info!(screen_name = %record.screen_name, regraded, "Updated score entry");
                Ok(Outcome::Updated { regraded })
            }
        }
    }

    async fn create(
        &self,
        profile: Profile,
        timeline: Option<Timeline>,
        depth: u32,
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        let grades = self.calculator.score(&profile, timeline.as_ref(), depth);
        let (hashtags, websites) = extract_facets(timeline.as_ref());
        let record = ScoreRecord {
            key: canonical_key(&profile.screen_name),
            screen_name: profile.screen_name.clone(),
            platform_id: profile.platform_id,
            last_updated: now,
            score: grades.total(),
            grades,
            profile_text: profile.raw,
            timeline_text: timeline.map(|t| t.raw),
            hashtags,
            websites,
        };
        self.store.put(&record).await?;
        info!(screen_name = %record.screen_name, score = record.score, "Created new score entry");
        Ok(Outcome::Created)
    }
}
