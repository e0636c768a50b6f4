//! Score read path
//!
//! Cache first, then the store. Misses and stale hits schedule a
//! recomputation out of band; the reader always gets a well-formed payload,
//! never an internal error.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::cache::{Cache, NEGATIVE_TTL, POSITIVE_TTL};
use crate::db::{Grades, ScoreRecord};
use crate::freshness::FreshnessPolicy;
use crate::identity::Identity;
use crate::queue::RecomputeQueue;
use crate::store::ScoreStore;
use crate::time::Clock;

/// Depth requested by on-demand lookups
const LOOKUP_DEPTH: u32 = 0;

/// Serialized response plus the HTTP expiry hint
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreLookup {
    pub body: String,
    /// Set only when the payload was produced (not served from cache)
    pub expires: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct ScorePayload<'a> {
    screen_name: &'a str,
    platform_id: i64,
    last_updated: String,
    score: f64,
    grades: &'a Grades,
}

impl<'a> From<&'a ScoreRecord> for ScorePayload<'a> {
    fn from(record: &'a ScoreRecord) -> Self {
        Self {
            screen_name: &record.screen_name,
            platform_id: record.platform_id,
            last_updated: record.last_updated.to_rfc3339(),
            score: record.score,
            grades: &record.grades,
        }
    }
}

#[derive(Clone)]
pub struct ScoreService {
    cache: Arc<dyn Cache>,
    store: Arc<dyn ScoreStore>,
    queue: Arc<dyn RecomputeQueue>,
    policy: FreshnessPolicy,
    clock: Arc<dyn Clock>,
}

impl ScoreService {
    pub fn new(
        cache: Arc<dyn Cache>,
        store: Arc<dyn ScoreStore>,
        queue: Arc<dyn RecomputeQueue>,
        policy: FreshnessPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache,
            store,
            queue,
            policy,
            clock,
        }
    }

    pub async fn lookup(&self, identity: &Identity) -> ScoreLookup {
        let cache_key = identity.cache_key();
        if let Some(body) = self.cache.get(&cache_key).await {
            return ScoreLookup { body, expires: None };
        }

        let now = self.clock.now();
        match self.store.find(identity).await {
            Ok(Some(record)) => {
                let body = match serde_json::to_string(&ScorePayload::from(&record)) {
                    Ok(body) => body,
                    Err(e) => {
                        warn!(identity = %identity, error = %e, "Could not encode score");
                        return ScoreLookup {
                            body: no_data(identity),
                            expires: None,
                        };
                    }
                };
                self.cache.set(&cache_key, body.clone(), POSITIVE_TTL).await;
                if self.policy.needs_recomputation(Some(&record), LOOKUP_DEPTH, now) {
                    self.schedule(identity).await;
                }
                ScoreLookup {
                    body,
                    expires: Some(now + Duration::days(1)),
                }
            }
            Ok(None) => {
                let body = no_data(identity);
                self.cache.set(&cache_key, body.clone(), NEGATIVE_TTL).await;
                self.schedule(identity).await;
                ScoreLookup {
                    body,
                    expires: Some(now + negative_expiry(identity)),
                }
            }
            Err(e) => {
                warn!(identity = %identity, error = %e, "Score lookup failed");
                ScoreLookup {
                    body: no_data(identity),
                    expires: None,
                }
            }
        }
    }

    async fn schedule(&self, identity: &Identity) {
        if let Err(e) = self.queue.schedule(identity.clone(), LOOKUP_DEPTH).await {
            warn!(identity = %identity, error = %e, "Could not schedule recomputation");
        }
    }
}

/// Downstream expiry for "no data yet": names are retried sooner than ids
fn negative_expiry(identity: &Identity) -> Duration {
    match identity {
        Identity::ScreenName(_) => Duration::seconds(2),
        Identity::PlatformId(_) => Duration::seconds(60),
    }
}

fn no_data(identity: &Identity) -> String {
    match identity {
        Identity::ScreenName(name) => json!({ "screen_name": name, "last_updated": null }),
        Identity::PlatformId(id) => json!({ "platform_id": id, "last_updated": null }),
    }
    .to_string()
}
