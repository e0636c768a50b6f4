//! Staleness refresh
//!
//! Schedules recomputation for the oldest records. No cursor is needed: the
//! candidate filter is relative to "now", so records refreshed by an earlier
//! run drop out of the next run's query naturally.

use std::sync::Arc;
use tracing::{info, warn};

use super::{interrupted, StopReason, TimeBudget};
use crate::identity::Identity;
use crate::queue::RecomputeQueue;
use crate::store::ScoreStore;
use crate::Result;

/// Depth requested for background refreshes
const REFRESH_DEPTH: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub scheduled: usize,
    pub stop: StopReason,
}

pub struct StalenessRefresh {
    store: Arc<dyn ScoreStore>,
    queue: Arc<dyn RecomputeQueue>,
    /// Records last updated longer ago than this are candidates
    min_age: chrono::Duration,
    batch: usize,
}

impl StalenessRefresh {
    pub fn new(
        store: Arc<dyn ScoreStore>,
        queue: Arc<dyn RecomputeQueue>,
        min_age: chrono::Duration,
        batch: usize,
    ) -> Self {
        Self {
            store,
            queue,
            min_age,
            batch,
        }
    }

    /// Schedule the oldest candidates until the batch or the budget runs out.
    /// Whether a candidate is actually recomputed is up to the freshness
    /// policy in the orchestrator.
    pub async fn run(&self, budget: &TimeBudget) -> Result<RefreshReport> {
        let cutoff = budget.started() - self.min_age;
        let mut scheduled = 0;

        let names = match self.store.stale_screen_names(cutoff, self.batch).await {
            Ok(names) => names,
            Err(e) => {
                let stop = interrupted("refresh", e, scheduled, 0)?;
                return Ok(RefreshReport { scheduled, stop });
            }
        };

        for name in names {
            info!(screen_name = %name, "Scheduling refresh");
            self.queue
                .schedule(Identity::screen_name(&name), REFRESH_DEPTH)
                .await?;
            scheduled += 1;

            if budget.exhausted() {
                warn!(scheduled, "Bailing out before timing out");
                return Ok(RefreshReport {
                    scheduled,
                    stop: StopReason::OutOfTime,
                });
            }
        }

        info!(scheduled, "Refresh pass completed");
        Ok(RefreshReport {
            scheduled,
            stop: StopReason::Completed,
        })
    }
}
