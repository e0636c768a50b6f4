//! Service wiring shared by `serve`, `run-job` and the API tests

use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use repscore_common::cache::MemoryCache;
use repscore_common::calculator::KeywordCalculator;
use repscore_common::config::Config;
use repscore_common::db::SqliteScoreStore;
use repscore_common::fetch::ProfileSource;
use repscore_common::jobs::{DuplicateCleanup, JobScheduler, StalenessRefresh};
use repscore_common::orchestrator::Recomputer;
use repscore_common::queue::{ChannelQueue, RecomputeQueue, RecomputeRequest, RecomputeWorker};
use repscore_common::service::ScoreService;
use repscore_common::store::ScoreStore;
use repscore_common::time::Clock;

use crate::AppState;

/// Everything a process needs, built once from the configuration
pub struct Services {
    pub state: AppState,
    pub cache: Arc<MemoryCache>,
    pub worker: RecomputeWorker,
    /// Receiving end of the recompute queue, consumed by `worker`
    pub requests: mpsc::UnboundedReceiver<RecomputeRequest>,
    pub scheduler: JobScheduler,
}

impl Services {
    pub fn build(
        config: &Config,
        db: SqlitePool,
        source: Arc<dyn ProfileSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let jobs = &config.jobs;
        let policy = config.freshness_policy();
        let store: Arc<dyn ScoreStore> = Arc::new(SqliteScoreStore::new(db.clone()));
        let calculator = Arc::new(KeywordCalculator::new(config.scoring.rules.clone()));

        let (channel, requests) = ChannelQueue::new();
        let recomputer = Recomputer::new(store.clone(), source, calculator, policy, clock.clone());
        let worker = RecomputeWorker::new(
            recomputer,
            channel.clone(),
            jobs.worker_concurrency,
            jobs.max_attempts,
            Duration::from_secs(jobs.retry_delay_secs),
        );
        let queue: Arc<dyn RecomputeQueue> = Arc::new(channel);

        let cache = Arc::new(MemoryCache::with_clock(clock.clone()));
        let service = ScoreService::new(
            cache.clone(),
            store.clone(),
            queue.clone(),
            policy,
            clock.clone(),
        );

        let scheduler = JobScheduler::new(
            StalenessRefresh::new(
                store.clone(),
                queue,
                chrono::Duration::hours(jobs.refresh_min_age_hours),
                jobs.refresh_batch,
            ),
            DuplicateCleanup::new(store.clone(), jobs.cleanup_page_size),
            db,
            clock,
            jobs.clone(),
        );

        Self {
            state: AppState::new(service, store, config.reports.known_websites.clone()),
            cache,
            worker,
            requests,
            scheduler,
        }
    }
}
