//! Time-boxed maintenance jobs
//!
//! Both jobs check a [`TimeBudget`] after every unit of work and return
//! before the budget runs out, so a recurring scheduler can simply invoke
//! them again. Expected interruptions (store timeouts, cancellation, quota)
//! end a run cleanly with a [`StopReason`]; only unexpected failures are
//! returned as errors.
//!
//! Precondition: at most one duplicate cleanup makes progress at a time.
//! [`JobScheduler`] serializes runs inside one process; running the cleanup
//! from several processes against one database is not supported.

pub mod cleanup;
pub mod refresh;

pub use cleanup::{CleanupReport, DuplicateCleanup};
pub use refresh::{RefreshReport, StalenessRefresh};

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::JobsConfig;
use crate::db::settings::{delete_setting, get_setting, set_setting, CLEANUP_CURSOR_KEY};
use crate::store::ScanCursor;
use crate::time::Clock;
use crate::{Error, Result};

/// Wall-clock allowance for one job invocation
pub struct TimeBudget {
    clock: Arc<dyn Clock>,
    started: DateTime<Utc>,
    limit: chrono::Duration,
}

impl TimeBudget {
    /// Start the budget now. The job must stop once more than
    /// `budget - margin` has elapsed.
    pub fn start(clock: Arc<dyn Clock>, budget: Duration, margin: Duration) -> Self {
        let started = clock.now();
        let limit = chrono::Duration::from_std(budget.saturating_sub(margin))
            .unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            clock,
            started,
            limit,
        }
    }

    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    /// Reads the clock once
    pub fn exhausted(&self) -> bool {
        self.clock.now() - self.started > self.limit
    }
}

/// Why a job invocation returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Ran out of work
    Completed,
    /// Stopped before exceeding the time budget
    OutOfTime,
    /// Store timed out; retried by the next invocation
    Transient,
    /// Forcibly interrupted
    Cancelled,
    /// Quota or rate limit breached; needs an operator
    ResourceExhausted,
}

impl StopReason {
    /// True when the next invocation should pick up where this one stopped
    pub fn is_resumable(self) -> bool {
        !matches!(self, StopReason::Completed)
    }
}

/// Map an expected interruption to a stop reason, logging it.
/// Unexpected errors are handed back to the caller.
pub(crate) fn interrupted(job: &str, err: Error, scanned: usize, deleted: usize) -> Result<StopReason> {
    match err {
        Error::Transient(msg) => {
            warn!(job, scanned, deleted, error = %msg, "Recovered from a timeout");
            Ok(StopReason::Transient)
        }
        Error::Cancelled(msg) => {
            warn!(job, scanned, deleted, error = %msg, "Bailing out after cancellation");
            Ok(StopReason::Cancelled)
        }
        Error::ResourceExhausted(msg) => {
            error!(job, scanned, deleted, critical = true, error = %msg, "Over quota");
            Ok(StopReason::ResourceExhausted)
        }
        other => Err(other),
    }
}

/// Load the persisted cleanup cursor; an unreadable cursor restarts the pass
pub async fn load_cleanup_cursor(db: &SqlitePool) -> Result<Option<ScanCursor>> {
    match get_setting::<ScanCursor>(db, CLEANUP_CURSOR_KEY).await {
        Ok(cursor) => Ok(cursor),
        Err(Error::Config(msg)) => {
            warn!(error = %msg, "Discarding unreadable cleanup cursor");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Persist (or clear) the cleanup cursor
pub async fn save_cleanup_cursor(db: &SqlitePool, cursor: Option<&ScanCursor>) -> Result<()> {
    match cursor {
        Some(cursor) => set_setting(db, CLEANUP_CURSOR_KEY, cursor).await,
        None => delete_setting(db, CLEANUP_CURSOR_KEY).await,
    }
}

/// Runs the maintenance jobs, either once or on a timer
#[derive(Clone)]
pub struct JobScheduler {
    refresh: Arc<StalenessRefresh>,
    cleanup: Arc<DuplicateCleanup>,
    db: SqlitePool,
    clock: Arc<dyn Clock>,
    config: JobsConfig,
    refresh_lock: Arc<Mutex<()>>,
    cleanup_lock: Arc<Mutex<()>>,
}

impl JobScheduler {
    pub fn new(
        refresh: StalenessRefresh,
        cleanup: DuplicateCleanup,
        db: SqlitePool,
        clock: Arc<dyn Clock>,
        config: JobsConfig,
    ) -> Self {
        Self {
            refresh: Arc::new(refresh),
            cleanup: Arc::new(cleanup),
            db,
            clock,
            config,
            refresh_lock: Arc::new(Mutex::new(())),
            cleanup_lock: Arc::new(Mutex::new(())),
        }
    }

    /// A fresh budget for one job invocation, started now
    pub fn budget(&self) -> TimeBudget {
        TimeBudget::start(self.clock.clone(), self.config.time_budget(), self.config.margin())
    }

    /// One staleness refresh invocation
    pub async fn run_staleness_refresh(&self) -> Result<RefreshReport> {
        let budget = self.budget();
        self.run_staleness_refresh_within(&budget).await
    }

    /// One staleness refresh invocation inside a caller-owned budget, so the
    /// caller can spend what is left on processing the scheduled work
    pub async fn run_staleness_refresh_within(&self, budget: &TimeBudget) -> Result<RefreshReport> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh.run(budget).await
    }

    /// One duplicate cleanup invocation, resuming from the stored cursor.
    ///
    /// Cursor reads and writes are classified like the scan itself: a busy
    /// or locked database ends the run with a resumable [`StopReason`]. A
    /// cursor that could not be saved only means the next run repeats some
    /// work, which the cleanup tolerates.
    pub async fn run_duplicate_cleanup(&self) -> Result<CleanupReport> {
        let _guard = self.cleanup_lock.lock().await;
        let cursor = match load_cleanup_cursor(&self.db).await {
            Ok(cursor) => cursor,
            Err(e) => {
                let stop = interrupted("cleanup", e, 0, 0)?;
                return Ok(CleanupReport {
                    scanned: 0,
                    deleted: 0,
                    stop,
                    cursor: None,
                });
            }
        };
        let budget = self.budget();
        let report = self.cleanup.run(cursor, &budget).await?;
        if let Err(e) = save_cleanup_cursor(&self.db, report.cursor.as_ref()).await {
            let stop = interrupted("cleanup", e, report.scanned, report.deleted)?;
            return Ok(CleanupReport { stop, ..report });
        }
        Ok(report)
    }

    /// Run both jobs on their intervals until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        let refresh_every = Duration::from_secs(self.config.refresh_interval_secs.max(1));
        let cleanup_every = Duration::from_secs(self.config.cleanup_interval_secs.max(1));
        info!(
            refresh_secs = refresh_every.as_secs(),
            cleanup_secs = cleanup_every.as_secs(),
            "Maintenance scheduler started"
        );

        let mut refresh_tick = tokio::time::interval(refresh_every);
        let mut cleanup_tick = tokio::time::interval(cleanup_every);
        refresh_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        cleanup_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = refresh_tick.tick() => {
                    if let Err(e) = self.run_staleness_refresh().await {
                        error!(error = %e, "Staleness refresh failed");
                    }
                }
                _ = cleanup_tick.tick() => {
                    if let Err(e) = self.run_duplicate_cleanup().await {
                        error!(error = %e, "Duplicate cleanup failed");
                    }
                }
            }
        }

        info!("Maintenance scheduler stopped");
    }
}
