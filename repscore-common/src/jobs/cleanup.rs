//! Duplicate cleanup
//!
//! Walks every record in `(platform_id, last_updated, key)` order and deletes
//! each record whose platform id equals the one before it, so the first copy
//! in scan order survives. The walk is resumable: [`DuplicateCleanup::run`]
//! takes the cursor returned by the previous run and hands back the next one.
//!
//! A pass ends with a run that finds nothing left to scan; that run returns
//! no cursor, so the following run starts a fresh pass.

use std::sync::Arc;
use tracing::{info, warn};

use super::{interrupted, StopReason, TimeBudget};
use crate::store::{ScanCursor, ScoreStore};
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub scanned: usize,
    pub deleted: usize,
    pub stop: StopReason,
    /// Where the next run resumes; `None` starts from the beginning
    pub cursor: Option<ScanCursor>,
}

pub struct DuplicateCleanup {
    store: Arc<dyn ScoreStore>,
    page_size: usize,
}

impl DuplicateCleanup {
    pub fn new(store: Arc<dyn ScoreStore>, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    pub async fn run(&self, cursor: Option<ScanCursor>, budget: &TimeBudget) -> Result<CleanupReport> {
        let mut scanned = 0;
        let mut deleted = 0;
        // The cursor row was already scanned and kept (or was itself a
        // duplicate of a kept row), so its id seeds the comparison.
        let mut previous = cursor.as_ref().map(|c| c.platform_id);
        let mut cursor = cursor;

        if let Some(c) = &cursor {
            warn!(platform_id = c.platform_id, "Starting cleanup from cursor");
        }

        loop {
            let page = match self.store.scan_platform_ids(cursor.as_ref(), self.page_size).await {
                Ok(page) => page,
                Err(e) => {
                    let stop = interrupted("cleanup", e, scanned, deleted)?;
                    return Ok(CleanupReport {
                        scanned,
                        deleted,
                        stop,
                        cursor,
                    });
                }
            };
            if page.is_empty() {
                break;
            }

            for row in page {
                scanned += 1;
                if previous == Some(row.platform_id) {
                    if let Err(e) = self.store.delete(&row.key).await {
                        let stop = interrupted("cleanup", e, scanned, deleted)?;
                        return Ok(CleanupReport {
                            scanned,
                            deleted,
                            stop,
                            cursor,
                        });
                    }
                    deleted += 1;
                    info!(
                        platform_id = row.platform_id,
                        key = %row.key,
                        scanned,
                        deleted,
                        "Removing duplicate score"
                    );
                } else {
                    previous = Some(row.platform_id);
                }
                cursor = Some(ScanCursor::from(&row));

                if budget.exhausted() {
                    warn!(scanned, deleted, "Bailing out before timing out");
                    return Ok(CleanupReport {
                        scanned,
                        deleted,
                        stop: StopReason::OutOfTime,
                        cursor,
                    });
                }
            }
        }

        if scanned == 0 {
            cursor = None;
            info!("Cleanup pass finished, cursor cleared");
        }
        info!(scanned, deleted, "Cleanup completed");
        Ok(CleanupReport {
            scanned,
            deleted,
            stop: StopReason::Completed,
            cursor,
        })
    }
}
