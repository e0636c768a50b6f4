//! Recompute scheduling
//!
//! `schedule` is a fire-and-forget enqueue. The [`RecomputeWorker`] consumes
//! requests with bounded concurrency and redelivers deferred or transiently
//! failed ones after a delay, so every request is processed at least once
//! while the process lives. There is no ordering guarantee across
//! identities; the orchestrator is idempotent so duplicates are harmless.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::identity::Identity;
use crate::jobs::TimeBudget;
use crate::orchestrator::{Outcome, Recomputer};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecomputeRequest {
    pub identity: Identity,
    pub depth: u32,
    /// Zero for the first delivery
    pub attempt: u32,
}

#[async_trait]
pub trait RecomputeQueue: Send + Sync {
    async fn schedule(&self, identity: Identity, depth: u32) -> Result<()>;
}

/// In-process queue over an unbounded tokio channel
#[derive(Clone)]
pub struct ChannelQueue {
    tx: mpsc::UnboundedSender<RecomputeRequest>,
}

impl ChannelQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RecomputeRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, request: RecomputeRequest) -> Result<()> {
        self.tx
            .send(request)
            .map_err(|_| Error::Internal("recompute queue closed".to_string()))
    }
}

#[async_trait]
impl RecomputeQueue for ChannelQueue {
    async fn schedule(&self, identity: Identity, depth: u32) -> Result<()> {
        debug!(identity = %identity, depth, "Scheduling recomputation");
        self.send(RecomputeRequest {
            identity,
            depth,
            attempt: 0,
        })
    }
}

/// What happened to one delivered request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Done(Outcome),
    /// Requeued for another attempt after the retry delay
    Retrying,
    /// Gave up: attempts exhausted or a non-retryable error
    Dropped,
}

#[derive(Clone)]
pub struct RecomputeWorker {
    recomputer: Recomputer,
    queue: ChannelQueue,
    concurrency: usize,
    max_attempts: u32,
    retry_delay: Duration,
}

impl RecomputeWorker {
    pub fn new(
        recomputer: Recomputer,
        queue: ChannelQueue,
        concurrency: usize,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            recomputer,
            queue,
            concurrency: concurrency.max(1),
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    /// Consume requests until cancelled or every sender is gone
    pub async fn run(
        self,
        mut rx: mpsc::UnboundedReceiver<RecomputeRequest>,
        cancel: CancellationToken,
    ) {
        info!(concurrency = self.concurrency, "Recompute worker started");
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        loop {
            let request = tokio::select! {
                _ = cancel.cancelled() => break,
                request = rx.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let worker = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let _permit = permit;
                worker.handle(request, &cancel).await;
            });
        }

        info!("Recompute worker stopped");
    }

    /// Process whatever is queued right now, one request at a time, until
    /// the queue is empty or `budget` runs out.
    ///
    /// Used by one-shot job runs. Requests left behind and redeliveries
    /// still waiting when `cancel` fires are dropped; their records stay
    /// stale, so the next refresh pass picks them up again.
    pub async fn drain(
        &self,
        rx: &mut mpsc::UnboundedReceiver<RecomputeRequest>,
        budget: &TimeBudget,
        cancel: &CancellationToken,
    ) -> usize {
        let mut processed = 0;
        while !cancel.is_cancelled() {
            if budget.exhausted() {
                warn!(processed, "Bailing out before timing out");
                break;
            }
            let Ok(request) = rx.try_recv() else {
                break;
            };
            self.handle(request, cancel).await;
            processed += 1;
        }
        processed
    }

    /// Process one request, requeueing it if it should be retried
    pub async fn handle(&self, request: RecomputeRequest, cancel: &CancellationToken) -> Delivery {
        match self.recomputer.recompute(&request.identity, request.depth).await {
            Ok(Outcome::Deferred { reason }) => {
                debug!(identity = %request.identity, reason = %reason, "Recompute deferred");
                self.retry(request, cancel)
            }
            Ok(outcome) => {
                debug!(identity = %request.identity, outcome = %outcome, "Recompute finished");
                Delivery::Done(outcome)
            }
            Err(e) if e.is_retryable() => {
                warn!(identity = %request.identity, error = %e, "Recompute hit transient error");
                self.retry(request, cancel)
            }
            Err(e) => {
                error!(identity = %request.identity, error = %e, "Recompute failed");
                Delivery::Dropped
            }
        }
    }

    fn retry(&self, request: RecomputeRequest, cancel: &CancellationToken) -> Delivery {
        let next = RecomputeRequest {
            attempt: request.attempt + 1,
            ..request
        };
        if next.attempt >= self.max_attempts {
            error!(
                identity = %next.identity,
                attempts = next.attempt,
                "Giving up on recomputation"
            );
            return Delivery::Dropped;
        }

        let queue = self.queue.clone();
        let delay = self.retry_delay;
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = queue.send(next) {
                        warn!(error = %e, "Could not requeue recomputation");
                    }
                }
            }
        });
        Delivery::Retrying
    }
}
