//! Watching remote bulk-upload jobs to a terminal state.
//!
//! A [`BatchTracker`] polls one channel batch until the channel reports it
//! complete, the wall-clock ceiling passes, or the caller cancels. Outcomes
//! land in the shared audit log: one line for a clean batch, one per
//! rejected item otherwise, and one for a timeout.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use mcat_channel::{ChannelAdapter, ItemFailure, RemoteBatchState, UploadItem};
use mcat_core::{record_audit, AppConfig, AuditSink};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::SyncError;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);
const DEFAULT_CEILING: Duration = Duration::from_secs(15 * 60);
const DEFAULT_CHUNK_SIZE: usize = 100;
const DEFAULT_CHUNK_PAUSE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    InProgress,
    CompletedOk,
    CompletedWithFailures,
    TimedOut,
    Cancelled,
}

impl BatchStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InProgress => "IN_PROGRESS",
            Self::CompletedOk => "COMPLETED_OK",
            Self::CompletedWithFailures => "COMPLETED_WITH_FAILURES",
            Self::TimedOut => "TIMED_OUT",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// A rejected item, correlated back to what was submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedItem {
    pub index: usize,
    pub barcode: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct BatchJob {
    pub batch_id: String,
    pub items: Vec<UploadItem>,
    pub status: BatchStatus,
    pub failed_count: u32,
    /// Rejected items in the order the channel reported them.
    pub failures: Vec<FailedItem>,
    pub elapsed: Duration,
}

impl BatchJob {
    fn new(batch_id: String, items: Vec<UploadItem>) -> Self {
        Self {
            batch_id,
            items,
            status: BatchStatus::InProgress,
            failed_count: 0,
            failures: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Converts a timed-out job into [`SyncError::Timeout`] for callers that
    /// need the batch to have completed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Timeout`] if the job timed out.
    pub fn into_result(self) -> Result<Self, SyncError> {
        if self.status == BatchStatus::TimedOut {
            return Err(SyncError::Timeout {
                batch_id: self.batch_id,
                waited_secs: self.elapsed.as_secs(),
            });
        }
        Ok(self)
    }
}

/// Operator-facing description of a batch, e.g. `"Kettle (869000000001)"`
/// or `"25 items, first Kettle (869000000001)"`.
fn describe_items(items: &[UploadItem]) -> String {
    match items {
        [] => "empty batch".to_string(),
        [only] => format!("{} ({})", only.name, only.barcode),
        [first, ..] => format!(
            "{} items, first {} ({})",
            items.len(),
            first.name,
            first.barcode
        ),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    pub poll_interval: Duration,
    /// Wall-clock limit for one batch, measured from the first poll.
    pub ceiling: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            ceiling: DEFAULT_CEILING,
        }
    }
}

impl TrackerConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.batch_poll_interval_secs),
            ceiling: Duration::from_secs(config.batch_timeout_secs),
        }
    }
}

/// How an upload is split into batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPlan {
    pub chunk_size: usize,
    /// Delay between consecutive submissions.
    pub pause: Duration,
}

impl Default for UploadPlan {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            pause: DEFAULT_CHUNK_PAUSE,
        }
    }
}

impl UploadPlan {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            chunk_size: config.upload_chunk_size.max(1),
            pause: Duration::from_millis(config.upload_pause_ms),
        }
    }
}

/// Batches submitted by [`BatchTracker::submit_batches`], each watched by
/// its own task.
#[derive(Debug)]
pub struct UploadRun {
    pub batch_ids: Vec<String>,
    pub failed_chunks: usize,
    trackers: JoinSet<BatchJob>,
}

impl UploadRun {
    /// Waits for every tracker. Jobs are returned in completion order.
    pub async fn join_all(mut self) -> Vec<BatchJob> {
        let mut jobs = Vec::with_capacity(self.batch_ids.len());
        while let Some(joined) = self.trackers.join_next().await {
            match joined {
                Ok(job) => jobs.push(job),
                Err(e) => tracing::error!(error = %e, "batch tracker task failed"),
            }
        }
        jobs
    }
}

#[derive(Clone)]
pub struct BatchTracker {
    adapter: Arc<dyn ChannelAdapter>,
    audit: Arc<dyn AuditSink>,
    config: TrackerConfig,
}

impl fmt::Debug for BatchTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchTracker")
            .field("channel", &self.adapter.channel())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BatchTracker {
    #[must_use]
    pub fn new(
        adapter: Arc<dyn ChannelAdapter>,
        audit: Arc<dyn AuditSink>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            adapter,
            audit,
            config,
        }
    }

    /// Polls `batch_id` until it reaches a terminal state. The first poll
    /// happens immediately.
    pub async fn watch(
        &self,
        batch_id: String,
        items: Vec<UploadItem>,
        cancel: CancellationToken,
    ) -> BatchJob {
        let started = Instant::now();
        let mut job = BatchJob::new(batch_id, items);

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            polled = tokio::time::timeout(self.config.ceiling, self.poll_until_complete(&job.batch_id)) => Some(polled),
        };
        job.elapsed = started.elapsed();

        match outcome {
            None => {
                job.status = BatchStatus::Cancelled;
                tracing::info!(batch_id = %job.batch_id, "batch watch cancelled");
            }
            Some(Err(_elapsed)) => {
                job.status = BatchStatus::TimedOut;
                let line = format!(
                    "[TIMEOUT] {} batch {}: {} did not complete within {}s",
                    self.adapter.channel().label(),
                    job.batch_id,
                    describe_items(&job.items),
                    self.config.ceiling.as_secs()
                );
                record_audit(self.audit.as_ref(), &line);
                tracing::warn!(batch_id = %job.batch_id, "batch timed out");
            }
            Some(Ok((failed_count, failures))) => {
                self.record_completion(&mut job, failed_count, failures);
            }
        }
        job
    }

    /// Runs [`Self::watch`] on a background task.
    #[must_use]
    pub fn spawn(
        &self,
        batch_id: String,
        items: Vec<UploadItem>,
        cancel: CancellationToken,
    ) -> JoinHandle<BatchJob> {
        let tracker = self.clone();
        tokio::spawn(async move { tracker.watch(batch_id, items, cancel).await })
    }

    async fn poll_until_complete(&self, batch_id: &str) -> (u32, Vec<ItemFailure>) {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.adapter.poll_batch_status(batch_id).await {
                Ok(RemoteBatchState::Complete {
                    failed_count,
                    failures,
                }) => return (failed_count, failures),
                Ok(RemoteBatchState::InProgress) => {
                    tracing::debug!(batch_id, attempt, "batch still in progress");
                }
                Err(e) => {
                    tracing::warn!(batch_id, attempt, error = %e, "batch status poll failed");
                }
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    fn record_completion(&self, job: &mut BatchJob, failed_count: u32, failures: Vec<ItemFailure>) {
        let channel = self.adapter.channel().label();
        job.failed_count = failed_count;

        if failed_count == 0 {
            job.status = BatchStatus::CompletedOk;
            let line = format!(
                "[SUCCESS] {channel} batch {}: {} accepted",
                job.batch_id,
                describe_items(&job.items)
            );
            record_audit(self.audit.as_ref(), &line);
            tracing::info!(batch_id = %job.batch_id, items = job.items.len(), "batch completed");
            return;
        }

        job.status = BatchStatus::CompletedWithFailures;
        for failure in failures {
            let Some(item) = job.items.get(failure.index) else {
                tracing::warn!(
                    batch_id = %job.batch_id,
                    index = failure.index,
                    reason = %failure.reason,
                    "failure reported for an item outside the batch"
                );
                continue;
            };
            let line = format!(
                "[RED] {channel} batch {}: {} ({}) -> {}",
                job.batch_id, item.barcode, item.name, failure.reason
            );
            record_audit(self.audit.as_ref(), &line);
            job.failures.push(FailedItem {
                index: failure.index,
                barcode: item.barcode.clone(),
                reason: failure.reason,
            });
        }
        tracing::warn!(
            batch_id = %job.batch_id,
            failed_count,
            reported = job.failures.len(),
            "batch completed with rejected items"
        );
    }

    /// Splits `items` into chunks, submits each as a batch and starts a
    /// tracker per accepted batch. Submissions are spaced by `plan.pause`;
    /// cancellation stops further submissions and is passed to the trackers.
    pub async fn submit_batches(
        &self,
        items: Vec<UploadItem>,
        plan: UploadPlan,
        cancel: &CancellationToken,
    ) -> UploadRun {
        let mut run = UploadRun {
            batch_ids: Vec::new(),
            failed_chunks: 0,
            trackers: JoinSet::new(),
        };
        let channel = self.adapter.channel();

        for (chunk_no, chunk) in items.chunks(plan.chunk_size.max(1)).enumerate() {
            if chunk_no > 0 {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(plan.pause) => {}
                }
            }
            if cancel.is_cancelled() {
                break;
            }

            match self.adapter.submit_batch(chunk).await {
                Ok(batch_id) => {
                    tracing::info!(%channel, batch_id = %batch_id, items = chunk.len(), "batch submitted");
                    run.batch_ids.push(batch_id.clone());
                    let tracker = self.clone();
                    let items = chunk.to_vec();
                    let cancel = cancel.child_token();
                    run.trackers
                        .spawn(async move { tracker.watch(batch_id, items, cancel).await });
                }
                Err(e) => {
                    run.failed_chunks += 1;
                    let line = format!(
                        "[ERROR] {} chunk {} ({}) was not submitted: {e}",
                        channel.label(),
                        chunk_no + 1,
                        describe_items(chunk)
                    );
                    record_audit(self.audit.as_ref(), &line);
                    tracing::error!(%channel, chunk = chunk_no + 1, error = %e, "batch submission failed");
                }
            }
        }
        run
    }
}

#[cfg(test)]
#[path = "tracker_test.rs"]
mod tests;
