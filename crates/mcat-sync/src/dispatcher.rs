//! Periodic push of dirty master records to their channels.
//!
//! Each sweep reads one batch of dirty records, syncs them concurrently (one
//! task per record) and waits for the whole batch before the next sweep. A
//! record's outcome is written back with the revision it was read at, so a
//! change that lands mid-sync keeps the record dirty for the next sweep.
//!
//! A linked channel without a configured adapter counts as an undelivered
//! push: its status becomes `ERROR` and the record stays dirty. The store
//! requeues such records behind newer work, so they are retried without
//! holding up the rest of the dirty set.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mcat_channel::ChannelAdapter;
use mcat_core::{effective_price, AppConfig, Channel, MasterProduct, SyncStatus};
use mcat_db::{CatalogStore, ChannelSyncResult};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::SyncError;

/// Status message for records no channel knows about yet.
pub const NOT_LISTED_MESSAGE: &str = "not listed on channel";

const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_BATCH_LIMIT: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub interval: Duration,
    pub batch_limit: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }
}

impl DispatcherConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.dispatch_interval_secs),
            batch_limit: config.dispatch_batch_limit.max(1),
        }
    }
}

/// Tally of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub fetched: usize,
    /// Records whose dirty flag was cleared.
    pub cleared: usize,
    /// Records left dirty by a failed push or a concurrent change.
    pub still_dirty: usize,
    pub failed_pushes: usize,
    /// Linked channels skipped for lack of an adapter.
    pub unconfigured: usize,
    /// Records without any channel id.
    pub unlisted: usize,
    /// Records whose write-back failed.
    pub errors: usize,
}

#[derive(Debug, Default)]
struct RecordOutcome {
    cleared: bool,
    failed_pushes: usize,
    unconfigured: usize,
    unlisted: bool,
}

#[derive(Clone)]
pub struct ChangeDispatcher {
    store: CatalogStore,
    adapters: Arc<HashMap<Channel, Arc<dyn ChannelAdapter>>>,
    config: DispatcherConfig,
}

impl std::fmt::Debug for ChangeDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut channels: Vec<Channel> = self.adapters.keys().copied().collect();
        channels.sort();
        f.debug_struct("ChangeDispatcher")
            .field("channels", &channels)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ChangeDispatcher {
    /// Adapters are keyed by [`ChannelAdapter::channel`]; a later adapter for
    /// the same channel replaces an earlier one.
    #[must_use]
    pub fn new(
        store: CatalogStore,
        adapters: impl IntoIterator<Item = Arc<dyn ChannelAdapter>>,
        config: DispatcherConfig,
    ) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.channel(), adapter))
            .collect();
        Self {
            store,
            adapters: Arc::new(adapters),
            config,
        }
    }

    /// Runs one sweep over the oldest dirty records.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Storage`] if the dirty batch cannot be read.
    /// Per-record failures are counted in the report instead.
    pub async fn sweep(&self) -> Result<SweepReport, SyncError> {
        let batch = self.store.fetch_dirty_batch(self.config.batch_limit).await?;
        let mut report = SweepReport {
            fetched: batch.len(),
            ..SweepReport::default()
        };
        if batch.is_empty() {
            return Ok(report);
        }

        let mut tasks = JoinSet::new();
        for product in batch {
            let dispatcher = self.clone();
            tasks.spawn(async move {
                let barcode = product.barcode.clone();
                (barcode, dispatcher.sync_record(product).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => {
                    report.failed_pushes += outcome.failed_pushes;
                    report.unconfigured += outcome.unconfigured;
                    if outcome.unlisted {
                        report.unlisted += 1;
                    }
                    if outcome.cleared {
                        report.cleared += 1;
                    } else {
                        report.still_dirty += 1;
                    }
                }
                Ok((barcode, Err(e))) => {
                    report.errors += 1;
                    tracing::error!(barcode = %barcode, error = %e, "sync write-back failed");
                }
                Err(e) => {
                    report.errors += 1;
                    tracing::error!(error = %e, "sync task failed");
                }
            }
        }

        tracing::info!(
            fetched = report.fetched,
            cleared = report.cleared,
            still_dirty = report.still_dirty,
            failed_pushes = report.failed_pushes,
            unconfigured = report.unconfigured,
            "sweep finished"
        );
        Ok(report)
    }

    async fn sync_record(&self, product: MasterProduct) -> Result<RecordOutcome, SyncError> {
        let linked = product.channels.linked_channels();

        if linked.is_empty() {
            let results: Vec<ChannelSyncResult> = Channel::ALL
                .into_iter()
                .map(|channel| ChannelSyncResult {
                    channel,
                    status: SyncStatus::Pending,
                    message: NOT_LISTED_MESSAGE.to_string(),
                })
                .collect();
            let cleared = self
                .store
                .apply_sync_outcome(&product.barcode, product.change_seq, &results)
                .await?;
            return Ok(RecordOutcome {
                cleared,
                unlisted: true,
                ..RecordOutcome::default()
            });
        }

        let mut results = Vec::with_capacity(linked.len());
        let (mut failed_pushes, mut unconfigured) = (0, 0);
        for channel in linked {
            let state = product.channels.get(channel);
            let Some(external_id) = state.linked_id() else {
                continue;
            };
            let Some(adapter) = self.adapters.get(&channel) else {
                tracing::debug!(barcode = %product.barcode, %channel, "no adapter configured; record stays dirty");
                unconfigured += 1;
                results.push(ChannelSyncResult {
                    channel,
                    status: SyncStatus::Error,
                    message: format!("no {} adapter configured", channel.label()),
                });
                continue;
            };
            let price = effective_price(product.price, state.markup);

            let result = match adapter
                .push_single_update(external_id, price, product.stock)
                .await
            {
                Ok(()) => ChannelSyncResult {
                    channel,
                    status: SyncStatus::Synced,
                    message: format!("price {price:.2} stock {}", product.stock),
                },
                Err(e) => {
                    failed_pushes += 1;
                    tracing::warn!(
                        barcode = %product.barcode,
                        %channel,
                        error = %e,
                        "channel push failed; record stays dirty"
                    );
                    ChannelSyncResult {
                        channel,
                        status: SyncStatus::Error,
                        message: e.to_string(),
                    }
                }
            };
            results.push(result);
        }

        let cleared = self
            .store
            .apply_sync_outcome(&product.barcode, product.change_seq, &results)
            .await?;
        Ok(RecordOutcome {
            cleared,
            failed_pushes,
            unconfigured,
            unlisted: false,
        })
    }

    /// Sweeps until `cancel` fires, sleeping `interval` between sweeps. A
    /// sweep that fails to read the store is logged and retried next tick.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            batch_limit = self.config.batch_limit,
            "change dispatcher started"
        );
        loop {
            if cancel.is_cancelled() {
                break;
            }
            if let Err(e) = self.sweep().await {
                tracing::error!(error = %e, "sweep failed");
            }
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.config.interval) => {}
            }
        }
        tracing::info!("change dispatcher stopped");
    }
}

#[cfg(test)]
#[path = "dispatcher_test.rs"]
mod tests;
