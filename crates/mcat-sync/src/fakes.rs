//! In-process channel adapter for unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use mcat_channel::{ChannelAdapter, ChannelError, RemoteBatchState, RemoteListing, UploadItem};
use mcat_core::Channel;

pub(crate) struct FakeAdapter {
    channel: Channel,
    /// Served in order by `poll_batch_status`; `InProgress` once exhausted.
    statuses: Mutex<VecDeque<Result<RemoteBatchState, ChannelError>>>,
    polls: AtomicU32,
    failing_submissions: HashSet<usize>,
    submissions: Mutex<Vec<usize>>,
    failing_ids: HashSet<String>,
    pushes: Mutex<Vec<(String, f64, i64)>>,
    listings: Vec<RemoteListing>,
}

impl FakeAdapter {
    pub(crate) fn new(channel: Channel) -> Self {
        Self {
            channel,
            statuses: Mutex::new(VecDeque::new()),
            polls: AtomicU32::new(0),
            failing_submissions: HashSet::new(),
            submissions: Mutex::new(Vec::new()),
            failing_ids: HashSet::new(),
            pushes: Mutex::new(Vec::new()),
            listings: Vec::new(),
        }
    }

    pub(crate) fn with_statuses(
        self,
        statuses: impl IntoIterator<Item = Result<RemoteBatchState, ChannelError>>,
    ) -> Self {
        *self.statuses.lock().unwrap() = statuses.into_iter().collect();
        self
    }

    /// Makes the `n`th submission (zero-based) fail.
    pub(crate) fn failing_submission(mut self, n: usize) -> Self {
        self.failing_submissions.insert(n);
        self
    }

    pub(crate) fn failing_push(mut self, external_id: &str) -> Self {
        self.failing_ids.insert(external_id.to_string());
        self
    }

    pub(crate) fn with_listings(mut self, listings: Vec<RemoteListing>) -> Self {
        self.listings = listings;
        self
    }

    pub(crate) fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }

    pub(crate) fn submitted_sizes(&self) -> Vec<usize> {
        self.submissions.lock().unwrap().clone()
    }

    pub(crate) fn pushes(&self) -> Vec<(String, f64, i64)> {
        self.pushes.lock().unwrap().clone()
    }
}

pub(crate) fn complete(failed_count: u32, failures: &[(usize, &str)]) -> RemoteBatchState {
    RemoteBatchState::Complete {
        failed_count,
        failures: failures
            .iter()
            .map(|(index, reason)| mcat_channel::ItemFailure {
                index: *index,
                reason: (*reason).to_string(),
            })
            .collect(),
    }
}

pub(crate) fn upload_items(count: usize) -> Vec<UploadItem> {
    (0..count)
        .map(|i| UploadItem {
            barcode: format!("B{i}"),
            name: format!("Item {i}"),
            category_id: "10".to_string(),
            price: 10.0,
            stock: 1,
            vat_rate: 20,
            brand: String::new(),
            description: String::new(),
            images: Vec::new(),
        })
        .collect()
}

#[async_trait]
impl ChannelAdapter for FakeAdapter {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn fetch_remote_catalog(&self) -> Result<Vec<RemoteListing>, ChannelError> {
        Ok(self.listings.clone())
    }

    async fn submit_batch(&self, items: &[UploadItem]) -> Result<String, ChannelError> {
        let mut submissions = self.submissions.lock().unwrap();
        let n = submissions.len();
        submissions.push(items.len());
        if self.failing_submissions.contains(&n) {
            return Err(ChannelError::Rejected("quota exceeded".to_string()));
        }
        Ok(format!("batch-{n}"))
    }

    async fn poll_batch_status(&self, _batch_id: &str) -> Result<RemoteBatchState, ChannelError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(RemoteBatchState::InProgress))
    }

    async fn push_single_update(
        &self,
        external_id: &str,
        price: f64,
        stock: i64,
    ) -> Result<(), ChannelError> {
        self.pushes
            .lock()
            .unwrap()
            .push((external_id.to_string(), price, stock));
        if self.failing_ids.contains(external_id) {
            return Err(ChannelError::Transport("connection reset".to_string()));
        }
        Ok(())
    }
}

/// Settings as an embedding service would load them, with every knob moved
/// off its default.
pub(crate) fn app_config() -> mcat_core::AppConfig {
    mcat_core::AppConfig {
        database_url: "sqlite::memory:".to_string(),
        env: mcat_core::Environment::Test,
        log_level: "debug".to_string(),
        audit_log_path: "audit.log".into(),
        db_busy_timeout_secs: 5,
        dispatch_interval_secs: 30,
        dispatch_batch_limit: 0,
        batch_poll_interval_secs: 20,
        batch_timeout_secs: 600,
        upload_chunk_size: 0,
        upload_pause_ms: 250,
        category_auto_accept: 0.9,
        category_candidates: 5,
        duplicate_warnings_per_minute: 12,
    }
}
