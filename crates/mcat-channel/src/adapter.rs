use async_trait::async_trait;
use mcat_core::Channel;

use crate::error::ChannelError;
use crate::types::{CategoryTreeNode, RemoteBatchState, RemoteListing, UploadItem};

/// Client for one sales channel.
///
/// Implementations own transport, authentication and wire formats; callers
/// only see channel-neutral types.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn channel(&self) -> Channel;

    /// Every listing the channel currently holds for this seller.
    async fn fetch_remote_catalog(&self) -> Result<Vec<RemoteListing>, ChannelError>;

    /// Submits a bulk upload and returns the channel's batch id.
    async fn submit_batch(&self, items: &[UploadItem]) -> Result<String, ChannelError>;

    async fn poll_batch_status(&self, batch_id: &str) -> Result<RemoteBatchState, ChannelError>;

    /// Pushes price and stock for one listing.
    async fn push_single_update(
        &self,
        external_id: &str,
        price: f64,
        stock: i64,
    ) -> Result<(), ChannelError>;
}

/// Source of a channel's full category taxonomy.
#[async_trait]
pub trait CategorySource: Send + Sync {
    async fn bulk_fetch_category_tree(
        &self,
        platform: Channel,
    ) -> Result<Vec<CategoryTreeNode>, ChannelError>;
}
