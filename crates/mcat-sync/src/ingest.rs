//! Folding a channel's remote catalog into the master catalog.

use mcat_channel::{barcode_from_channel_code, ChannelAdapter, RemoteListing};
use mcat_core::{Channel, ChannelLink, ProductCandidate, SyncStatus};
use mcat_db::CatalogStore;

use crate::SyncError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub listings: usize,
    pub created: usize,
    pub updated: usize,
    /// Identity conflicts recorded while merging.
    pub duplicates: usize,
    /// Listings the store refused; logged and skipped.
    pub failed: usize,
}

fn listing_candidate(channel: Channel, listing: &RemoteListing) -> ProductCandidate {
    ProductCandidate {
        name: listing.name.trim().to_string(),
        price: listing.price,
        stock: listing.stock,
        links: vec![ChannelLink {
            channel,
            external_id: listing.external_id.trim().to_string(),
            status: Some(SyncStatus::Matched),
            markup: None,
        }],
        ..ProductCandidate::new(barcode_from_channel_code(channel, &listing.barcode))
    }
}

/// Pulls every listing from `adapter` and upserts it as a candidate linked
/// to the adapter's channel.
///
/// # Errors
///
/// Returns [`SyncError::Remote`] if the catalog cannot be fetched. A listing
/// the store rejects is counted in [`IngestReport::failed`] instead.
pub async fn ingest_remote_catalog(
    store: &CatalogStore,
    adapter: &dyn ChannelAdapter,
) -> Result<IngestReport, SyncError> {
    let channel = adapter.channel();
    let listings = adapter.fetch_remote_catalog().await?;
    let mut report = IngestReport {
        listings: listings.len(),
        ..IngestReport::default()
    };

    for listing in &listings {
        let candidate = listing_candidate(channel, listing);
        match store.upsert(&candidate).await {
            Ok(outcome) => {
                if outcome.created {
                    report.created += 1;
                } else {
                    report.updated += 1;
                }
                report.duplicates += outcome.duplicates.len();
            }
            Err(e) => {
                report.failed += 1;
                tracing::warn!(
                    %channel,
                    external_id = %listing.external_id,
                    barcode = %listing.barcode,
                    error = %e,
                    "skipping remote listing"
                );
            }
        }
    }

    tracing::info!(
        %channel,
        listings = report.listings,
        created = report.created,
        updated = report.updated,
        duplicates = report.duplicates,
        failed = report.failed,
        "remote catalog ingested"
    );
    Ok(report)
}
