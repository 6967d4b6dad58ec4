use mcat_channel::ChannelError;
use mcat_core::{CategoryCandidate, Channel};
use mcat_db::DbError;
use thiserror::Error;

pub mod category_import;
pub mod dispatcher;
pub mod ingest;
pub mod reconciler;
pub mod tracker;

#[cfg(test)]
mod fakes;

pub use category_import::{flatten_category_tree, import_category_tree};
pub use dispatcher::{ChangeDispatcher, DispatcherConfig, SweepReport, NOT_LISTED_MESSAGE};
pub use ingest::{ingest_remote_catalog, IngestReport};
pub use reconciler::{
    CategoryReconciler, Choice, Disambiguator, ReconcilerConfig, Resolution, Scorer,
};
pub use tracker::{
    BatchJob, BatchStatus, BatchTracker, FailedItem, TrackerConfig, UploadPlan, UploadRun,
};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Storage(#[from] DbError),

    #[error(transparent)]
    Remote(#[from] ChannelError),

    #[error("category \"{name}\" on {platform} needs a manual choice among {} candidates", candidates.len())]
    AmbiguousMatch {
        name: String,
        platform: Channel,
        candidates: Vec<CategoryCandidate>,
    },

    #[error("no {platform} category resembles \"{name}\"")]
    Unmatched { name: String, platform: Channel },

    #[error("batch {batch_id} did not complete within {waited_secs}s")]
    Timeout { batch_id: String, waited_secs: u64 },

    #[error("category id must not be empty")]
    EmptyCategoryId,
}
