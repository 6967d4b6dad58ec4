pub mod adapter;
pub mod error;
pub mod file;
pub mod payload;
pub mod types;

pub use adapter::{CategorySource, ChannelAdapter};
pub use error::ChannelError;
pub use file::JsonCategoryFile;
pub use payload::{decode_batch_status, decode_envelope, Envelope, RawBatchResult};
pub use types::{
    barcode_from_channel_code, CategoryTreeNode, ItemFailure, RemoteBatchState, RemoteListing,
    UploadItem,
};
