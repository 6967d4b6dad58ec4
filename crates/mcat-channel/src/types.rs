//! Channel-neutral shapes exchanged with channel adapters.

use mcat_core::Channel;
use serde::{Deserialize, Serialize};

/// Suffix Pazarama appends to seller codes that mirror a barcode.
const PAZARAMA_CODE_SUFFIX: &str = "-PZR";

/// One listing as reported by a channel's catalog endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteListing {
    /// The channel's own identifier for the listing.
    pub external_id: String,
    pub barcode: String,
    pub price: f64,
    pub stock: i64,
    #[serde(default)]
    pub name: String,
}

/// One product submitted in a bulk upload. Order within a batch matters:
/// channels report per-item failures by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadItem {
    pub barcode: String,
    pub name: String,
    pub category_id: String,
    pub price: f64,
    pub stock: i64,
    pub vat_rate: i32,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub images: Vec<String>,
}

/// A per-item rejection inside a completed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// Position of the item in the submitted batch.
    pub index: usize,
    pub reason: String,
}

/// Remote view of a bulk job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteBatchState {
    InProgress,
    Complete {
        failed_count: u32,
        failures: Vec<ItemFailure>,
    },
}

/// A node of a channel's category tree as served by its taxonomy endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTreeNode {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "parentId")]
    pub parent_id: Option<String>,
    #[serde(default, rename = "isLeaf")]
    pub is_leaf: bool,
    #[serde(default)]
    pub children: Vec<CategoryTreeNode>,
}

/// Maps a channel's product code back to the master barcode.
#[must_use]
pub fn barcode_from_channel_code(channel: Channel, code: &str) -> String {
    let code = code.trim();
    match channel {
        Channel::Pazarama => code
            .strip_suffix(PAZARAMA_CODE_SUFFIX)
            .unwrap_or(code)
            .to_string(),
        Channel::Hepsiburada | Channel::Ptt => code.to_string(),
    }
}
