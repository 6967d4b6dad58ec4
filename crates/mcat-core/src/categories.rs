use serde::{Deserialize, Serialize};

use crate::Channel;

/// Parent id recorded for top-level nodes of a flattened category tree.
pub const ROOT_PARENT_ID: &str = "0";

/// One node of a channel's category taxonomy, stored flat with an explicit
/// parent id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformCategoryNode {
    pub platform: Channel,
    pub category_id: String,
    pub name: String,
    pub parent_id: String,
    pub parent_name: Option<String>,
    /// Only leaf categories can host listings.
    pub is_leaf: bool,
}

/// A leaf category scored against a master category name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCandidate {
    pub category_id: String,
    pub name: String,
    /// Similarity in `[0, 1]`.
    pub score: f64,
}

/// Normalizes a category label for cache keys and similarity scoring.
///
/// Trims, collapses inner whitespace and case-folds with Turkish rules
/// (`I` → `ı`, `İ` → `i`) before the generic Unicode lowercase mapping.
#[must_use]
pub fn normalize_category_name(raw: &str) -> String {
    let folded: String = raw
        .chars()
        .flat_map(|c| {
            let mapped: Vec<char> = match c {
                'I' => vec!['ı'],
                'İ' => vec!['i'],
                other => other.to_lowercase().collect(),
            };
            mapped
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}
