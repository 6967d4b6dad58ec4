//! Category trees exported to disk.

use std::path::PathBuf;

use async_trait::async_trait;
use mcat_core::Channel;

use crate::adapter::CategorySource;
use crate::error::ChannelError;
use crate::payload::decode_envelope;
use crate::types::CategoryTreeNode;

/// Reads a category tree from a JSON file holding either a bare array of
/// nodes or the channel's response envelope around one.
#[derive(Debug, Clone)]
pub struct JsonCategoryFile {
    path: PathBuf,
}

impl JsonCategoryFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CategorySource for JsonCategoryFile {
    async fn bulk_fetch_category_tree(
        &self,
        platform: Channel,
    ) -> Result<Vec<CategoryTreeNode>, ChannelError> {
        let body = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| ChannelError::Io {
                path: self.path.display().to_string(),
                source,
            })?;

        let context = format!("{platform} category tree");
        if body.trim_start().starts_with('[') {
            serde_json::from_str(&body)
                .map_err(|source| ChannelError::MalformedPayload { context, source })
        } else {
            decode_envelope(&context, &body)
        }
    }
}
