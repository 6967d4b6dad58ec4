//! Bulk import of remote category trees into flat `platform_categories` rows.

use mcat_channel::{CategorySource, CategoryTreeNode};
use mcat_core::{Channel, PlatformCategoryNode, ROOT_PARENT_ID};
use mcat_db::CatalogStore;

use crate::SyncError;

/// Flattens a category tree depth-first. Each row carries its parent's id and
/// name; top-level nodes get [`ROOT_PARENT_ID`].
#[must_use]
pub fn flatten_category_tree(
    platform: Channel,
    roots: &[CategoryTreeNode],
) -> Vec<PlatformCategoryNode> {
    let mut flat = Vec::new();
    flatten_into(platform, roots, None, &mut flat);
    flat
}

fn flatten_into(
    platform: Channel,
    nodes: &[CategoryTreeNode],
    parent: Option<&CategoryTreeNode>,
    out: &mut Vec<PlatformCategoryNode>,
) {
    for node in nodes {
        out.push(PlatformCategoryNode {
            platform,
            category_id: node.id.clone(),
            name: node.name.clone(),
            parent_id: parent.map_or_else(|| ROOT_PARENT_ID.to_string(), |p| p.id.clone()),
            parent_name: parent.map(|p| p.name.clone()),
            is_leaf: node.is_leaf,
        });
        flatten_into(platform, &node.children, Some(node), out);
    }
}

/// Fetches `platform`'s category tree from `source` and stores it flattened.
/// Returns the number of nodes written.
///
/// # Errors
///
/// Returns [`SyncError::Remote`] if the tree cannot be fetched, or
/// [`SyncError::Storage`] if it cannot be stored.
pub async fn import_category_tree(
    store: &CatalogStore,
    source: &dyn CategorySource,
    platform: Channel,
) -> Result<usize, SyncError> {
    let roots = source.bulk_fetch_category_tree(platform).await?;
    let flat = flatten_category_tree(platform, &roots);
    let leaves = flat.iter().filter(|n| n.is_leaf).count();

    let written = store.upsert_platform_categories(&flat).await?;
    tracing::info!(%platform, nodes = written, leaves, "category tree imported");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use mcat_channel::ChannelError;
    use mcat_core::MemoryAuditLog;

    use super::*;

    fn node(id: &str, name: &str, children: Vec<CategoryTreeNode>) -> CategoryTreeNode {
        CategoryTreeNode {
            id: id.to_string(),
            name: name.to_string(),
            parent_id: None,
            is_leaf: children.is_empty(),
            children,
        }
    }

    fn tree() -> Vec<CategoryTreeNode> {
        vec![
            node(
                "1",
                "Ev",
                vec![
                    node("11", "Mutfak", vec![node("111", "Kettle", vec![])]),
                    node("12", "Banyo", vec![]),
                ],
            ),
            node("2", "Bahçe", vec![]),
        ]
    }

    struct StaticTree;

    #[async_trait]
    impl CategorySource for StaticTree {
        async fn bulk_fetch_category_tree(
            &self,
            _platform: Channel,
        ) -> Result<Vec<CategoryTreeNode>, ChannelError> {
            Ok(tree())
        }
    }

    #[test]
    fn flattening_keeps_parent_links() {
        let flat = flatten_category_tree(Channel::Pazarama, &tree());
        let rows: Vec<(&str, &str, Option<&str>, bool)> = flat
            .iter()
            .map(|n| {
                (
                    n.category_id.as_str(),
                    n.parent_id.as_str(),
                    n.parent_name.as_deref(),
                    n.is_leaf,
                )
            })
            .collect();
        assert_eq!(
            rows,
            vec![
                ("1", "0", None, false),
                ("11", "1", Some("Ev"), false),
                ("111", "11", Some("Mutfak"), true),
                ("12", "1", Some("Ev"), true),
                ("2", "0", None, true),
            ]
        );
    }

    #[tokio::test]
    async fn import_stores_leaves_for_resolution() {
        let store = CatalogStore::in_memory(Arc::new(MemoryAuditLog::new()))
            .await
            .unwrap();
        let written = import_category_tree(&store, &StaticTree, Channel::Pazarama)
            .await
            .unwrap();
        assert_eq!(written, 5);

        let leaves = store.list_leaf_categories(Channel::Pazarama).await.unwrap();
        let ids: Vec<&str> = leaves.iter().map(|n| n.category_id.as_str()).collect();
        assert_eq!(ids, vec!["111", "12", "2"]);
    }
}
