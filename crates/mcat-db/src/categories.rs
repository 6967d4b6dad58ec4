//! Database operations for `platform_categories` and `category_mappings`.

use mcat_core::{Channel, PlatformCategoryNode};
use sqlx::SqlitePool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, sqlx::FromRow)]
struct PlatformCategoryRow {
    category_id: String,
    name: String,
    parent_id: String,
    parent_name: Option<String>,
    is_leaf: bool,
}

/// A row from the `category_mappings` table. The key is a normalized master
/// category name.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CategoryMappingRow {
    pub master_category_name: String,
    pub hb_id: Option<String>,
    pub pazarama_id: Option<String>,
    pub ptt_id: Option<String>,
}

impl CategoryMappingRow {
    #[must_use]
    pub fn id_for(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::Hepsiburada => self.hb_id.as_deref(),
            Channel::Pazarama => self.pazarama_id.as_deref(),
            Channel::Ptt => self.ptt_id.as_deref(),
        }
        .filter(|id| !id.is_empty())
    }
}

// ---------------------------------------------------------------------------
// platform_categories operations
// ---------------------------------------------------------------------------

/// Upserts flattened category nodes in one transaction.
///
/// Conflicts on `(platform, category_id)` update `name`, `parent_id`,
/// `parent_name` and `is_leaf` in place; a re-imported node keeps its
/// position in leaf ordering.
///
/// Returns the number of nodes written.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any insert fails; nothing is written in that
/// case.
pub async fn upsert_platform_categories(
    pool: &SqlitePool,
    nodes: &[PlatformCategoryNode],
) -> Result<usize, DbError> {
    let mut tx = pool.begin().await?;

    for node in nodes {
        sqlx::query(
            "INSERT INTO platform_categories \
                 (platform, category_id, name, parent_id, parent_name, is_leaf) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT (platform, category_id) DO UPDATE SET \
                 name        = excluded.name, \
                 parent_id   = excluded.parent_id, \
                 parent_name = excluded.parent_name, \
                 is_leaf     = excluded.is_leaf",
        )
        .bind(node.platform.key())
        .bind(&node.category_id)
        .bind(&node.name)
        .bind(&node.parent_id)
        .bind(&node.parent_name)
        .bind(node.is_leaf)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(nodes.len())
}

/// Lists the leaf categories of `platform` in insertion order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_leaf_categories(
    pool: &SqlitePool,
    platform: Channel,
) -> Result<Vec<PlatformCategoryNode>, DbError> {
    let rows = sqlx::query_as::<_, PlatformCategoryRow>(
        "SELECT category_id, name, parent_id, parent_name, is_leaf \
         FROM platform_categories \
         WHERE platform = ? AND is_leaf = 1 \
         ORDER BY rowid ASC",
    )
    .bind(platform.key())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| PlatformCategoryNode {
            platform,
            category_id: row.category_id,
            name: row.name,
            parent_id: row.parent_id,
            parent_name: row.parent_name,
            is_leaf: row.is_leaf,
        })
        .collect())
}

// ---------------------------------------------------------------------------
// category_mappings operations
// ---------------------------------------------------------------------------

/// Returns the cached category id of `platform` for a normalized master
/// category name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_category_mapping(
    pool: &SqlitePool,
    master_category_name: &str,
    platform: Channel,
) -> Result<Option<String>, DbError> {
    let row = sqlx::query_as::<_, CategoryMappingRow>(
        "SELECT master_category_name, hb_id, pazarama_id, ptt_id \
         FROM category_mappings \
         WHERE master_category_name = ?",
    )
    .bind(master_category_name)
    .fetch_optional(pool)
    .await?;

    Ok(row.and_then(|r| r.id_for(platform).map(str::to_string)))
}

/// Caches `category_id` as the `platform` mapping for a normalized master
/// category name, keeping the other platforms' ids.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_category_mapping(
    pool: &SqlitePool,
    master_category_name: &str,
    platform: Channel,
    category_id: &str,
) -> Result<(), DbError> {
    let key = platform.key();
    sqlx::query(&format!(
        "INSERT INTO category_mappings (master_category_name, {key}_id) \
         VALUES (?, ?) \
         ON CONFLICT (master_category_name) DO UPDATE SET \
             {key}_id = excluded.{key}_id"
    ))
    .bind(master_category_name)
    .bind(category_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Deletes every cached mapping. Returns the number of rows removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn clear_category_mappings(pool: &SqlitePool) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM category_mappings")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
