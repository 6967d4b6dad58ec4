//! The catalog store handle shared by every component.

use std::num::NonZeroU32;
use std::sync::Arc;

use mcat_core::{
    AppConfig, AuditSink, Channel, MasterProduct, PlatformCategoryNode, ProductCandidate,
    SyncStatus,
};
use sqlx::SqlitePool;

use crate::duplicates::{DuplicateDetector, DuplicateEvent};
use crate::products::{ChannelSyncResult, UpsertOutcome};
use crate::{categories, duplicates, products, DbError, PoolConfig};

const DEFAULT_DUPLICATE_WARNINGS_PER_MINUTE: NonZeroU32 = match NonZeroU32::new(12) {
    Some(n) => n,
    None => NonZeroU32::MIN,
};

/// Handle to the master catalog: a single-connection `SQLite` pool plus the
/// duplicate detector consulted during merges.
///
/// Cheap to clone; clones share the pool and the detector.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    pool: SqlitePool,
    detector: DuplicateDetector,
}

impl CatalogStore {
    #[must_use]
    pub fn new(pool: SqlitePool, detector: DuplicateDetector) -> Self {
        Self { pool, detector }
    }

    /// Connects to `config.database_url` and builds the detector from the
    /// configured warning rate. Does not run migrations.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlx`] if the connection cannot be established.
    pub async fn connect(config: &AppConfig, audit: Arc<dyn AuditSink>) -> Result<Self, DbError> {
        let pool = crate::connect_pool(&config.database_url, PoolConfig::from_app_config(config)).await?;
        let per_minute = NonZeroU32::new(config.duplicate_warnings_per_minute)
            .unwrap_or(DEFAULT_DUPLICATE_WARNINGS_PER_MINUTE);
        Ok(Self::new(pool, DuplicateDetector::new(audit, per_minute)))
    }

    /// A migrated in-memory store with default warning limits.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the database cannot be opened or migrated.
    pub async fn in_memory(audit: Arc<dyn AuditSink>) -> Result<Self, DbError> {
        let pool = crate::open_in_memory().await?;
        Ok(Self::new(
            pool,
            DuplicateDetector::new(audit, DEFAULT_DUPLICATE_WARNINGS_PER_MINUTE),
        ))
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// # Errors
    ///
    /// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
    pub async fn migrate(&self) -> Result<usize, sqlx::migrate::MigrateError> {
        crate::run_migrations(&self.pool).await
    }

    // -- products ----------------------------------------------------------

    /// See [`products::upsert_product`].
    ///
    /// # Errors
    ///
    /// Propagates [`DbError`] from the merge transaction.
    pub async fn upsert(&self, candidate: &ProductCandidate) -> Result<UpsertOutcome, DbError> {
        products::upsert_product(&self.pool, &self.detector, candidate).await
    }

    /// # Errors
    ///
    /// Propagates [`DbError`] from the query.
    pub async fn get_product(&self, barcode: &str) -> Result<Option<MasterProduct>, DbError> {
        products::get_product(&self.pool, barcode).await
    }

    /// See [`products::mark_sync_result`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] for an unknown barcode.
    pub async fn mark_sync_result(
        &self,
        barcode: &str,
        channel: Channel,
        status: SyncStatus,
        message: &str,
    ) -> Result<(), DbError> {
        products::mark_sync_result(&self.pool, barcode, channel, status, message).await
    }

    /// See [`products::apply_sync_outcome`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] for an unknown barcode.
    pub async fn apply_sync_outcome(
        &self,
        barcode: &str,
        revision: i64,
        results: &[ChannelSyncResult],
    ) -> Result<bool, DbError> {
        products::apply_sync_outcome(&self.pool, barcode, revision, results).await
    }

    /// # Errors
    ///
    /// Propagates [`DbError`] from the query.
    pub async fn fetch_dirty_batch(&self, limit: u32) -> Result<Vec<MasterProduct>, DbError> {
        products::fetch_dirty_batch(&self.pool, limit).await
    }

    /// # Errors
    ///
    /// Propagates [`DbError`] from the query.
    pub async fn count_dirty(&self) -> Result<i64, DbError> {
        products::count_dirty(&self.pool).await
    }

    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] for an unknown barcode.
    pub async fn set_price(&self, barcode: &str, price: f64) -> Result<i64, DbError> {
        products::set_price(&self.pool, barcode, price).await
    }

    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] for an unknown barcode.
    pub async fn set_markup(&self, barcode: &str, channel: Channel, markup: f64) -> Result<i64, DbError> {
        products::set_markup(&self.pool, barcode, channel, markup).await
    }

    // -- duplicates --------------------------------------------------------

    /// # Errors
    ///
    /// Propagates [`DbError`] from the query.
    pub async fn list_duplicate_events(&self, limit: u32) -> Result<Vec<DuplicateEvent>, DbError> {
        duplicates::list_duplicate_events(&self.pool, limit).await
    }

    // -- categories --------------------------------------------------------

    /// # Errors
    ///
    /// Propagates [`DbError`] from the import transaction.
    pub async fn upsert_platform_categories(
        &self,
        nodes: &[PlatformCategoryNode],
    ) -> Result<usize, DbError> {
        categories::upsert_platform_categories(&self.pool, nodes).await
    }

    /// # Errors
    ///
    /// Propagates [`DbError`] from the query.
    pub async fn list_leaf_categories(
        &self,
        platform: Channel,
    ) -> Result<Vec<PlatformCategoryNode>, DbError> {
        categories::list_leaf_categories(&self.pool, platform).await
    }

    /// # Errors
    ///
    /// Propagates [`DbError`] from the query.
    pub async fn get_category_mapping(
        &self,
        master_category_name: &str,
        platform: Channel,
    ) -> Result<Option<String>, DbError> {
        categories::get_category_mapping(&self.pool, master_category_name, platform).await
    }

    /// # Errors
    ///
    /// Propagates [`DbError`] from the upsert.
    pub async fn upsert_category_mapping(
        &self,
        master_category_name: &str,
        platform: Channel,
        category_id: &str,
    ) -> Result<(), DbError> {
        categories::upsert_category_mapping(&self.pool, master_category_name, platform, category_id)
            .await
    }

    /// # Errors
    ///
    /// Propagates [`DbError`] from the delete.
    pub async fn clear_category_mappings(&self) -> Result<u64, DbError> {
        categories::clear_category_mappings(&self.pool).await
    }
}
