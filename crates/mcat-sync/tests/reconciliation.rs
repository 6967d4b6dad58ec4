//! Ingest, category resolution, dispatch and upload against one store.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mcat_channel::{
    CategorySource, CategoryTreeNode, ChannelAdapter, ChannelError, ItemFailure, RemoteBatchState,
    RemoteListing, UploadItem,
};
use mcat_core::{Channel, MemoryAuditLog, ProductCandidate, SyncStatus};
use mcat_db::CatalogStore;
use mcat_sync::{
    import_category_tree, ingest_remote_catalog, BatchStatus, BatchTracker, CategoryReconciler,
    ChangeDispatcher, DispatcherConfig, ReconcilerConfig, Resolution, TrackerConfig, UploadPlan,
};
use tokio_util::sync::CancellationToken;

struct MarketStub {
    channel: Channel,
    listings: Vec<RemoteListing>,
    pushes: Mutex<Vec<(String, f64, i64)>>,
    uploads: Mutex<Vec<Vec<String>>>,
}

impl MarketStub {
    fn new(channel: Channel, listings: Vec<RemoteListing>) -> Self {
        Self {
            channel,
            listings,
            pushes: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChannelAdapter for MarketStub {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn fetch_remote_catalog(&self) -> Result<Vec<RemoteListing>, ChannelError> {
        Ok(self.listings.clone())
    }

    async fn submit_batch(&self, items: &[UploadItem]) -> Result<String, ChannelError> {
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(items.iter().map(|i| i.barcode.clone()).collect());
        Ok(format!("up-{}", uploads.len()))
    }

    /// Every batch completes on first poll, rejecting its second item.
    async fn poll_batch_status(&self, _batch_id: &str) -> Result<RemoteBatchState, ChannelError> {
        Ok(RemoteBatchState::Complete {
            failed_count: 1,
            failures: vec![ItemFailure {
                index: 1,
                reason: "image url unreachable".to_string(),
            }],
        })
    }

    async fn push_single_update(
        &self,
        external_id: &str,
        price: f64,
        stock: i64,
    ) -> Result<(), ChannelError> {
        self.pushes
            .lock()
            .unwrap()
            .push((external_id.to_string(), price, stock));
        Ok(())
    }
}

struct StaticTree(Vec<CategoryTreeNode>);

#[async_trait]
impl CategorySource for StaticTree {
    async fn bulk_fetch_category_tree(
        &self,
        _platform: Channel,
    ) -> Result<Vec<CategoryTreeNode>, ChannelError> {
        Ok(self.0.clone())
    }
}

fn node(id: &str, name: &str, children: Vec<CategoryTreeNode>) -> CategoryTreeNode {
    CategoryTreeNode {
        id: id.to_string(),
        name: name.to_string(),
        parent_id: None,
        is_leaf: children.is_empty(),
        children,
    }
}

fn listing(external_id: &str, barcode: &str, price: f64, stock: i64) -> RemoteListing {
    RemoteListing {
        external_id: external_id.to_string(),
        barcode: barcode.to_string(),
        price,
        stock,
        name: format!("Product {barcode}"),
    }
}

#[tokio::test]
async fn remote_catalog_flows_through_to_channel_pushes() {
    let audit = Arc::new(MemoryAuditLog::new());
    let store = CatalogStore::in_memory(audit.clone()).await.unwrap();

    let hb = Arc::new(MarketStub::new(
        Channel::Hepsiburada,
        vec![
            listing("HB-1", "8690001", 100.0, 4),
            listing("HB-2", "8690002", 55.5, 0),
        ],
    ));
    let pz = Arc::new(MarketStub::new(
        Channel::Pazarama,
        vec![listing("PZ-1", "8690001-PZR", 0.0, 6)],
    ));

    let hb_report = ingest_remote_catalog(&store, hb.as_ref()).await.unwrap();
    assert_eq!(hb_report.created, 2);
    let pz_report = ingest_remote_catalog(&store, pz.as_ref()).await.unwrap();
    assert_eq!(pz_report.updated, 1);
    assert_eq!(pz_report.duplicates, 0);

    let merged = store.get_product("8690001").await.unwrap().unwrap();
    assert!((merged.price - 100.0).abs() < f64::EPSILON);
    assert_eq!(merged.stock, 6);
    assert_eq!(
        merged.channels.linked_channels(),
        vec![Channel::Hepsiburada, Channel::Pazarama]
    );
    assert_eq!(merged.channels.pazarama.message.as_deref(), Some("linked: HB"));

    store
        .set_markup("8690001", Channel::Pazarama, 1.1)
        .await
        .unwrap();

    let dispatcher = ChangeDispatcher::new(
        store.clone(),
        [hb.clone() as Arc<dyn ChannelAdapter>, pz.clone()],
        DispatcherConfig::default(),
    );
    let sweep = dispatcher.sweep().await.unwrap();
    assert_eq!(sweep.fetched, 2);
    assert_eq!(sweep.cleared, 2);
    assert_eq!(store.count_dirty().await.unwrap(), 0);

    let mut hb_pushes = hb.pushes.lock().unwrap().clone();
    hb_pushes.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        hb_pushes,
        vec![
            ("HB-1".to_string(), 100.0, 6),
            ("HB-2".to_string(), 55.5, 0)
        ]
    );
    assert_eq!(
        pz.pushes.lock().unwrap().clone(),
        vec![("PZ-1".to_string(), 110.0, 6)]
    );

    let synced = store.get_product("8690002").await.unwrap().unwrap();
    assert_eq!(synced.channels.hepsiburada.status, SyncStatus::Synced);
    assert_eq!(synced.channels.pazarama.status, SyncStatus::Pending);
}

#[tokio::test]
async fn end_to_end_reconciliation_keeps_identities_distinct() {
    let audit = Arc::new(MemoryAuditLog::new());
    let store = CatalogStore::in_memory(audit.clone()).await.unwrap();

    let candidates = [
        ProductCandidate::new("B-001").with_link(Channel::Pazarama, "X-1"),
        ProductCandidate::new("B-002").with_link(Channel::Pazarama, "X-2"),
        ProductCandidate::new("B-003").with_link(Channel::Pazarama, "X-3"),
        ProductCandidate::new("B-002").with_link(Channel::Pazarama, "X-9"),
    ];
    for candidate in &candidates {
        store.upsert(candidate).await.unwrap();
    }

    let events = store.list_duplicate_events(10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].old_external_id, "X-2");
    assert_eq!(events[0].new_external_id, "X-9");

    let mut ids = Vec::new();
    for barcode in ["B-001", "B-002", "B-003"] {
        let product = store.get_product(barcode).await.unwrap().unwrap();
        ids.push(product.channels.pazarama.linked_id().unwrap().to_string());
    }
    assert_eq!(ids, vec!["X-1", "X-9", "X-3"]);
    assert_eq!(audit.matching("[DUPLICATE]").len(), 1);
}

#[tokio::test]
async fn resolved_category_feeds_a_tracked_upload() {
    let audit = Arc::new(MemoryAuditLog::new());
    let store = CatalogStore::in_memory(audit.clone()).await.unwrap();

    let tree = StaticTree(vec![node(
        "1",
        "Ev & Yaşam",
        vec![
            node("11", "Su Isıtıcı", vec![]),
            node("12", "Tost Makinesi", vec![]),
        ],
    )]);
    let imported = import_category_tree(&store, &tree, Channel::Pazarama)
        .await
        .unwrap();
    assert_eq!(imported, 3);

    let reconciler = CategoryReconciler::new(store.clone(), ReconcilerConfig::default());
    let resolution = reconciler
        .resolve("SU ISITICI", Channel::Pazarama)
        .await
        .unwrap();
    assert!(matches!(resolution, Resolution::AutoAccepted(ref c) if c.category_id == "11"));
    assert_eq!(
        store
            .get_category_mapping("su ısıtıcı", Channel::Pazarama)
            .await
            .unwrap()
            .as_deref(),
        Some("11")
    );

    let category_id = resolution.category_id().unwrap().to_string();
    let items: Vec<UploadItem> = ["8690001", "8690002", "8690003"]
        .iter()
        .map(|barcode| UploadItem {
            barcode: (*barcode).to_string(),
            name: format!("Kettle {barcode}"),
            category_id: category_id.clone(),
            price: 249.9,
            stock: 2,
            vat_rate: 20,
            brand: "Acme".to_string(),
            description: String::new(),
            images: Vec::new(),
        })
        .collect();

    let market = Arc::new(MarketStub::new(Channel::Pazarama, Vec::new()));
    let tracker = BatchTracker::new(
        market.clone(),
        audit.clone(),
        TrackerConfig {
            poll_interval: Duration::from_millis(10),
            ceiling: Duration::from_secs(5),
        },
    );
    let run = tracker
        .submit_batches(
            items,
            UploadPlan {
                chunk_size: 2,
                pause: Duration::from_millis(5),
            },
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(run.batch_ids, vec!["up-1", "up-2"]);

    let jobs = run.join_all().await;
    assert_eq!(jobs.len(), 2);
    let with_failures: Vec<_> = jobs
        .iter()
        .filter(|j| j.status == BatchStatus::CompletedWithFailures)
        .collect();
    // The single-item batch has no index 1, so its failure is dropped.
    assert_eq!(with_failures.len(), 2);
    let red = audit.matching("[RED]");
    assert_eq!(red.len(), 1);
    assert!(red[0].contains("8690002 (Kettle 8690002) -> image url unreachable"));
}
