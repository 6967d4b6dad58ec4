use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use mcat_core::{MemoryAuditLog, PlatformCategoryNode};

use super::*;

async fn store_with_leaves(platform: Channel, leaves: &[(&str, &str)]) -> CatalogStore {
    let store = CatalogStore::in_memory(Arc::new(MemoryAuditLog::new()))
        .await
        .unwrap();
    let nodes: Vec<PlatformCategoryNode> = leaves
        .iter()
        .map(|(id, name)| PlatformCategoryNode {
            platform,
            category_id: (*id).to_string(),
            name: (*name).to_string(),
            parent_id: "0".to_string(),
            parent_name: None,
            is_leaf: true,
        })
        .collect();
    store.upsert_platform_categories(&nodes).await.unwrap();
    store
}

/// Scores each leaf by its normalized name, ignoring the query.
fn fixed_scores(scores: &[(&str, f64)]) -> Scorer {
    let table: HashMap<String, f64> = scores
        .iter()
        .map(|(name, score)| (normalize_category_name(name), *score))
        .collect();
    Arc::new(move |_query: &str, leaf: &str| table.get(leaf).copied().unwrap_or(0.0))
}

struct ScriptedChooser {
    choice: Choice,
    offered: Mutex<Vec<Vec<String>>>,
}

impl ScriptedChooser {
    fn new(choice: Choice) -> Self {
        Self {
            choice,
            offered: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Disambiguator for ScriptedChooser {
    async fn choose(&self, _name: &str, _platform: Channel, candidates: &[CategoryCandidate]) -> Choice {
        self.offered
            .lock()
            .unwrap()
            .push(candidates.iter().map(|c| c.category_id.clone()).collect());
        self.choice.clone()
    }
}

#[tokio::test]
async fn high_score_auto_resolves_and_caches() {
    let store = store_with_leaves(Channel::Hepsiburada, &[("10", "Kettle"), ("11", "Toaster")]).await;
    let reconciler = CategoryReconciler::new(store.clone(), ReconcilerConfig::default())
        .with_scorer(fixed_scores(&[("Kettle", 0.96), ("Toaster", 0.40)]));

    let first = reconciler.resolve("Su Isıtıcı", Channel::Hepsiburada).await.unwrap();
    assert!(matches!(first, Resolution::AutoAccepted(ref c) if c.category_id == "10"));

    let key = normalize_category_name("Su Isıtıcı");
    assert_eq!(
        store
            .get_category_mapping(&key, Channel::Hepsiburada)
            .await
            .unwrap()
            .as_deref(),
        Some("10")
    );

    let second = reconciler.resolve("  su ısıtıcı ", Channel::Hepsiburada).await.unwrap();
    assert_eq!(second, Resolution::Cached("10".to_string()));
}

#[tokio::test]
async fn low_score_offers_top_three_without_caching() {
    let store = store_with_leaves(
        Channel::Pazarama,
        &[("1", "A"), ("2", "B"), ("3", "C"), ("4", "D")],
    )
    .await;
    let reconciler = CategoryReconciler::new(store.clone(), ReconcilerConfig::default())
        .with_scorer(fixed_scores(&[("A", 0.50), ("B", 0.80), ("C", 0.70), ("D", 0.60)]));

    let resolution = reconciler.resolve("Çaydanlık", Channel::Pazarama).await.unwrap();
    let Resolution::Ambiguous(candidates) = resolution else {
        panic!("expected ambiguous, got {resolution:?}");
    };
    let ids: Vec<&str> = candidates.iter().map(|c| c.category_id.as_str()).collect();
    assert_eq!(ids, vec!["2", "3", "4"]);

    let key = normalize_category_name("Çaydanlık");
    assert!(store
        .get_category_mapping(&key, Channel::Pazarama)
        .await
        .unwrap()
        .is_none());

    reconciler
        .confirm("Çaydanlık", Channel::Pazarama, "3")
        .await
        .unwrap();
    assert_eq!(
        reconciler.resolve("çaydanlık", Channel::Pazarama).await.unwrap(),
        Resolution::Cached("3".to_string())
    );
}

#[tokio::test]
async fn equal_scores_keep_insertion_order() {
    let store = store_with_leaves(Channel::Ptt, &[("7", "X"), ("5", "Y"), ("6", "Z")]).await;
    let reconciler = CategoryReconciler::new(store, ReconcilerConfig::default())
        .with_scorer(fixed_scores(&[("X", 0.5), ("Y", 0.5), ("Z", 0.5)]));

    let Resolution::Ambiguous(candidates) = reconciler.resolve("q", Channel::Ptt).await.unwrap() else {
        panic!("expected ambiguous");
    };
    let ids: Vec<&str> = candidates.iter().map(|c| c.category_id.as_str()).collect();
    assert_eq!(ids, vec!["7", "5", "6"]);
}

#[tokio::test]
async fn no_leaves_is_unmatched() {
    let store = store_with_leaves(Channel::Ptt, &[]).await;
    let reconciler = CategoryReconciler::new(store, ReconcilerConfig::default());
    assert_eq!(
        reconciler.resolve("Kettle", Channel::Ptt).await.unwrap(),
        Resolution::Unmatched
    );
}

#[tokio::test]
async fn default_scorer_accepts_case_folded_exact_name() {
    let store = store_with_leaves(
        Channel::Hepsiburada,
        &[("1", "Mutfak Gereçleri"), ("2", "IŞIKLANDIRMA")],
    )
    .await;
    let reconciler = CategoryReconciler::new(store, ReconcilerConfig::default());

    let resolution = reconciler.resolve("ışıklandırma", Channel::Hepsiburada).await.unwrap();
    assert_eq!(resolution.category_id(), Some("2"));
}

#[tokio::test]
async fn require_reports_ambiguity_and_absence() {
    let store = store_with_leaves(Channel::Pazarama, &[("1", "A")]).await;
    let reconciler = CategoryReconciler::new(store, ReconcilerConfig::default())
        .with_scorer(fixed_scores(&[("A", 0.3)]));

    let err = reconciler.require("Kettle", Channel::Pazarama).await.unwrap_err();
    assert!(matches!(err, SyncError::AmbiguousMatch { ref candidates, .. } if candidates.len() == 1));

    let err = reconciler.require("Kettle", Channel::Ptt).await.unwrap_err();
    assert!(matches!(err, SyncError::Unmatched { platform: Channel::Ptt, .. }));
}

#[tokio::test]
async fn chosen_candidate_is_cached() {
    let store = store_with_leaves(Channel::Pazarama, &[("1", "A"), ("2", "B")]).await;
    let reconciler = CategoryReconciler::new(store, ReconcilerConfig::default())
        .with_scorer(fixed_scores(&[("A", 0.8), ("B", 0.7)]));
    let chooser = ScriptedChooser::new(Choice::Candidate(1));

    let chosen = reconciler
        .resolve_with("Kettle", Channel::Pazarama, &chooser)
        .await
        .unwrap();
    assert_eq!(chosen.as_deref(), Some("2"));
    assert_eq!(chooser.offered.lock().unwrap().clone(), vec![vec!["1", "2"]]);
    assert_eq!(
        reconciler.resolve("Kettle", Channel::Pazarama).await.unwrap(),
        Resolution::Cached("2".to_string())
    );
}

#[tokio::test]
async fn manual_id_is_cached_when_nothing_matches() {
    let store = store_with_leaves(Channel::Ptt, &[]).await;
    let reconciler = CategoryReconciler::new(store, ReconcilerConfig::default());
    let chooser = ScriptedChooser::new(Choice::Manual(" 4411 ".to_string()));

    let chosen = reconciler
        .resolve_with("Kettle", Channel::Ptt, &chooser)
        .await
        .unwrap();
    assert_eq!(chosen.as_deref(), Some("4411"));
    assert_eq!(chooser.offered.lock().unwrap()[0].len(), 0);
    assert_eq!(
        reconciler.resolve("Kettle", Channel::Ptt).await.unwrap(),
        Resolution::Cached("4411".to_string())
    );
}

#[tokio::test]
async fn skip_and_out_of_range_choices_cache_nothing() {
    let store = store_with_leaves(Channel::Ptt, &[("1", "A")]).await;
    let reconciler = CategoryReconciler::new(store, ReconcilerConfig::default())
        .with_scorer(fixed_scores(&[("A", 0.2)]));

    for choice in [Choice::Skip, Choice::Candidate(5), Choice::Manual("  ".to_string())] {
        let chooser = ScriptedChooser::new(choice);
        let chosen = reconciler
            .resolve_with("Kettle", Channel::Ptt, &chooser)
            .await
            .unwrap();
        assert!(chosen.is_none());
    }
    assert!(matches!(
        reconciler.resolve("Kettle", Channel::Ptt).await.unwrap(),
        Resolution::Ambiguous(_)
    ));
}

#[tokio::test]
async fn confirm_rejects_blank_id_and_clear_forgets_mappings() {
    let store = store_with_leaves(Channel::Ptt, &[]).await;
    let reconciler = CategoryReconciler::new(store, ReconcilerConfig::default());

    assert!(matches!(
        reconciler.confirm("Kettle", Channel::Ptt, " ").await,
        Err(SyncError::EmptyCategoryId)
    ));

    reconciler.confirm("Kettle", Channel::Ptt, "9").await.unwrap();
    assert_eq!(reconciler.clear_mappings().await.unwrap(), 1);
    assert_eq!(
        reconciler.resolve("Kettle", Channel::Ptt).await.unwrap(),
        Resolution::Unmatched
    );
}

#[test]
fn config_reads_category_settings() {
    let config = ReconcilerConfig::from_app_config(&crate::fakes::app_config());
    assert!((config.auto_accept - 0.9).abs() < f64::EPSILON);
    assert_eq!(config.max_candidates, 5);
}
