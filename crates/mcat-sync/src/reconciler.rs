//! Free-text category names to platform category ids.
//!
//! Resolution order: cached mapping, then fuzzy search over the platform's
//! leaf categories. A top score at or above the auto-accept threshold is
//! cached without asking anyone; anything weaker is handed back as a short
//! candidate list and cached only once somebody picks.

use std::sync::Arc;

use async_trait::async_trait;
use mcat_core::{normalize_category_name, AppConfig, CategoryCandidate, Channel};
use mcat_db::CatalogStore;

use crate::SyncError;

const DEFAULT_AUTO_ACCEPT: f64 = 0.95;
const DEFAULT_MAX_CANDIDATES: usize = 3;

/// Similarity between two normalized names, in `[0, 1]`.
pub type Scorer = Arc<dyn Fn(&str, &str) -> f64 + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcilerConfig {
    pub auto_accept: f64,
    pub max_candidates: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            auto_accept: DEFAULT_AUTO_ACCEPT,
            max_candidates: DEFAULT_MAX_CANDIDATES,
        }
    }
}

impl ReconcilerConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            auto_accept: config.category_auto_accept,
            max_candidates: config.category_candidates.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Served from the mapping cache.
    Cached(String),
    /// Best match scored above the threshold and is now cached.
    AutoAccepted(CategoryCandidate),
    /// Best matches, strongest first; nothing was cached.
    Ambiguous(Vec<CategoryCandidate>),
    /// The platform has no leaf categories to compare against.
    Unmatched,
}

impl Resolution {
    #[must_use]
    pub fn category_id(&self) -> Option<&str> {
        match self {
            Self::Cached(id) => Some(id),
            Self::AutoAccepted(candidate) => Some(&candidate.category_id),
            Self::Ambiguous(_) | Self::Unmatched => None,
        }
    }
}

/// A decision on a category that could not be resolved automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    /// Zero-based index into the offered candidates.
    Candidate(usize),
    /// A raw platform category id typed by the operator.
    Manual(String),
    Skip,
}

/// Picks a category when fuzzy matching is not conclusive. `candidates` is
/// empty when nothing could be scored.
#[async_trait]
pub trait Disambiguator: Send + Sync {
    async fn choose(&self, name: &str, platform: Channel, candidates: &[CategoryCandidate])
        -> Choice;
}

#[derive(Clone)]
pub struct CategoryReconciler {
    store: CatalogStore,
    config: ReconcilerConfig,
    scorer: Scorer,
}

impl std::fmt::Debug for CategoryReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CategoryReconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CategoryReconciler {
    /// A reconciler scoring with Jaro-Winkler similarity.
    #[must_use]
    pub fn new(store: CatalogStore, config: ReconcilerConfig) -> Self {
        Self {
            store,
            config,
            scorer: Arc::new(strsim::jaro_winkler),
        }
    }

    #[must_use]
    pub fn with_scorer(mut self, scorer: Scorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// # Errors
    ///
    /// Returns [`SyncError::Storage`] if the cache or category tables cannot
    /// be read or written.
    pub async fn resolve(&self, name: &str, platform: Channel) -> Result<Resolution, SyncError> {
        let key = normalize_category_name(name);
        if key.is_empty() {
            return Ok(Resolution::Unmatched);
        }

        if let Some(id) = self.store.get_category_mapping(&key, platform).await? {
            tracing::debug!(name = %key, %platform, category_id = %id, "category mapping cache hit");
            return Ok(Resolution::Cached(id));
        }

        let mut candidates: Vec<CategoryCandidate> = self
            .store
            .list_leaf_categories(platform)
            .await?
            .into_iter()
            .map(|leaf| CategoryCandidate {
                score: (self.scorer)(&key, &normalize_category_name(&leaf.name)),
                category_id: leaf.category_id,
                name: leaf.name,
            })
            .collect();
        // Stable: equal scores keep leaf insertion order.
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

        let Some(best) = candidates.first() else {
            return Ok(Resolution::Unmatched);
        };
        if best.score >= self.config.auto_accept {
            let best = best.clone();
            self.store
                .upsert_category_mapping(&key, platform, &best.category_id)
                .await?;
            tracing::info!(
                name = %key,
                %platform,
                category_id = %best.category_id,
                score = best.score,
                "category auto-matched"
            );
            return Ok(Resolution::AutoAccepted(best));
        }

        candidates.truncate(self.config.max_candidates);
        Ok(Resolution::Ambiguous(candidates))
    }

    /// Caches an explicit choice for `name` on `platform`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::EmptyCategoryId`] for a blank id, or
    /// [`SyncError::Storage`] if the mapping cannot be written.
    pub async fn confirm(
        &self,
        name: &str,
        platform: Channel,
        category_id: &str,
    ) -> Result<(), SyncError> {
        let category_id = category_id.trim();
        if category_id.is_empty() {
            return Err(SyncError::EmptyCategoryId);
        }
        let key = normalize_category_name(name);
        self.store
            .upsert_category_mapping(&key, platform, category_id)
            .await?;
        tracing::info!(name = %key, %platform, category_id, "category mapping confirmed");
        Ok(())
    }

    /// Resolves without human input.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AmbiguousMatch`] or [`SyncError::Unmatched`] when
    /// the name cannot be resolved automatically, and [`SyncError::Storage`]
    /// on store failures.
    pub async fn require(&self, name: &str, platform: Channel) -> Result<String, SyncError> {
        match self.resolve(name, platform).await? {
            Resolution::Cached(id) => Ok(id),
            Resolution::AutoAccepted(candidate) => Ok(candidate.category_id),
            Resolution::Ambiguous(candidates) => Err(SyncError::AmbiguousMatch {
                name: name.to_string(),
                platform,
                candidates,
            }),
            Resolution::Unmatched => Err(SyncError::Unmatched {
                name: name.to_string(),
                platform,
            }),
        }
    }

    /// Resolves, asking `chooser` when matching is not conclusive. Whatever
    /// is chosen is cached. Returns `None` if the chooser skips.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Storage`] on store failures.
    pub async fn resolve_with(
        &self,
        name: &str,
        platform: Channel,
        chooser: &dyn Disambiguator,
    ) -> Result<Option<String>, SyncError> {
        let candidates = match self.resolve(name, platform).await? {
            Resolution::Cached(id) => return Ok(Some(id)),
            Resolution::AutoAccepted(candidate) => return Ok(Some(candidate.category_id)),
            Resolution::Ambiguous(candidates) => candidates,
            Resolution::Unmatched => Vec::new(),
        };

        let chosen = match chooser.choose(name, platform, &candidates).await {
            Choice::Candidate(index) => match candidates.get(index) {
                Some(candidate) => candidate.category_id.clone(),
                None => {
                    tracing::warn!(index, offered = candidates.len(), "choice out of range");
                    return Ok(None);
                }
            },
            Choice::Manual(id) if !id.trim().is_empty() => id.trim().to_string(),
            Choice::Manual(_) | Choice::Skip => return Ok(None),
        };

        self.confirm(name, platform, &chosen).await?;
        Ok(Some(chosen))
    }

    /// Forgets every cached mapping. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Storage`] if the delete fails.
    pub async fn clear_mappings(&self) -> Result<u64, SyncError> {
        let removed = self.store.clear_category_mappings().await?;
        tracing::info!(removed, "category mappings cleared");
        Ok(removed)
    }
}

#[cfg(test)]
#[path = "reconciler_test.rs"]
mod tests;
