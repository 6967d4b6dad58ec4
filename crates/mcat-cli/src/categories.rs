//! Category taxonomy and mapping command handlers for the CLI.

use std::io::Write;
use std::path::Path;

use async_trait::async_trait;
use mcat_channel::JsonCategoryFile;
use mcat_core::{AppConfig, CategoryCandidate, Channel};
use mcat_db::CatalogStore;
use mcat_sync::{import_category_tree, CategoryReconciler, Choice, Disambiguator, ReconcilerConfig};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Store `platform`'s category tree from a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or decoded, or the tree
/// cannot be stored.
pub(crate) async fn run_import_categories(
    store: &CatalogStore,
    platform: Channel,
    path: &Path,
) -> anyhow::Result<()> {
    let source = JsonCategoryFile::new(path);
    let written = import_category_tree(store, &source, platform).await?;
    let leaves = store.list_leaf_categories(platform).await?.len();
    println!(
        "{}: {written} categories stored ({leaves} leaves)",
        platform.label()
    );
    Ok(())
}

/// Answers a disambiguation with a choice given on the command line.
struct PresetChoice(Choice);

#[async_trait]
impl Disambiguator for PresetChoice {
    async fn choose(&self, _name: &str, _platform: Channel, _candidates: &[CategoryCandidate]) -> Choice {
        self.0.clone()
    }
}

/// Asks the operator on stdin.
struct StdinPrompt;

/// Reads one answer: a 1-based candidate number, a raw category id, or an
/// empty line to skip.
fn parse_answer(answer: &str, offered: usize) -> Choice {
    let answer = answer.trim();
    if answer.is_empty() {
        return Choice::Skip;
    }
    match answer.parse::<usize>() {
        Ok(n) if (1..=offered).contains(&n) => Choice::Candidate(n - 1),
        _ => Choice::Manual(answer.to_string()),
    }
}

#[async_trait]
impl Disambiguator for StdinPrompt {
    async fn choose(&self, name: &str, platform: Channel, candidates: &[CategoryCandidate]) -> Choice {
        if candidates.is_empty() {
            println!("no {} category resembles \"{name}\"", platform.label());
        } else {
            println!("\"{name}\" needs a {} category:", platform.label());
            for (i, candidate) in candidates.iter().enumerate() {
                println!(
                    "  {}. {} [{}] score {:.3}",
                    i + 1,
                    candidate.name,
                    candidate.category_id,
                    candidate.score
                );
            }
        }
        print!("number, category id, or empty to skip: ");
        if let Err(e) = std::io::stdout().flush() {
            tracing::warn!(error = %e, "failed to flush prompt");
        }

        let mut line = String::new();
        match BufReader::new(tokio::io::stdin()).read_line(&mut line).await {
            Ok(_) => parse_answer(&line, candidates.len()),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read answer; skipping");
                Choice::Skip
            }
        }
    }
}

/// Map a master category name to a leaf category of `platform`.
///
/// `choose` (1-based) or `id` answer an ambiguous match without prompting.
///
/// # Errors
///
/// Returns an error if the store cannot be read or written.
pub(crate) async fn run_resolve_category(
    store: &CatalogStore,
    config: &AppConfig,
    platform: Channel,
    name: &str,
    choose: Option<usize>,
    id: Option<String>,
) -> anyhow::Result<()> {
    let reconciler = CategoryReconciler::new(store.clone(), ReconcilerConfig::from_app_config(config));

    let chooser: Box<dyn Disambiguator> = match (choose, id) {
        (Some(n), _) => Box::new(PresetChoice(
            n.checked_sub(1).map_or(Choice::Skip, Choice::Candidate),
        )),
        (None, Some(id)) => Box::new(PresetChoice(Choice::Manual(id))),
        (None, None) => Box::new(StdinPrompt),
    };

    match reconciler.resolve_with(name, platform, chooser.as_ref()).await? {
        Some(category_id) => println!("{name} -> {} {category_id}", platform.label()),
        None => println!("{name}: left unmapped on {}", platform.label()),
    }
    Ok(())
}

/// Forget every cached category mapping.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub(crate) async fn run_clear_mappings(
    store: &CatalogStore,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let reconciler = CategoryReconciler::new(store.clone(), ReconcilerConfig::from_app_config(config));
    let removed = reconciler.clear_mappings().await?;
    println!("removed {removed} category mapping(s)");
    Ok(())
}
