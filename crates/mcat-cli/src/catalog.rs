//! Master catalog command handlers for the CLI.
//!
//! Called from `main` after the store is connected and migrated. Import
//! failures for single candidates are logged and counted rather than
//! aborting the file.

use std::path::Path;

use mcat_core::{link_summary, Channel, PriceAdjustment, ProductCandidate};
use mcat_db::{CatalogStore, DbError};

/// Reads a JSON array of candidates.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not an array of
/// candidates.
pub(crate) async fn load_candidates(path: &Path) -> anyhow::Result<Vec<ProductCandidate>> {
    let body = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let candidates: Vec<ProductCandidate> = serde_json::from_str(&body)
        .map_err(|e| anyhow::anyhow!("{} is not a candidate array: {e}", path.display()))?;
    Ok(candidates)
}

/// Merge every candidate in `path` into the master catalog.
///
/// # Errors
///
/// Returns an error if the file cannot be loaded. Candidates the store
/// rejects are logged and skipped.
pub(crate) async fn run_import_products(store: &CatalogStore, path: &Path) -> anyhow::Result<()> {
    let candidates = load_candidates(path).await?;

    let (mut created, mut updated, mut duplicates, mut failed) = (0usize, 0usize, 0usize, 0usize);
    for candidate in &candidates {
        match store.upsert(candidate).await {
            Ok(outcome) => {
                if outcome.created {
                    created += 1;
                } else {
                    updated += 1;
                }
                duplicates += outcome.duplicates.len();
            }
            Err(e) => {
                failed += 1;
                tracing::warn!(barcode = %candidate.barcode, error = %e, "skipping candidate");
            }
        }
    }

    println!(
        "{} candidate(s): {created} created, {updated} updated, {duplicates} duplicate id(s), {failed} failed",
        candidates.len()
    );
    Ok(())
}

/// Show records waiting for the dispatcher, oldest change first.
///
/// # Errors
///
/// Returns an error if the store query fails.
pub(crate) async fn run_dirty(store: &CatalogStore, limit: u32) -> anyhow::Result<()> {
    let total = store.count_dirty().await?;
    if total == 0 {
        println!("no records awaiting sync");
        return Ok(());
    }

    let records = store.fetch_dirty_batch(limit).await?;
    println!("{total} record(s) awaiting sync; showing {}", records.len());
    println!(
        "{:<8}{:<18}{:>10}{:>8}  CHANNELS",
        "SEQ", "BARCODE", "PRICE", "STOCK"
    );
    for record in &records {
        println!(
            "{:<8}{:<18}{:>10.2}{:>8}  {}",
            record.change_seq,
            record.barcode,
            record.price,
            record.stock,
            link_summary(&record.channels.linked_channels())
        );
    }
    Ok(())
}

/// Show recorded identity conflicts, newest first.
///
/// # Errors
///
/// Returns an error if the store query fails.
pub(crate) async fn run_duplicates(store: &CatalogStore, limit: u32) -> anyhow::Result<()> {
    let events = store.list_duplicate_events(limit).await?;
    if events.is_empty() {
        println!("no duplicate identities recorded");
        return Ok(());
    }

    println!(
        "{:<21}{:<10}{:<18}{:<20}NEW ID",
        "DETECTED", "CHANNEL", "BARCODE", "OLD ID"
    );
    for event in &events {
        println!(
            "{:<21}{:<10}{:<18}{:<20}{}",
            event.detected_at.format("%Y-%m-%d %H:%M:%S"),
            event.channel.label(),
            event.barcode,
            event.old_external_id,
            event.new_external_id
        );
    }
    Ok(())
}

/// Apply an operator price expression to one record.
///
/// Changes that more than double or halve the price are refused unless
/// `confirmed` is set.
///
/// # Errors
///
/// Returns an error if the record does not exist, the expression cannot be
/// parsed, the result is negative, or the change needs confirmation. The
/// stored price is untouched in every error case.
pub(crate) async fn run_reprice(
    store: &CatalogStore,
    barcode: &str,
    expr: &str,
    confirmed: bool,
) -> anyhow::Result<()> {
    let record = store
        .get_product(barcode)
        .await?
        .ok_or_else(|| anyhow::anyhow!("barcode '{barcode}' not found"))?;

    let adjustment: PriceAdjustment = expr
        .parse()
        .map_err(|e| anyhow::anyhow!("{e}; price stays {:.2}", record.price))?;
    let change = adjustment.apply(record.price);

    if change.new_price < 0.0 || !change.new_price.is_finite() {
        anyhow::bail!(
            "'{adjustment}' would set the price to {:.2}; price stays {:.2}",
            change.new_price,
            record.price
        );
    }
    if change.requires_confirmation && !confirmed {
        anyhow::bail!(
            "price change {:.2} -> {:.2} is unusually large; re-run with --yes to apply it",
            change.old_price,
            change.new_price
        );
    }

    let revision = store.set_price(barcode, change.new_price).await?;
    tracing::info!(barcode, old = change.old_price, new = change.new_price, revision, "price changed");
    println!(
        "{barcode}: {:.2} -> {:.2}",
        change.old_price, change.new_price
    );
    Ok(())
}

/// Set a channel markup on one record.
///
/// # Errors
///
/// Returns an error if `factor` is not a positive number or the record does
/// not exist.
pub(crate) async fn run_markup(
    store: &CatalogStore,
    barcode: &str,
    channel: Channel,
    factor: f64,
) -> anyhow::Result<()> {
    if !factor.is_finite() || factor <= 0.0 {
        anyhow::bail!("markup must be a positive number, got {factor}");
    }
    match store.set_markup(barcode, channel, factor).await {
        Ok(_) => {
            println!("{barcode}: {} markup set to {factor}", channel.label());
            Ok(())
        }
        Err(DbError::NotFound) => Err(anyhow::anyhow!("barcode '{barcode}' not found")),
        Err(e) => Err(e.into()),
    }
}
