//! Database operations for `products`: the merge engine and the dirty-flag
//! protocol.
//!
//! Every change-producing write sets `is_dirty = 1` and assigns a fresh
//! `change_seq` (store-wide `MAX + 1`). It is the revision token that sync
//! write-backs must quote before they may clear the flag.
//!
//! The dirty set is served in `queue_seq` order. A change sets `queue_seq`
//! together with `change_seq`; a write-back that leaves the record dirty
//! without a concurrent change moves it behind every queued record, so
//! records that keep failing never starve newer work.

use chrono::{DateTime, Utc};
use mcat_core::{
    link_summary, Channel, ChannelState, ChannelStates, MasterProduct, ProductCandidate,
    SyncStatus,
};
use sqlx::{SqliteConnection, SqlitePool};

use crate::duplicates::{insert_duplicate_event, DuplicateDetector, DuplicateEvent};
use crate::DbError;

const IMAGE_SEPARATOR: &str = "|";

const PRODUCT_COLUMNS: &str = "barcode, name, brand, category_name, description, price, \
     vat_rate, stock, delivery_time, images, \
     hb_id, hb_status, hb_message, hb_markup, \
     pazarama_id, pazarama_status, pazarama_message, pazarama_markup, \
     ptt_id, ptt_status, ptt_message, ptt_markup, \
     is_dirty, change_seq, updated_at";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ProductRow {
    barcode: String,
    name: String,
    brand: String,
    category_name: String,
    description: String,
    price: f64,
    vat_rate: i32,
    stock: i64,
    delivery_time: i32,
    images: String,
    hb_id: Option<String>,
    hb_status: String,
    hb_message: Option<String>,
    hb_markup: f64,
    pazarama_id: Option<String>,
    pazarama_status: String,
    pazarama_message: Option<String>,
    pazarama_markup: f64,
    ptt_id: Option<String>,
    ptt_status: String,
    ptt_message: Option<String>,
    ptt_markup: f64,
    is_dirty: bool,
    change_seq: i64,
    updated_at: DateTime<Utc>,
}

fn channel_state(
    external_id: Option<String>,
    status: &str,
    message: Option<String>,
    markup: f64,
) -> Result<ChannelState, DbError> {
    let status = status
        .parse::<SyncStatus>()
        .map_err(|e| DbError::Decode(e.to_string()))?;
    Ok(ChannelState {
        external_id,
        status,
        message,
        markup,
    })
}

impl TryFrom<ProductRow> for MasterProduct {
    type Error = DbError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let channels = ChannelStates {
            hepsiburada: channel_state(row.hb_id, &row.hb_status, row.hb_message, row.hb_markup)?,
            pazarama: channel_state(
                row.pazarama_id,
                &row.pazarama_status,
                row.pazarama_message,
                row.pazarama_markup,
            )?,
            ptt: channel_state(row.ptt_id, &row.ptt_status, row.ptt_message, row.ptt_markup)?,
        };
        Ok(Self {
            barcode: row.barcode,
            name: row.name,
            brand: row.brand,
            category_name: row.category_name,
            description: row.description,
            price: row.price,
            vat_rate: row.vat_rate,
            stock: row.stock,
            delivery_time: row.delivery_time,
            images: decode_images(&row.images),
            channels,
            dirty: row.is_dirty,
            change_seq: row.change_seq,
            updated_at: row.updated_at,
        })
    }
}

fn decode_images(raw: &str) -> Vec<String> {
    raw.split(IMAGE_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn encode_images(images: &[String]) -> String {
    images
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(IMAGE_SEPARATOR)
}

/// Result of one channel's push, as written back by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSyncResult {
    pub channel: Channel,
    pub status: SyncStatus,
    pub message: String,
}

impl ChannelSyncResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status != SyncStatus::Error
    }
}

/// What an [`upsert_product`] call did.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    pub created: bool,
    pub change_seq: i64,
    /// Identity conflicts recorded by this merge.
    pub duplicates: Vec<DuplicateEvent>,
}

// ---------------------------------------------------------------------------
// Merge rules
// ---------------------------------------------------------------------------

fn blank_product(barcode: &str, now: DateTime<Utc>) -> MasterProduct {
    MasterProduct {
        barcode: barcode.to_string(),
        name: String::new(),
        brand: String::new(),
        category_name: String::new(),
        description: String::new(),
        price: 0.0,
        vat_rate: 20,
        stock: 0,
        delivery_time: 3,
        images: Vec::new(),
        channels: ChannelStates::default(),
        dirty: true,
        change_seq: 0,
        updated_at: now,
    }
}

fn fill_if_empty(stored: &mut String, incoming: &str) {
    let incoming = incoming.trim();
    if stored.trim().is_empty() && !incoming.is_empty() {
        *stored = incoming.to_string();
    }
}

/// Merges `candidate` into `existing` (or a fresh record) field by field.
///
/// Text fields and images only fill empty values. Price is taken when
/// positive, stock always. A non-empty channel id always replaces the stored
/// one; the caller is responsible for auditing the replacement. `change_seq`
/// is left for the caller to assign.
pub(crate) fn merge_candidate(
    existing: Option<&MasterProduct>,
    candidate: &ProductCandidate,
    now: DateTime<Utc>,
) -> MasterProduct {
    let mut product = existing
        .cloned()
        .unwrap_or_else(|| blank_product(&candidate.barcode, now));

    fill_if_empty(&mut product.name, &candidate.name);
    fill_if_empty(&mut product.brand, &candidate.brand);
    fill_if_empty(&mut product.category_name, &candidate.category_name);
    fill_if_empty(&mut product.description, &candidate.description);

    if candidate.price > 0.0 {
        product.price = candidate.price;
    }
    product.stock = candidate.stock;
    if let Some(vat_rate) = candidate.vat_rate {
        product.vat_rate = vat_rate;
    }
    if let Some(delivery_time) = candidate.delivery_time {
        product.delivery_time = delivery_time;
    }
    if product.images.is_empty() {
        product.images = candidate
            .images
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }

    let linked_before = existing
        .map(|p| p.channels.linked_channels())
        .unwrap_or_default();
    let message = link_summary(&linked_before);

    for channel in Channel::ALL {
        let Some(link) = candidate.link(channel) else {
            continue;
        };
        let state = product.channels.get_mut(channel);
        if existing.is_none() {
            if let Some(markup) = link.markup {
                state.markup = markup;
            }
        }
        let Some(external_id) = candidate.external_id(channel) else {
            continue;
        };
        state.external_id = Some(external_id.to_string());
        if let Some(status) = link.status {
            state.status = status;
        }
        state.message = Some(message.clone());
    }

    product.dirty = true;
    product.updated_at = now;
    product
}

// ---------------------------------------------------------------------------
// products operations
// ---------------------------------------------------------------------------

/// Next value of the store-wide sequence shared by `change_seq` and
/// `queue_seq`.
async fn next_change_seq(conn: &mut SqliteConnection) -> Result<i64, DbError> {
    let seq = sqlx::query_scalar::<_, i64>(
        "SELECT MAX(COALESCE(MAX(change_seq), 0), COALESCE(MAX(queue_seq), 0)) + 1 FROM products",
    )
    .fetch_one(conn)
    .await?;
    Ok(seq)
}

async fn fetch_product(
    conn: &mut SqliteConnection,
    barcode: &str,
) -> Result<Option<MasterProduct>, DbError> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE barcode = ?"
    ))
    .bind(barcode)
    .fetch_optional(conn)
    .await?;

    row.map(MasterProduct::try_from).transpose()
}

async fn write_product(conn: &mut SqliteConnection, p: &MasterProduct) -> Result<(), DbError> {
    let hb = &p.channels.hepsiburada;
    let pz = &p.channels.pazarama;
    let ptt = &p.channels.ptt;

    sqlx::query(&format!(
        "INSERT INTO products ({PRODUCT_COLUMNS}, queue_seq) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, \
                 ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, \
                 ?, ?, ?, ?) \
         ON CONFLICT (barcode) DO UPDATE SET \
             name             = excluded.name, \
             brand            = excluded.brand, \
             category_name    = excluded.category_name, \
             description      = excluded.description, \
             price            = excluded.price, \
             vat_rate         = excluded.vat_rate, \
             stock            = excluded.stock, \
             delivery_time    = excluded.delivery_time, \
             images           = excluded.images, \
             hb_id            = excluded.hb_id, \
             hb_status        = excluded.hb_status, \
             hb_message       = excluded.hb_message, \
             hb_markup        = excluded.hb_markup, \
             pazarama_id      = excluded.pazarama_id, \
             pazarama_status  = excluded.pazarama_status, \
             pazarama_message = excluded.pazarama_message, \
             pazarama_markup  = excluded.pazarama_markup, \
             ptt_id           = excluded.ptt_id, \
             ptt_status       = excluded.ptt_status, \
             ptt_message      = excluded.ptt_message, \
             ptt_markup       = excluded.ptt_markup, \
             is_dirty         = excluded.is_dirty, \
             change_seq       = excluded.change_seq, \
             updated_at       = excluded.updated_at, \
             queue_seq        = excluded.queue_seq"
    ))
    .bind(&p.barcode)
    .bind(&p.name)
    .bind(&p.brand)
    .bind(&p.category_name)
    .bind(&p.description)
    .bind(p.price)
    .bind(p.vat_rate)
    .bind(p.stock)
    .bind(p.delivery_time)
    .bind(encode_images(&p.images))
    .bind(&hb.external_id)
    .bind(hb.status.as_str())
    .bind(&hb.message)
    .bind(hb.markup)
    .bind(&pz.external_id)
    .bind(pz.status.as_str())
    .bind(&pz.message)
    .bind(pz.markup)
    .bind(&ptt.external_id)
    .bind(ptt.status.as_str())
    .bind(&ptt.message)
    .bind(ptt.markup)
    .bind(p.dirty)
    .bind(p.change_seq)
    .bind(p.updated_at)
    .bind(p.change_seq)
    .execute(conn)
    .await?;

    Ok(())
}

/// Merges a candidate into the master catalog, creating the record when the
/// barcode is unseen.
///
/// Runs in a single transaction: on failure nothing is written. Identity
/// conflicts are persisted in the same transaction and reported through the
/// detector once the merge has committed.
///
/// # Errors
///
/// Returns [`DbError::Invalid`] for a candidate without a barcode, or
/// [`DbError::Sqlx`] if any statement fails.
pub async fn upsert_product(
    pool: &SqlitePool,
    detector: &DuplicateDetector,
    candidate: &ProductCandidate,
) -> Result<UpsertOutcome, DbError> {
    let mut candidate = candidate.clone();
    candidate.validate()?;

    let mut tx = pool.begin().await?;

    let existing = fetch_product(&mut tx, &candidate.barcode).await?;
    let mut merged = merge_candidate(existing.as_ref(), &candidate, Utc::now());

    let duplicates: Vec<DuplicateEvent> = Channel::ALL
        .into_iter()
        .filter_map(|channel| {
            let incoming = candidate.external_id(channel)?;
            detector.check(existing.as_ref(), channel, incoming, merged.price, merged.stock)
        })
        .collect();
    for event in &duplicates {
        insert_duplicate_event(&mut tx, event).await?;
    }

    merged.change_seq = next_change_seq(&mut tx).await?;
    write_product(&mut tx, &merged).await?;

    tx.commit().await?;

    for event in &duplicates {
        detector.report(event);
    }
    tracing::debug!(
        barcode = %merged.barcode,
        change_seq = merged.change_seq,
        created = existing.is_none(),
        "product upserted"
    );

    Ok(UpsertOutcome {
        created: existing.is_none(),
        change_seq: merged.change_seq,
        duplicates,
    })
}

/// Returns the master record for `barcode`, if any.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::Decode`] if the
/// row holds an unknown status.
pub async fn get_product(pool: &SqlitePool, barcode: &str) -> Result<Option<MasterProduct>, DbError> {
    let mut conn = pool.acquire().await?;
    fetch_product(&mut conn, barcode).await
}

/// Sets one channel's status and message and clears the dirty flag.
///
/// Unconditional: a later upsert re-sets the flag, so a change made after
/// this write is never lost. Use [`apply_sync_outcome`] to avoid clearing a
/// change made between read and write-back.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no record has this barcode, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn mark_sync_result(
    pool: &SqlitePool,
    barcode: &str,
    channel: Channel,
    status: SyncStatus,
    message: &str,
) -> Result<(), DbError> {
    let key = channel.key();
    let result = sqlx::query(&format!(
        "UPDATE products SET {key}_status = ?, {key}_message = ?, is_dirty = 0 WHERE barcode = ?"
    ))
    .bind(status.as_str())
    .bind(message)
    .bind(barcode)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Writes every channel result for a record in one transaction.
///
/// The dirty flag is cleared only when all results succeeded and the record
/// still carries `revision` as its `change_seq`; otherwise the statuses are
/// written and the record stays dirty. A record at `revision` with a failed
/// result is requeued behind every other dirty record.
///
/// Returns `true` if the dirty flag was cleared.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no record has this barcode, or
/// [`DbError::Sqlx`] if any statement fails.
pub async fn apply_sync_outcome(
    pool: &SqlitePool,
    barcode: &str,
    revision: i64,
    results: &[ChannelSyncResult],
) -> Result<bool, DbError> {
    let mut tx = pool.begin().await?;

    let exists = sqlx::query_scalar::<_, i64>("SELECT change_seq FROM products WHERE barcode = ?")
        .bind(barcode)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(DbError::NotFound);
    }

    for result in results {
        let key = result.channel.key();
        sqlx::query(&format!(
            "UPDATE products SET {key}_status = ?, {key}_message = ? WHERE barcode = ?"
        ))
        .bind(result.status.as_str())
        .bind(&result.message)
        .bind(barcode)
        .execute(&mut *tx)
        .await?;
    }

    let mut cleared = false;
    if results.iter().all(ChannelSyncResult::is_success) {
        let updated = sqlx::query(
            "UPDATE products SET is_dirty = 0 WHERE barcode = ? AND change_seq = ?",
        )
        .bind(barcode)
        .bind(revision)
        .execute(&mut *tx)
        .await?;
        cleared = updated.rows_affected() == 1;
        if !cleared {
            tracing::debug!(barcode, revision, "record changed during sync; staying dirty");
        }
    } else {
        let queue_seq = next_change_seq(&mut tx).await?;
        sqlx::query("UPDATE products SET queue_seq = ? WHERE barcode = ? AND change_seq = ?")
            .bind(queue_seq)
            .bind(barcode)
            .bind(revision)
            .execute(&mut *tx)
            .await?;
        tracing::debug!(barcode, revision, queue_seq, "sync incomplete; record requeued");
    }

    tx.commit().await?;
    Ok(cleared)
}

/// Returns up to `limit` dirty records in queue order: oldest change first,
/// with records requeued after an incomplete sync behind them.
///
/// Does not clear the flag: delivery is at-least-once.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::Decode`] if a
/// row holds an unknown status.
pub async fn fetch_dirty_batch(pool: &SqlitePool, limit: u32) -> Result<Vec<MasterProduct>, DbError> {
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products \
         WHERE is_dirty = 1 \
         ORDER BY queue_seq ASC, barcode ASC \
         LIMIT ?"
    ))
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(MasterProduct::try_from).collect()
}

/// Number of records awaiting sync.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_dirty(pool: &SqlitePool) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products WHERE is_dirty = 1")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Operator price edit. Marks the record dirty and returns its new
/// `change_seq`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no record has this barcode, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn set_price(pool: &SqlitePool, barcode: &str, price: f64) -> Result<i64, DbError> {
    let mut tx = pool.begin().await?;
    let seq = next_change_seq(&mut tx).await?;

    let result = sqlx::query(
        "UPDATE products SET price = ?, is_dirty = 1, change_seq = ?, queue_seq = ?, \
             updated_at = ? \
         WHERE barcode = ?",
    )
    .bind(price)
    .bind(seq)
    .bind(seq)
    .bind(Utc::now())
    .bind(barcode)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    tx.commit().await?;
    Ok(seq)
}

/// Operator markup edit for one channel. Marks the record dirty and returns
/// its new `change_seq`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no record has this barcode, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn set_markup(
    pool: &SqlitePool,
    barcode: &str,
    channel: Channel,
    markup: f64,
) -> Result<i64, DbError> {
    let mut tx = pool.begin().await?;
    let seq = next_change_seq(&mut tx).await?;

    let key = channel.key();
    let result = sqlx::query(&format!(
        "UPDATE products SET {key}_markup = ?, is_dirty = 1, change_seq = ?, queue_seq = ?, \
             updated_at = ? \
         WHERE barcode = ?"
    ))
    .bind(markup)
    .bind(seq)
    .bind(seq)
    .bind(Utc::now())
    .bind(barcode)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    tx.commit().await?;
    Ok(seq)
}

#[cfg(test)]
#[path = "products_test.rs"]
mod tests;
