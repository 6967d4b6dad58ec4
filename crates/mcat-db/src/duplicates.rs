//! Cross-channel identity conflicts.
//!
//! A conflict is recorded when a merge replaces a non-empty channel id with a
//! different non-empty one. Detection never blocks the write: the incoming id
//! always wins, and the event is kept for operators to review.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use mcat_core::{AuditSink, Channel, MasterProduct};
use sqlx::{SqliteConnection, SqlitePool};

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateEvent {
    pub barcode: String,
    pub channel: Channel,
    pub old_external_id: String,
    pub new_external_id: String,
    pub old_price: f64,
    pub new_price: f64,
    pub old_stock: i64,
    pub new_stock: i64,
    pub detected_at: DateTime<Utc>,
}

impl DuplicateEvent {
    /// The line written to the audit log for this event.
    #[must_use]
    pub fn audit_line(&self) -> String {
        format!(
            "[DUPLICATE] {} barcode={} id {} -> {} | price {} -> {} | stock {} -> {}",
            self.channel.label(),
            self.barcode,
            self.old_external_id,
            self.new_external_id,
            self.old_price,
            self.new_price,
            self.old_stock,
            self.new_stock,
        )
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DuplicateEventRow {
    barcode: String,
    channel: String,
    old_external_id: String,
    new_external_id: String,
    old_price: f64,
    new_price: f64,
    old_stock: i64,
    new_stock: i64,
    detected_at: DateTime<Utc>,
}

impl TryFrom<DuplicateEventRow> for DuplicateEvent {
    type Error = DbError;

    fn try_from(row: DuplicateEventRow) -> Result<Self, Self::Error> {
        let channel = row
            .channel
            .parse::<Channel>()
            .map_err(|e| DbError::Decode(e.to_string()))?;
        Ok(Self {
            barcode: row.barcode,
            channel,
            old_external_id: row.old_external_id,
            new_external_id: row.new_external_id,
            old_price: row.old_price,
            new_price: row.new_price,
            old_stock: row.old_stock,
            new_stock: row.new_stock,
            detected_at: row.detected_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

type WarningLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Compares incoming channel ids against stored ones and reports conflicts.
///
/// Every event is persisted and appended to the audit sink. Only the
/// operator-facing `warn!` is rate limited.
#[derive(Clone)]
pub struct DuplicateDetector {
    audit: Arc<dyn AuditSink>,
    warnings: Arc<WarningLimiter>,
}

impl fmt::Debug for DuplicateDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuplicateDetector").finish_non_exhaustive()
    }
}

impl DuplicateDetector {
    #[must_use]
    pub fn new(audit: Arc<dyn AuditSink>, warnings_per_minute: NonZeroU32) -> Self {
        Self {
            audit,
            warnings: Arc::new(RateLimiter::direct(Quota::per_minute(warnings_per_minute))),
        }
    }

    /// Returns the conflict, if any, between the stored id for `channel` and
    /// `incoming_id`. Before/after snapshots come from `stored` and the
    /// post-merge `new_price` / `new_stock`.
    #[must_use]
    pub fn check(
        &self,
        stored: Option<&MasterProduct>,
        channel: Channel,
        incoming_id: &str,
        new_price: f64,
        new_stock: i64,
    ) -> Option<DuplicateEvent> {
        let stored = stored?;
        let old_id = stored.channels.get(channel).linked_id()?;
        let incoming_id = incoming_id.trim();
        if incoming_id.is_empty() || incoming_id == old_id {
            return None;
        }
        Some(DuplicateEvent {
            barcode: stored.barcode.clone(),
            channel,
            old_external_id: old_id.to_string(),
            new_external_id: incoming_id.to_string(),
            old_price: stored.price,
            new_price,
            old_stock: stored.stock,
            new_stock,
            detected_at: Utc::now(),
        })
    }

    /// Writes `event` to the audit sink and warns the operator, subject to
    /// the warning rate limit.
    pub fn report(&self, event: &DuplicateEvent) {
        mcat_core::record_audit(self.audit.as_ref(), &event.audit_line());

        if self.warnings.check().is_ok() {
            tracing::warn!(
                barcode = %event.barcode,
                channel = %event.channel,
                old_id = %event.old_external_id,
                new_id = %event.new_external_id,
                "channel id replaced for existing barcode"
            );
        } else {
            tracing::debug!(
                barcode = %event.barcode,
                channel = %event.channel,
                "duplicate warning suppressed by rate limit"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// duplicate_events operations
// ---------------------------------------------------------------------------

/// Appends `event` to `duplicate_events` on an open connection, normally the
/// transaction of the merge that produced it.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub(crate) async fn insert_duplicate_event(
    conn: &mut SqliteConnection,
    event: &DuplicateEvent,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO duplicate_events \
             (barcode, channel, old_external_id, new_external_id, \
              old_price, new_price, old_stock, new_stock, detected_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&event.barcode)
    .bind(event.channel.key())
    .bind(&event.old_external_id)
    .bind(&event.new_external_id)
    .bind(event.old_price)
    .bind(event.new_price)
    .bind(event.old_stock)
    .bind(event.new_stock)
    .bind(event.detected_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Lists the most recent duplicate events, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::Decode`] if a
/// stored channel key is unknown.
pub async fn list_duplicate_events(
    pool: &SqlitePool,
    limit: u32,
) -> Result<Vec<DuplicateEvent>, DbError> {
    let rows = sqlx::query_as::<_, DuplicateEventRow>(
        "SELECT barcode, channel, old_external_id, new_external_id, \
                old_price, new_price, old_stock, new_stock, detected_at \
         FROM duplicate_events \
         ORDER BY id DESC \
         LIMIT ?",
    )
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(DuplicateEvent::try_from).collect()
}
