use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Channel, CoreError, SyncStatus};

/// Sync message written for a barcode that had no channel association yet.
pub const NEW_RECORD_MESSAGE: &str = "new record";

/// Synchronization state of one channel on a master record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelState {
    /// Channel-side identifier. `None` and `Some("")` both mean "not listed".
    pub external_id: Option<String>,
    pub status: SyncStatus,
    pub message: Option<String>,
    /// Price multiplier applied when pushing to this channel.
    pub markup: f64,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            external_id: None,
            status: SyncStatus::Pending,
            message: None,
            markup: 1.0,
        }
    }
}

impl ChannelState {
    /// The external id, if it is present and non-empty.
    #[must_use]
    pub fn linked_id(&self) -> Option<&str> {
        self.external_id.as_deref().filter(|id| !id.is_empty())
    }

    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.linked_id().is_some()
    }
}

/// The three per-channel states carried by every master record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelStates {
    pub hepsiburada: ChannelState,
    pub pazarama: ChannelState,
    pub ptt: ChannelState,
}

impl ChannelStates {
    #[must_use]
    pub fn get(&self, channel: Channel) -> &ChannelState {
        match channel {
            Channel::Hepsiburada => &self.hepsiburada,
            Channel::Pazarama => &self.pazarama,
            Channel::Ptt => &self.ptt,
        }
    }

    pub fn get_mut(&mut self, channel: Channel) -> &mut ChannelState {
        match channel {
            Channel::Hepsiburada => &mut self.hepsiburada,
            Channel::Pazarama => &mut self.pazarama,
            Channel::Ptt => &mut self.ptt,
        }
    }

    /// Channels with a non-empty external id, in [`Channel::ALL`] order.
    #[must_use]
    pub fn linked_channels(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|c| self.get(*c).is_linked())
            .collect()
    }
}

/// The canonical stored product, keyed by barcode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterProduct {
    pub barcode: String,
    pub name: String,
    pub brand: String,
    pub category_name: String,
    pub description: String,
    pub price: f64,
    pub vat_rate: i32,
    pub stock: i64,
    /// Dispatch lead time in days.
    pub delivery_time: i32,
    pub images: Vec<String>,
    pub channels: ChannelStates,
    /// `true` while the record holds changes not yet pushed to its channels.
    pub dirty: bool,
    /// Store-wide sequence value of the last change-producing write.
    ///
    /// Sync write-backs quote it to prove the record is unchanged since it
    /// was read.
    pub change_seq: i64,
    pub updated_at: DateTime<Utc>,
}

/// An association between a candidate and one channel listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelLink {
    pub channel: Channel,
    #[serde(default)]
    pub external_id: String,
    #[serde(default)]
    pub status: Option<SyncStatus>,
    /// Initial markup; honoured only when the candidate creates the record.
    #[serde(default)]
    pub markup: Option<f64>,
}

/// Incoming product data from a channel poll or a bulk import.
///
/// Empty strings and `0` prices mean "no information"; see the merge rules
/// in `mcat_db::products::upsert_product`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductCandidate {
    pub barcode: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub category_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub vat_rate: Option<i32>,
    #[serde(default)]
    pub delivery_time: Option<i32>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub links: Vec<ChannelLink>,
}

impl ProductCandidate {
    #[must_use]
    pub fn new(barcode: impl Into<String>) -> Self {
        Self {
            barcode: barcode.into(),
            ..Self::default()
        }
    }

    /// Adds (or replaces) the link for `channel`.
    #[must_use]
    pub fn with_link(mut self, channel: Channel, external_id: impl Into<String>) -> Self {
        self.links.retain(|l| l.channel != channel);
        self.links.push(ChannelLink {
            channel,
            external_id: external_id.into(),
            status: None,
            markup: None,
        });
        self
    }

    /// The candidate's link for `channel`. When several are present the
    /// last one wins.
    #[must_use]
    pub fn link(&self, channel: Channel) -> Option<&ChannelLink> {
        self.links.iter().rev().find(|l| l.channel == channel)
    }

    /// The candidate's non-empty external id for `channel`.
    #[must_use]
    pub fn external_id(&self, channel: Channel) -> Option<&str> {
        self.link(channel)
            .map(|l| l.external_id.trim())
            .filter(|id| !id.is_empty())
    }

    /// Trims the barcode and rejects candidates that have none.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EmptyBarcode`] when the barcode is blank.
    pub fn validate(&mut self) -> Result<(), CoreError> {
        let trimmed = self.barcode.trim();
        if trimmed.is_empty() {
            return Err(CoreError::EmptyBarcode);
        }
        if trimmed.len() != self.barcode.len() {
            self.barcode = trimmed.to_string();
        }
        Ok(())
    }
}

/// Builds the operator-facing summary of which channels a barcode is
/// linked to, e.g. `"linked: HB + Pazarama"`.
#[must_use]
pub fn link_summary(linked: &[Channel]) -> String {
    if linked.is_empty() {
        return NEW_RECORD_MESSAGE.to_string();
    }
    let labels: Vec<&str> = linked.iter().map(|c| c.label()).collect();
    format!("linked: {}", labels.join(" + "))
}
