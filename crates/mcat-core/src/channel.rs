use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// A marketplace the master catalog is synchronized with.
///
/// Each channel has its own identifier namespace and category taxonomy, so
/// it doubles as the `platform` key of the category tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Hepsiburada,
    Pazarama,
    Ptt,
}

impl Channel {
    /// Every channel, in the order sync messages list them.
    pub const ALL: [Channel; 3] = [Channel::Hepsiburada, Channel::Pazarama, Channel::Ptt];

    /// Stable storage key, also used as the column prefix in `products`.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Channel::Hepsiburada => "hb",
            Channel::Pazarama => "pazarama",
            Channel::Ptt => "ptt",
        }
    }

    /// Short operator-facing label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Channel::Hepsiburada => "HB",
            Channel::Pazarama => "Pazarama",
            Channel::Ptt => "PTT",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Channel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hb" | "hepsiburada" => Ok(Channel::Hepsiburada),
            "pazarama" | "pzr" => Ok(Channel::Pazarama),
            "ptt" | "pttavm" => Ok(Channel::Ptt),
            _ => Err(CoreError::UnknownChannel(s.to_string())),
        }
    }
}

/// Per-channel synchronization state of a master record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncStatus {
    #[default]
    Pending,
    Matched,
    Synced,
    Error,
}

impl SyncStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Pending => "PENDING",
            SyncStatus::Matched => "MATCHED",
            SyncStatus::Synced => "SYNCED",
            SyncStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(SyncStatus::Pending),
            "MATCHED" => Ok(SyncStatus::Matched),
            "SYNCED" => Ok(SyncStatus::Synced),
            "ERROR" => Ok(SyncStatus::Error),
            other => Err(CoreError::UnknownSyncStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_parses_keys_and_aliases() {
        assert_eq!("hb".parse::<Channel>().unwrap(), Channel::Hepsiburada);
        assert_eq!("Hepsiburada".parse::<Channel>().unwrap(), Channel::Hepsiburada);
        assert_eq!(" PZR ".parse::<Channel>().unwrap(), Channel::Pazarama);
        assert_eq!("pttavm".parse::<Channel>().unwrap(), Channel::Ptt);
    }

    #[test]
    fn channel_rejects_unknown_name() {
        let err = "trendyol".parse::<Channel>().unwrap_err();
        assert!(matches!(err, CoreError::UnknownChannel(ref s) if s == "trendyol"));
    }

    #[test]
    fn channel_key_roundtrips_through_from_str() {
        for channel in Channel::ALL {
            assert_eq!(channel.key().parse::<Channel>().unwrap(), channel);
        }
    }

    #[test]
    fn sync_status_storage_form_roundtrips() {
        for status in [
            SyncStatus::Pending,
            SyncStatus::Matched,
            SyncStatus::Synced,
            SyncStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
        }
    }

    #[test]
    fn sync_status_is_case_sensitive() {
        assert!("synced".parse::<SyncStatus>().is_err());
    }
}
