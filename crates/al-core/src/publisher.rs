use serde::{Deserialize, Serialize};

/// A single publisher's accumulated attention record.
///
/// Serialized field names follow the persisted ledger state shape
/// (camelCase, `duration` in milliseconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherRecord {
    /// Registrable domain, or a channel-qualified key for embedded media.
    pub key: String,
    /// Total accumulated attention time in milliseconds. Monotonic.
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    /// Visit count. Monotonic; revisits do not increment it.
    pub visits: u32,
    /// Scorekeeper-derived weight, recomputed on every upsert.
    pub score: f64,
    /// User-assigned fixed share in [0, 100]. `None` means unpinned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin_percentage: Option<u8>,
    /// Share assigned by the last normalization pass.
    #[serde(default)]
    pub percentage: u32,
    /// Pre-rounding share from the last normalization pass. Transient.
    #[serde(skip)]
    pub weight: f64,
    /// Excluded publishers never receive a share.
    #[serde(default)]
    pub excluded: bool,
    /// Eligibility signal supplied by the remote ledger. Does not gate
    /// scoring.
    #[serde(default)]
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher_url: Option<String>,
}

impl PublisherRecord {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            duration_ms: 0,
            visits: 0,
            score: 0.0,
            pin_percentage: None,
            percentage: 0,
            weight: 0.0,
            excluded: false,
            verified: false,
            favicon_url: None,
            protocol: None,
            publisher_url: None,
        }
    }

    /// Pinned means a non-zero user-assigned share.
    pub fn pinned(&self) -> bool {
        self.pin_percentage.unwrap_or(0) > 0
    }
}
