//! Optional TOML configuration for engine options.
//!
//! Lives at `config.toml` in the data directory. Every field is optional;
//! invalid values (a zero gate, an unknown scorekeeper) are dropped
//! field-by-field and the previous or default setting stays in force. A
//! file that fails to parse at all is logged and ignored entirely.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use al_core::Scorekeeper;
use al_core::synopsis::Synopsis;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub scorekeeper: Option<Scorekeeper>,
    pub min_publisher_duration_ms: Option<u64>,
    pub min_publisher_visits: Option<u32>,
    pub reconcile_frequency_days: Option<u32>,
    /// Regex patterns excluding matching publisher keys from allocation.
    pub exclusion_rules: Option<Vec<String>>,
}

impl LedgerConfig {
    /// Load `config.toml` from `dir`. Missing or malformed files yield the
    /// all-defaults config.
    pub fn load(dir: &Path) -> Self {
        let path = dir.join("config.toml");
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };
        match toml::from_str(&raw) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("ignoring malformed {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Fold configured options into a synopsis. The synopsis setters
    /// already ignore zero-valued gates, so invalid values fall away here.
    pub fn apply_to(&self, synopsis: &mut Synopsis) {
        if let Some(scorekeeper) = self.scorekeeper {
            synopsis.set_scorekeeper(scorekeeper);
        }
        if let Some(ms) = self.min_publisher_duration_ms {
            synopsis.set_min_publisher_duration_ms(ms);
        }
        if let Some(visits) = self.min_publisher_visits {
            synopsis.set_min_publisher_visits(visits);
        }
    }

    /// Configured reconcile frequency, if it is usable.
    pub fn frequency_days(&self) -> Option<u32> {
        self.reconcile_frequency_days.filter(|days| *days > 0)
    }
}
