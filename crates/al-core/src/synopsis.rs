use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MIN_PUBLISHER_DURATION_MS, DEFAULT_MIN_PUBLISHER_VISITS};
use crate::publisher::PublisherRecord;
use crate::score::Scorekeeper;

/// Scoring and eligibility options, persisted with the synopsis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SynopsisOptions {
    pub scorekeeper: Scorekeeper,
    /// Milliseconds of accumulated attention required for eligibility.
    #[serde(rename = "minPublisherDuration")]
    pub min_publisher_duration_ms: u64,
    pub min_publisher_visits: u32,
}

impl Default for SynopsisOptions {
    fn default() -> Self {
        Self {
            scorekeeper: Scorekeeper::default(),
            min_publisher_duration_ms: DEFAULT_MIN_PUBLISHER_DURATION_MS,
            min_publisher_visits: DEFAULT_MIN_PUBLISHER_VISITS,
        }
    }
}

/// The authoritative table of publisher attention records.
///
/// Keys iterate in lexicographic order, which gives every enumeration a
/// deterministic tie-break for free.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Synopsis {
    publishers: BTreeMap<String, PublisherRecord>,
    options: SynopsisOptions,
}

impl Synopsis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: SynopsisOptions) -> Self {
        Self {
            publishers: BTreeMap::new(),
            options,
        }
    }

    /// Rebuild from previously persisted parts. Record keys are forced to
    /// agree with their map key.
    pub fn from_parts(
        publishers: BTreeMap<String, PublisherRecord>,
        options: SynopsisOptions,
    ) -> Self {
        let publishers = publishers
            .into_iter()
            .map(|(key, mut rec)| {
                rec.key = key.clone();
                (key, rec)
            })
            .collect();
        Self {
            publishers,
            options,
        }
    }

    pub fn options(&self) -> &SynopsisOptions {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&PublisherRecord> {
        self.publishers.get(key)
    }

    pub fn publishers(&self) -> impl Iterator<Item = &PublisherRecord> {
        self.publishers.values()
    }

    pub(crate) fn publishers_mut(&mut self) -> impl Iterator<Item = &mut PublisherRecord> {
        self.publishers.values_mut()
    }

    pub(crate) fn record_mut(&mut self, key: &str) -> Option<&mut PublisherRecord> {
        self.publishers.get_mut(key)
    }

    /// Explicitly add a publisher (e.g. from a user action) without a visit.
    pub fn add_publisher(&mut self, key: &str) -> &PublisherRecord {
        self.publishers
            .entry(key.to_string())
            .or_insert_with(|| PublisherRecord::new(key))
    }

    /// Fold one visit into the record: duration always accumulates, the
    /// visit counter only moves for a first visit, and the score is
    /// recomputed from both counters.
    pub fn upsert(&mut self, key: &str, delta_duration_ms: u64, revisited: bool) {
        let scorekeeper = self.options.scorekeeper;
        let rec = self
            .publishers
            .entry(key.to_string())
            .or_insert_with(|| PublisherRecord::new(key));
        rec.duration_ms += delta_duration_ms;
        if !revisited {
            rec.visits += 1;
        }
        rec.score = scorekeeper.score(rec.duration_ms, rec.visits);
    }

    /// Assign a fixed share. Values above 100 clamp; zero clears the pin.
    /// Does not renormalize — the caller decides when to run the normalizer.
    pub fn set_pin(&mut self, key: &str, percentage: u8) {
        let rec = self
            .publishers
            .entry(key.to_string())
            .or_insert_with(|| PublisherRecord::new(key));
        rec.pin_percentage = match percentage {
            0 => None,
            p => Some(p.min(100)),
        };
    }

    pub fn clear_pin(&mut self, key: &str) {
        if let Some(rec) = self.publishers.get_mut(key) {
            rec.pin_percentage = None;
        }
    }

    pub fn set_excluded(&mut self, key: &str, excluded: bool) {
        let rec = self
            .publishers
            .entry(key.to_string())
            .or_insert_with(|| PublisherRecord::new(key));
        rec.excluded = excluded;
    }

    pub fn set_verified(&mut self, key: &str, verified: bool) {
        if let Some(rec) = self.publishers.get_mut(key) {
            rec.verified = verified;
        }
    }

    /// Sum of all pinned shares. May transiently exceed 100; the
    /// normalizer is responsible for resolving that.
    pub fn pinned_total(&self) -> u32 {
        self.publishers
            .values()
            .filter(|r| !r.excluded)
            .filter_map(|r| r.pin_percentage)
            .map(u32::from)
            .sum()
    }

    /// Whether a record clears the visit/duration eligibility gates.
    pub fn is_eligible(&self, rec: &PublisherRecord) -> bool {
        rec.visits >= self.options.min_publisher_visits
            && rec.duration_ms >= self.options.min_publisher_duration_ms
    }

    /// Eligible, non-excluded records ordered by score descending, key
    /// ascending. `extra_excluded` extends the per-record exclusion flag
    /// (rule-driven exclusions live outside the table).
    pub fn enumerate_eligible(&self, extra_excluded: &HashSet<String>) -> Vec<&PublisherRecord> {
        let mut eligible: Vec<&PublisherRecord> = self
            .publishers
            .values()
            .filter(|r| !r.excluded && !extra_excluded.contains(&r.key))
            .filter(|r| self.is_eligible(r))
            .collect();
        eligible.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.key.cmp(&b.key))
        });
        eligible
    }

    /// Drop records absent from a freshly fetched remote publisher
    /// snapshot. Bounds growth from visited-but-never-monetizable domains.
    /// Returns the number of records removed.
    pub fn prune(&mut self, remote_known: &HashSet<String>) -> usize {
        let before = self.publishers.len();
        self.publishers.retain(|key, _| remote_known.contains(key));
        before - self.publishers.len()
    }

    /// Browsing-data clear: drop every record.
    pub fn reset(&mut self) {
        self.publishers.clear();
    }

    /// Switch scorekeepers and re-score every record under the new one.
    pub fn set_scorekeeper(&mut self, scorekeeper: Scorekeeper) {
        self.options.scorekeeper = scorekeeper;
        for rec in self.publishers.values_mut() {
            rec.score = scorekeeper.score(rec.duration_ms, rec.visits);
        }
    }

    /// Zero is not a usable gate; invalid values keep the previous setting.
    pub fn set_min_publisher_duration_ms(&mut self, ms: u64) {
        if ms > 0 {
            self.options.min_publisher_duration_ms = ms;
        }
    }

    /// Zero is not a usable gate; invalid values keep the previous setting.
    pub fn set_min_publisher_visits(&mut self, visits: u32) {
        if visits > 0 {
            self.options.min_publisher_visits = visits;
        }
    }
}
