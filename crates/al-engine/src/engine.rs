//! The ledger engine context: one owned struct per process holding the
//! synopsis, visit tracking, exclusion rules and reconciliation state.
//! Constructed at wallet-enable time, torn down at shutdown. Nothing in
//! here is a global.

use serde::{Deserialize, Serialize};

use al_core::constants::DEFAULT_RECONCILE_FREQUENCY_DAYS;
use al_core::time::DAY_MS;
use al_core::{
    Allocation, ExclusionRules, Synopsis, VisitOutcome, VisitTracker, normalize,
};

use crate::client::{BallotWeight, WalletState};

/// Tri-state of the most recent sync round; informs backoff decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncOutcome {
    #[default]
    Pending,
    Succeeded,
    Failed,
}

/// Reconciliation bookkeeping. Created at ledger initialization and never
/// destroyed, only rescheduled.
#[derive(Debug, Clone)]
pub struct ReconciliationState {
    /// Absolute Unix-ms stamp of the next scheduled reconciliation.
    pub reconcile_stamp_ms: u64,
    /// Days between reconciliations.
    pub reconcile_frequency_days: u32,
    pub last_sync: SyncOutcome,
}

impl ReconciliationState {
    pub fn new(now_ms: u64, frequency_days: u32) -> Self {
        Self {
            reconcile_stamp_ms: now_ms + u64::from(frequency_days) * DAY_MS,
            reconcile_frequency_days: frequency_days,
            last_sync: SyncOutcome::Pending,
        }
    }

    /// Move the stamp one frequency interval past `now`.
    pub fn reschedule(&mut self, now_ms: u64) {
        self.reconcile_stamp_ms = now_ms + u64::from(self.reconcile_frequency_days) * DAY_MS;
    }
}

/// Persisted ledger state: the synopsis plus reconciliation stamps, in the
/// documented JSON shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    #[serde(flatten)]
    pub synopsis: Synopsis,
    #[serde(rename = "reconcileStamp")]
    pub reconcile_stamp_ms: u64,
    #[serde(rename = "reconcileFrequency")]
    pub reconcile_frequency_days: u32,
}

/// Owned context for the whole attention ledger.
pub struct LedgerEngine {
    pub synopsis: Synopsis,
    pub tracker: VisitTracker,
    pub rules: ExclusionRules,
    pub state: ReconciliationState,
}

impl LedgerEngine {
    pub fn new(now_ms: u64) -> Self {
        Self {
            synopsis: Synopsis::new(),
            tracker: VisitTracker::new(),
            rules: ExclusionRules::default(),
            state: ReconciliationState::new(now_ms, DEFAULT_RECONCILE_FREQUENCY_DAYS),
        }
    }

    /// Rebuild from a persisted snapshot. Visit-session state is
    /// deliberately not persisted, so the tracker starts fresh.
    pub fn restore(snapshot: LedgerSnapshot) -> Self {
        Self {
            synopsis: snapshot.synopsis,
            tracker: VisitTracker::new(),
            rules: ExclusionRules::default(),
            state: ReconciliationState {
                reconcile_stamp_ms: snapshot.reconcile_stamp_ms,
                reconcile_frequency_days: snapshot.reconcile_frequency_days,
                last_sync: SyncOutcome::Pending,
            },
        }
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            synopsis: self.synopsis.clone(),
            reconcile_stamp_ms: self.state.reconcile_stamp_ms,
            reconcile_frequency_days: self.state.reconcile_frequency_days,
        }
    }

    pub fn set_exclusion_rules(&mut self, rules: ExclusionRules) {
        self.rules = rules;
    }

    /// Feed one navigation event through the tracker and renormalize when
    /// it attributed anything.
    pub fn record_visit(
        &mut self,
        current_url: &str,
        previous_url: &str,
        timestamp_ms: u64,
        tab_id: u32,
    ) -> VisitOutcome {
        let outcome = self.tracker.record_visit(
            &mut self.synopsis,
            current_url,
            previous_url,
            timestamp_ms,
            tab_id,
        );
        if matches!(outcome, VisitOutcome::Attributed { .. }) {
            self.renormalize(None);
        }
        outcome
    }

    pub fn set_pin(&mut self, key: &str, percentage: u8) -> Allocation {
        self.synopsis.set_pin(key, percentage);
        self.renormalize(Some(key))
    }

    pub fn clear_pin(&mut self, key: &str) -> Allocation {
        self.synopsis.clear_pin(key);
        self.renormalize(None)
    }

    pub fn set_excluded(&mut self, key: &str, excluded: bool) -> Allocation {
        self.synopsis.set_excluded(key, excluded);
        self.renormalize(None)
    }

    /// Re-run the allocation with rule-driven exclusions folded in.
    pub fn renormalize(&mut self, changed_publisher: Option<&str>) -> Allocation {
        let extra = self
            .rules
            .excluded_set(self.synopsis.publishers().map(|r| r.key.as_str()));
        normalize(&mut self.synopsis, &extra, changed_publisher)
    }

    /// Whether a ballot may be cast for this publisher right now. Checked
    /// again for every winner immediately before voting, since exclusion
    /// and visibility may have changed since normalization.
    pub fn is_votable(&self, key: &str) -> bool {
        let Some(rec) = self.synopsis.get(key) else {
            return false;
        };
        if rec.excluded || self.rules.matches(key) {
            return false;
        }
        rec.pinned() || self.synopsis.is_eligible(rec)
    }

    /// Ballot weights for the current window: every votable publisher with
    /// a non-zero share at `pin_or_percentage / 100`.
    pub fn ballot_weights(&self) -> Vec<BallotWeight> {
        self.synopsis
            .publishers()
            .filter(|rec| self.is_votable(&rec.key))
            .filter_map(|rec| {
                let pct = rec
                    .pin_percentage
                    .map(u32::from)
                    .unwrap_or(rec.percentage);
                (pct > 0).then(|| BallotWeight {
                    publisher_key: rec.key.clone(),
                    weight: f64::from(pct) / 100.0,
                })
            })
            .collect()
    }

    /// Fold a wallet snapshot from a vote back into reconciliation state.
    pub fn apply_wallet_state(&mut self, wallet: &WalletState) {
        if let Some(stamp) = wallet.reconcile_stamp_ms {
            self.state.reconcile_stamp_ms = stamp;
        }
    }
}
