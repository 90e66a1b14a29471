//! In-process stand-in for the remote client, used by dry runs and tests.

use std::sync::{Arc, Mutex};

use uuid::Uuid;

use al_core::round_to_target;

use crate::client::{BallotWeight, ClientError, RemoteLedgerClient, SyncReport, WalletState};

/// Call log shared between the stub and the test that owns it.
#[derive(Debug, Default)]
pub struct StubLog {
    pub syncs: usize,
    pub reconciles: Vec<Uuid>,
    pub votes: Vec<String>,
}

/// Scripted [`RemoteLedgerClient`]: sync responses are replayed in order
/// (the last entry repeats), the winner draw allocates ballots by largest
/// remainder over the supplied weights, and every call is logged.
pub struct StubClient {
    /// Sync responses in replay order; `Err` strings become transport
    /// errors. Empty means "always the default report".
    script: Vec<Result<SyncReport, String>>,
    cursor: usize,
    ballots: u32,
    /// `None` makes `time_until_reconcile` fail, exercising the fallback
    /// jitter path.
    time_until_reconcile_ms: Option<u64>,
    wallet: WalletState,
    log: Arc<Mutex<StubLog>>,
}

impl StubClient {
    pub fn new() -> Self {
        Self {
            script: Vec::new(),
            cursor: 0,
            ballots: 0,
            time_until_reconcile_ms: Some(0),
            wallet: WalletState::default(),
            log: Arc::new(Mutex::new(StubLog::default())),
        }
    }

    /// A client that opens one reconcile window immediately, then reports
    /// nothing further to do. Suitable for `al run` dry runs.
    pub fn dry_run(ballots: u32, next_reconcile_stamp_ms: u64) -> Self {
        Self::new()
            .with_script(vec![
                Ok(SyncReport {
                    pending: false,
                    delay_time_ms: Some(0),
                }),
                Ok(SyncReport {
                    pending: false,
                    delay_time_ms: None,
                }),
            ])
            .with_ballots(ballots)
            .with_wallet(WalletState {
                reconcile_stamp_ms: Some(next_reconcile_stamp_ms),
                balance: Some(0.0),
            })
            .with_time_until_reconcile(Some(86_400_000))
    }

    pub fn with_script(mut self, script: Vec<Result<SyncReport, String>>) -> Self {
        self.script = script;
        self
    }

    pub fn with_ballots(mut self, ballots: u32) -> Self {
        self.ballots = ballots;
        self
    }

    pub fn with_wallet(mut self, wallet: WalletState) -> Self {
        self.wallet = wallet;
        self
    }

    pub fn with_time_until_reconcile(mut self, ms: Option<u64>) -> Self {
        self.time_until_reconcile_ms = ms;
        self
    }

    /// Handle onto the call log; clones stay valid after the client moves
    /// into a scheduler.
    pub fn log(&self) -> Arc<Mutex<StubLog>> {
        Arc::clone(&self.log)
    }
}

impl Default for StubClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteLedgerClient for StubClient {
    async fn sync(&mut self) -> Result<SyncReport, ClientError> {
        if let Ok(mut log) = self.log.lock() {
            log.syncs += 1;
        }
        let Some(entry) = self
            .script
            .get(self.cursor.min(self.script.len().saturating_sub(1)))
        else {
            return Ok(SyncReport::default());
        };
        self.cursor += 1;
        entry
            .clone()
            .map_err(ClientError::Transport)
    }

    fn ballots(&self) -> u32 {
        self.ballots
    }

    async fn winners(
        &mut self,
        ballot_count: u32,
        weights: &[BallotWeight],
    ) -> Result<Vec<String>, ClientError> {
        let total: f64 = weights.iter().map(|w| w.weight).sum();
        if total <= 0.0 || ballot_count == 0 {
            return Ok(Vec::new());
        }
        let targets: Vec<f64> = weights
            .iter()
            .map(|w| w.weight / total * f64::from(ballot_count))
            .collect();
        let counts = round_to_target(&targets, i64::from(ballot_count));
        Ok(weights
            .iter()
            .zip(counts)
            .flat_map(|(w, count)| {
                std::iter::repeat_n(w.publisher_key.clone(), count.max(0) as usize)
            })
            .collect())
    }

    async fn vote(
        &mut self,
        publisher_key: &str,
        _viewing_id: Uuid,
    ) -> Result<Option<WalletState>, ClientError> {
        if let Ok(mut log) = self.log.lock() {
            log.votes.push(publisher_key.to_string());
        }
        self.ballots = self.ballots.saturating_sub(1);
        Ok(Some(self.wallet.clone()))
    }

    async fn time_until_reconcile(&mut self) -> Result<u64, ClientError> {
        self.time_until_reconcile_ms
            .ok_or_else(|| ClientError::Protocol("no reconcile scheduled".to_string()))
    }

    async fn reconcile(&mut self, viewing_id: Uuid) -> Result<(), ClientError> {
        if let Ok(mut log) = self.log.lock() {
            log.reconciles.push(viewing_id);
        }
        Ok(())
    }
}
