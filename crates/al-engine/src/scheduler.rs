//! Timer-driven reconciliation: a single-task state machine that syncs
//! with the remote client, casts ballots during reconcile windows,
//! persists the result, and reschedules itself with jitter so a fleet of
//! installs never wakes in lockstep.
//!
//! Timer fires, reconnect pokes and shutdown all arrive through the same
//! queue and are handled on one task, so synopsis reads during a window
//! never interleave with a half-applied mutation.

use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use al_core::constants::{
    CAP_JITTER_MAX_MS, CAP_JITTER_MIN_MS, DELAY_CAP_MS, RECONNECT_BALANCE_DELAY_MS,
    RETRY_JITTER_MAX_MS, RETRY_JITTER_MIN_MS,
};
use al_core::now_unix_ms;

use crate::client::{RemoteLedgerClient, WalletState};
use crate::engine::{LedgerEngine, SyncOutcome};
use crate::persist::PersistenceGateway;

/// Scheduler states, in the order a normal cycle moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    SyncPending,
    ReconcileWindow,
    Voting,
    Rescheduled,
}

/// Wake-up reasons delivered to the scheduler task.
#[derive(Debug)]
enum Wake {
    /// The one-shot reconcile timer fired. Stale epochs are discarded.
    Timer { epoch: u64 },
    /// Network connectivity returned.
    Reconnect,
    /// The short post-reconnect balance refresh fired.
    Balance { epoch: u64 },
}

/// Cloneable handle for poking a running scheduler from outside.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Wake>,
    shutdown: CancellationToken,
}

impl SchedulerHandle {
    /// Cancel any pending retry and force an immediate sync attempt.
    pub fn notify_reconnect(&self) {
        let _ = self.tx.send(Wake::Reconnect);
    }

    /// Stop the scheduler and cancel all pending timers. Idempotent:
    /// repeated calls (or calls after the loop already exited) do nothing.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

pub struct ReconciliationScheduler<C, P> {
    engine: LedgerEngine,
    client: C,
    gateway: P,
    state: SchedulerState,
    /// Identity of the currently armed reconcile timer. Bumped on every
    /// schedule and on client replacement, so a fired timer that outlived
    /// its scheduling context is ignored instead of double-driving a
    /// replaced client.
    epoch: u64,
    balance_epoch: u64,
    tx: mpsc::UnboundedSender<Wake>,
    rx: mpsc::UnboundedReceiver<Wake>,
    shutdown: CancellationToken,
}

impl<C: RemoteLedgerClient, P: PersistenceGateway> ReconciliationScheduler<C, P> {
    pub fn new(engine: LedgerEngine, client: C, gateway: P) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            engine,
            client,
            gateway,
            state: SchedulerState::Idle,
            epoch: 0,
            balance_epoch: 0,
            tx,
            rx,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            tx: self.tx.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn engine(&self) -> &LedgerEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut LedgerEngine {
        &mut self.engine
    }

    /// Swap in a new remote client (wallet recovery). Timers armed for the
    /// old client become stale immediately.
    pub fn replace_client(&mut self, client: C) {
        self.client = client;
        self.epoch += 1;
        tracing::info!(epoch = self.epoch, "remote client replaced");
    }

    /// Drive the scheduler until shutdown. The first wake comes from the
    /// persisted reconcile stamp, or immediately when it is already due.
    pub async fn run(mut self) {
        let initial = self
            .engine
            .state
            .reconcile_stamp_ms
            .saturating_sub(now_unix_ms());
        self.schedule(initial);

        let shutdown = self.shutdown.clone();
        loop {
            let wake = tokio::select! {
                _ = shutdown.cancelled() => None,
                wake = self.rx.recv() => wake,
            };
            let Some(wake) = wake else {
                self.state = SchedulerState::Idle;
                tracing::info!("scheduler shut down");
                return;
            };
            self.on_wake(wake).await;
        }
    }

    async fn on_wake(&mut self, wake: Wake) {
        match wake {
            Wake::Timer { epoch } if epoch != self.epoch => {
                tracing::debug!(epoch, current = self.epoch, "discarding stale timer");
            }
            Wake::Timer { .. } => {
                self.state = SchedulerState::Idle;
                self.run_cycle().await;
            }
            Wake::Reconnect => {
                // Invalidate any pending retry, sync right away, and queue
                // the short balance refresh on its own guard.
                self.epoch += 1;
                tracing::info!("network reconnected; forcing sync");
                self.run_cycle().await;
                self.schedule_balance(RECONNECT_BALANCE_DELAY_MS);
            }
            Wake::Balance { epoch } if epoch != self.balance_epoch => {}
            Wake::Balance { .. } => {
                // The refresh rides on a plain sync; its outcome is advisory.
                if let Err(e) = self.client.sync().await {
                    tracing::warn!("balance refresh sync failed: {e}");
                }
            }
        }
    }

    /// One full pass: sync, vote if a window is open, compute and arm the
    /// next delay. Client errors are never fatal; every exit path either
    /// arms a timer or deliberately parks in `Idle`.
    async fn run_cycle(&mut self) {
        self.state = SchedulerState::SyncPending;
        let report = match self.client.sync().await {
            Ok(report) => {
                self.engine.state.last_sync = SyncOutcome::Succeeded;
                report
            }
            Err(e) => {
                tracing::warn!("sync failed: {e}");
                self.engine.state.last_sync = SyncOutcome::Failed;
                let delay = retry_jitter(&mut rand::rng());
                self.schedule(delay);
                return;
            }
        };

        if report.pending {
            // Data went out but the result hasn't arrived. Don't wait on
            // it — check back after a bounded random delay.
            self.engine.state.last_sync = SyncOutcome::Pending;
            let delay = retry_jitter(&mut rand::rng());
            self.schedule(delay);
            return;
        }

        let Some(delay_time_ms) = report.delay_time_ms else {
            tracing::debug!("no reconcile action pending; staying idle");
            self.state = SchedulerState::Idle;
            return;
        };

        if delay_time_ms > 0 {
            self.schedule(clamp_delay(delay_time_ms, &mut rand::rng()));
            return;
        }

        self.reconcile_window().await;

        let next = match self.client.time_until_reconcile().await {
            Ok(ms) => clamp_delay(ms, &mut rand::rng()),
            Err(e) => {
                tracing::warn!("timeUntilReconcile failed: {e}");
                retry_jitter(&mut rand::rng())
            }
        };
        self.schedule(next);
    }

    /// The reconcile window: open a round, cast ballots, persist once.
    async fn reconcile_window(&mut self) {
        self.state = SchedulerState::ReconcileWindow;
        let viewing_id = Uuid::new_v4();
        if let Err(e) = self.client.reconcile(viewing_id).await {
            tracing::warn!(%viewing_id, "reconcile open failed: {e}");
        }

        let ballot_count = self.client.ballots();
        if ballot_count == 0 {
            tracing::debug!("no ballots available this window");
            return;
        }

        self.state = SchedulerState::Voting;
        self.engine.renormalize(None);
        let weights = self.engine.ballot_weights();
        if weights.is_empty() {
            tracing::debug!("no eligible publishers to vote for");
            return;
        }

        let winners = match self.client.winners(ballot_count, &weights).await {
            Ok(winners) => winners,
            Err(e) => {
                tracing::warn!("winner draw failed: {e}");
                return;
            }
        };

        let mut last_state: Option<WalletState> = None;
        for winner in winners {
            // Eligibility may have shifted since normalization; re-check
            // immediately before each ballot.
            if !self.engine.is_votable(&winner) {
                tracing::debug!(publisher = %winner, "winner no longer eligible; skipping ballot");
                continue;
            }
            match self.client.vote(&winner, viewing_id).await {
                Ok(Some(wallet)) => last_state = Some(wallet),
                Ok(None) => {}
                Err(e) => tracing::warn!(publisher = %winner, "vote failed: {e}"),
            }
        }

        if let Some(wallet) = last_state {
            self.engine.apply_wallet_state(&wallet);
            // One batched write per window. A failed write is logged and
            // the result is lost — accepted weak durability, pending a
            // product decision on retry-until-persisted.
            let snapshot = self.engine.snapshot();
            if let Err(e) = self.gateway.write_snapshot(&snapshot).await {
                tracing::warn!("snapshot write failed: {e}");
            }
        }
    }

    /// Arm the one-shot reconcile timer. Any previously armed timer goes
    /// stale through the epoch bump, so at most one is ever live.
    fn schedule(&mut self, delay_ms: u64) {
        self.epoch += 1;
        let epoch = self.epoch;
        let tx = self.tx.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {
                    let _ = tx.send(Wake::Timer { epoch });
                }
            }
        });
        self.state = SchedulerState::Rescheduled;
        tracing::debug!(delay_ms, epoch, "reconcile timer armed");
    }

    fn schedule_balance(&mut self, delay_ms: u64) {
        self.balance_epoch += 1;
        let epoch = self.balance_epoch;
        let tx = self.tx.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {
                    let _ = tx.send(Wake::Balance { epoch });
                }
            }
        });
    }
}

/// Uniform retry jitter in [1 minute, 10 minutes].
pub fn retry_jitter(rng: &mut impl Rng) -> u64 {
    rng.random_range(RETRY_JITTER_MIN_MS..=RETRY_JITTER_MAX_MS)
}

/// Cap long delays: anything over an hour re-jitters uniformly into
/// [3 minutes, 1 hour], bounding staleness without synchronizing wakeups.
pub fn clamp_delay(delay_ms: u64, rng: &mut impl Rng) -> u64 {
    if delay_ms > DELAY_CAP_MS {
        rng.random_range(CAP_JITTER_MIN_MS..=CAP_JITTER_MAX_MS)
    } else {
        delay_ms
    }
}
