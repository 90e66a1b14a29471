//! Reconciliation engine for the attention ledger.
//!
//! Drives the timer-based state machine that periodically syncs with the
//! external wallet client, casts contribution ballots weighted by the
//! core's normalized percentages, and persists ledger snapshots through an
//! atomic gateway. The wallet client and the durable store live behind
//! narrow traits — this crate implements neither.

pub mod client;
pub mod engine;
pub mod persist;
pub mod scheduler;
pub mod stub;

pub use client::{BallotWeight, ClientError, RemoteLedgerClient, SyncReport, WalletState};
pub use engine::{LedgerEngine, LedgerSnapshot, ReconciliationState, SyncOutcome};
pub use persist::{PersistError, PersistenceGateway};
pub use scheduler::{
    ReconciliationScheduler, SchedulerHandle, SchedulerState, clamp_delay, retry_jitter,
};
pub use stub::{StubClient, StubLog};
