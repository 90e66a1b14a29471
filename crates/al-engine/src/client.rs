//! The remote ledger client boundary.
//!
//! Wallet, key management and transport live outside this crate; the
//! engine consumes them through this narrow interface. Results use fixed
//! schemas with explicit optional fields rather than free-form payloads.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug)]
pub enum ClientError {
    /// Transport-level failure (network down, timeout).
    Transport(String),
    /// The remote answered with something the protocol does not allow.
    Protocol(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Transport(msg) => write!(f, "transport error: {msg}"),
            ClientError::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {}

/// Outcome of a sync round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Data was submitted but the result has not arrived yet. The caller
    /// should check back after a bounded delay rather than wait.
    pub pending: bool,
    /// Milliseconds until the next reconcile-relevant action. `Some(0)`
    /// means a reconcile window is open right now; `None` means no action
    /// is called for.
    pub delay_time_ms: Option<u64>,
}

/// Per-publisher voting weight handed to the winner draw.
#[derive(Debug, Clone, PartialEq)]
pub struct BallotWeight {
    pub publisher_key: String,
    /// Normalized share in [0, 1].
    pub weight: f64,
}

/// Wallet state snapshot returned by a vote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletState {
    /// Next reconciliation stamp decided by the remote, Unix ms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconcile_stamp_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
}

/// Narrow call interface to the external wallet/ledger client.
///
/// Every call may suspend; none may block. Errors are transient by
/// contract — the scheduler turns them into backoff, never into a crash.
#[allow(async_fn_in_trait)]
pub trait RemoteLedgerClient {
    /// Initiate a sync round with the remote service.
    async fn sync(&mut self) -> Result<SyncReport, ClientError>;

    /// Unspent ballots available for the current window.
    fn ballots(&self) -> u32;

    /// Weighted-without-replacement winner draw over the given weights.
    async fn winners(
        &mut self,
        ballot_count: u32,
        weights: &[BallotWeight],
    ) -> Result<Vec<String>, ClientError>;

    /// Cast one ballot. A `Some` result carries fresh wallet state.
    async fn vote(
        &mut self,
        publisher_key: &str,
        viewing_id: Uuid,
    ) -> Result<Option<WalletState>, ClientError>;

    /// Milliseconds until the next reconciliation is due.
    async fn time_until_reconcile(&mut self) -> Result<u64, ClientError>;

    /// Open a reconciliation round under the given viewing id.
    async fn reconcile(&mut self, viewing_id: Uuid) -> Result<(), ClientError>;
}
