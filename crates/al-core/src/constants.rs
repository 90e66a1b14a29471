/// Eligibility gate: minimum accumulated attention before a publisher can
/// receive an unpinned share (milliseconds)
pub const DEFAULT_MIN_PUBLISHER_DURATION_MS: u64 = 8_000;

/// Eligibility gate: minimum visit count
pub const DEFAULT_MIN_PUBLISHER_VISITS: u32 = 1;

/// Days between reconciliation rounds
pub const DEFAULT_RECONCILE_FREQUENCY_DAYS: u32 = 30;

/// Retry window after a failed or still-pending sync round: lower bound (ms)
pub const RETRY_JITTER_MIN_MS: u64 = 60_000;

/// Retry window after a failed or still-pending sync round: upper bound (ms)
pub const RETRY_JITTER_MAX_MS: u64 = 600_000;

/// Client-supplied delays above this are re-jittered (1 hour, ms)
pub const DELAY_CAP_MS: u64 = 3_600_000;

/// Re-jitter window for capped delays: lower bound (ms)
pub const CAP_JITTER_MIN_MS: u64 = 180_000;

/// Re-jitter window for capped delays: upper bound (ms)
pub const CAP_JITTER_MAX_MS: u64 = 3_600_000;

/// Fixed delay for the balance refresh after a network reconnect (ms)
pub const RECONNECT_BALANCE_DELAY_MS: u64 = 5_000;
