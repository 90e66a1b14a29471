//! Attention ledger core: per-publisher attention accounting and
//! contribution-percentage allocation.
//!
//! Navigation events accumulate duration and visit counts into a synopsis
//! table, a pluggable scorekeeper turns the counters into attention scores,
//! and the normalizer resolves pins and scores into an integer percentage
//! split that always sums to 100 for a non-empty eligible set.
//!
//! Zero I/O — pure logic with no opinions about timers, transport or
//! persistence.

pub mod constants;
pub mod normalize;
pub mod publisher;
pub mod rules;
pub mod score;
pub mod synopsis;
pub mod time;
pub mod visit;

pub use normalize::{Allocation, Share, normalize, round_to_target};
pub use publisher::PublisherRecord;
pub use rules::ExclusionRules;
pub use score::Scorekeeper;
pub use synopsis::{Synopsis, SynopsisOptions};
pub use time::{DAY_MS, now_unix_ms, unix_ms_to_iso8601};
pub use visit::{NOOP_LOCATION, VisitOutcome, VisitTracker, resolve_publisher_key};
