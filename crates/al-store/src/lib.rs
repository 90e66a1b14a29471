//! Persistence layer for attention-ledger state.

pub mod config;
pub mod error;
pub mod store;

pub use config::LedgerConfig;
pub use error::{Result, StoreError};
pub use store::{SnapshotStore, default_base_dir};
