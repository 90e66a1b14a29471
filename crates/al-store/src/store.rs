//! Atomic snapshot persistence for ledger state.
//!
//! One JSON file, replaced with write-to-temp + fsync + rename so a crash
//! mid-write can never leave a truncated snapshot behind. Loading is
//! strict about the outer shape but lenient per publisher record: a
//! corrupt entry is logged and skipped, and the rest of the table loads.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::{env, fs};

use al_core::publisher::PublisherRecord;
use al_core::synopsis::{Synopsis, SynopsisOptions};
use al_engine::{LedgerSnapshot, PersistError, PersistenceGateway};

use crate::error::{Result, StoreError};

const SNAPSHOT_FILE: &str = "ledger.json";

/// Default base directory for all ledger storage.
pub fn default_base_dir() -> PathBuf {
    dirs_home().join(".attention-ledger")
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// File-backed snapshot store with write-then-rename atomicity.
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Store under `dir/ledger.json`, creating `dir` as needed.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(SNAPSHOT_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the last snapshot. A missing file is `Ok(None)`.
    pub fn load(&self) -> Result<Option<LedgerSnapshot>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        decode_snapshot(value).map(Some)
    }

    /// Serialize and atomically replace the snapshot file. The temp file
    /// lives in the same directory so the rename stays on one filesystem.
    pub fn write(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        let payload = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&payload)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl PersistenceGateway for SnapshotStore {
    async fn write_snapshot(&mut self, snapshot: &LedgerSnapshot) -> std::result::Result<(), PersistError> {
        self.write(snapshot).map_err(|e| match e {
            StoreError::Json(e) => PersistError::Encode(e.to_string()),
            other => PersistError::Io(other.to_string()),
        })
    }
}

/// Decode a snapshot, skipping publisher records that fail to parse.
fn decode_snapshot(value: serde_json::Value) -> Result<LedgerSnapshot> {
    let obj = value
        .as_object()
        .ok_or_else(|| StoreError::InvalidData("snapshot root must be an object".to_string()))?;

    let reconcile_stamp_ms = obj
        .get("reconcileStamp")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| StoreError::InvalidData("missing reconcileStamp".to_string()))?;
    let reconcile_frequency_days = obj
        .get("reconcileFrequency")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| StoreError::InvalidData("missing reconcileFrequency".to_string()))?
        as u32;

    let options: SynopsisOptions = match obj.get("options") {
        Some(raw) => serde_json::from_value(raw.clone())?,
        None => SynopsisOptions::default(),
    };

    let mut publishers = BTreeMap::new();
    let mut skipped = 0usize;
    if let Some(map) = obj.get("publishers").and_then(serde_json::Value::as_object) {
        for (key, raw) in map {
            match serde_json::from_value::<PublisherRecord>(raw.clone()) {
                Ok(rec) => {
                    publishers.insert(key.clone(), rec);
                }
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(publisher = %key, "skipping corrupt record: {e}");
                }
            }
        }
    }
    if skipped > 0 {
        tracing::warn!("dropped {skipped} corrupt publisher records");
    }

    Ok(LedgerSnapshot {
        synopsis: Synopsis::from_parts(publishers, options),
        reconcile_stamp_ms,
        reconcile_frequency_days,
    })
}
