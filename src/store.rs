//! Sync state store: the persisted mapping from issue id to last-synced
//! fingerprint, remote handle, and timestamp.
//!
//! The store exclusively owns the state file. The reconciler reads records
//! (through `PriorRecord` views) but never mutates them; the driver mutates
//! the in-memory state only after a confirmed remote success and commits
//! the whole document atomically, exactly once per pass.
//!
//! Corruption halts the run. Silently discarding an unparseable state file
//! would re-create every remote issue on the next pass, which is strictly
//! worse than stopping.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::core::{ContentFingerprint, IssueId, IssueStatus, PriorRecord, RemoteHandle};
use crate::error::{Effect, Transience};

const STATE_VERSION: u32 = 1;

/// Persisted per-issue sync record.
///
/// Created on first successful create, updated on every successful
/// create/update, never deleted except via `reset`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub issue_id: IssueId,
    pub fingerprint: ContentFingerprint,
    #[serde(default)]
    pub remote_handle: Option<RemoteHandle>,
    #[serde(with = "time::serde::rfc3339")]
    pub last_synced_at: OffsetDateTime,
    pub last_status: IssueStatus,
}

impl SyncRecord {
    /// The reconciler-facing view of this record.
    pub fn prior(&self) -> PriorRecord {
        PriorRecord {
            fingerprint: self.fingerprint.clone(),
            remote_handle: self.remote_handle,
        }
    }
}

/// The whole persisted document, keyed by issue id.
///
/// Forward-readable across versions: unknown fields in the file are
/// ignored (serde default), never rejected.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncState {
    pub version: u32,
    pub records: BTreeMap<IssueId, SyncRecord>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            records: BTreeMap::new(),
        }
    }
}

impl SyncState {
    pub fn get(&self, id: &IssueId) -> Option<&SyncRecord> {
        self.records.get(id)
    }

    pub fn upsert(&mut self, record: SyncRecord) {
        self.records.insert(record.issue_id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Reconciler input: fingerprint + handle per previously-synced issue.
    pub fn prior_records(&self) -> BTreeMap<IssueId, PriorRecord> {
        self.records
            .iter()
            .map(|(id, record)| (id.clone(), record.prior()))
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum StateError {
    /// The persisted representation cannot be parsed. Fatal to the pass.
    #[error("state file {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("state file {} could not be encoded: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("state io failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StateError {
    pub fn transience(&self) -> Transience {
        match self {
            StateError::Corrupt { .. } | StateError::Encode { .. } => Transience::Permanent,
            StateError::Io { .. } => Transience::Unknown,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            StateError::Corrupt { .. } | StateError::Encode { .. } => Effect::None,
            StateError::Io { .. } => Effect::Unknown,
        }
    }
}

/// Handle on the state file. Load/commit/reset only; no ambient global.
#[derive(Clone, Debug)]
pub struct SyncStateStore {
    path: PathBuf,
}

impl SyncStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted state. A missing file is an empty state (first
    /// run); an unparseable file is `StateError::Corrupt`.
    pub fn load(&self) -> Result<SyncState, StateError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(SyncState::default()),
            Err(e) => {
                return Err(StateError::Io {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };
        serde_json::from_slice(&bytes).map_err(|e| StateError::Corrupt {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Persist the whole state atomically (write-to-temp-then-rename).
    ///
    /// A crash mid-commit leaves either the previous file or the new one,
    /// never a torn write. After commit returns, a subsequent `load`
    /// reflects exactly the committed set.
    pub fn commit(&self, state: &SyncState) -> Result<(), StateError> {
        let io_err = |source| StateError::Io {
            path: self.path.clone(),
            source,
        };
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(io_err)?;

        let json = serde_json::to_vec_pretty(state).map_err(|e| StateError::Encode {
            path: self.path.clone(),
            source: e,
        })?;
        let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        temp.write_all(&json).map_err(io_err)?;
        temp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    /// Clear all records. Explicit operator trigger only.
    pub fn reset(&self) -> Result<(), StateError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StateError::Io {
                path: self.path.clone(),
                source: e,
            }),
        }
    }
}
