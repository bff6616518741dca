//! The persisted log: a normalized JSON snapshot of every rule's window.
//!
//! On disk the log is a list of single-key records, one per rule in
//! registration order:
//!
//! ```json
//! [
//!   { "60": { "amount": 10, "times": [1700000000.25, 1700000003.5] } },
//!   { "3600": { "amount": 100, "times": [1700000000.25, 1700000003.5] } }
//! ]
//! ```
//!
//! The file is always overwritten with a full snapshot, never appended to.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{RatekeeperError, Result};

/// One rule's persisted state.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleRecord {
    pub interval: u64,
    pub amount: u64,
    /// Retained timestamps, ascending.
    pub times: Vec<f64>,
}

/// A full persisted snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    #[serde(with = "wire")]
    pub records: Vec<RuleRecord>,
}

/// Single-key `{"<interval>": {"amount": .., "times": [..]}}` records.
mod wire {
    use std::collections::BTreeMap;

    use serde::de::Error as _;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::RuleRecord;

    #[derive(Serialize, Deserialize)]
    struct Entry {
        amount: u64,
        times: Vec<f64>,
    }

    pub fn serialize<S: Serializer>(
        records: &[RuleRecord],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(records.len()))?;
        for record in records {
            let mut wire = BTreeMap::new();
            wire.insert(
                record.interval.to_string(),
                Entry {
                    amount: record.amount,
                    times: record.times.clone(),
                },
            );
            seq.serialize_element(&wire)?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<RuleRecord>, D::Error> {
        let wire = Vec::<BTreeMap<String, Entry>>::deserialize(deserializer)?;
        let mut records = Vec::with_capacity(wire.len());
        for record in wire {
            for (key, entry) in record {
                let interval = key.parse::<u64>().map_err(|_| {
                    D::Error::custom(format!(
                        "record key {key:?} is not an interval in seconds"
                    ))
                })?;
                records.push(RuleRecord {
                    interval,
                    amount: entry.amount,
                    times: entry.times,
                });
            }
        }
        Ok(records)
    }
}

impl Snapshot {
    pub fn new(records: Vec<RuleRecord>) -> Self {
        Self { records }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// The record for exactly this rule.
    pub fn find(&self, interval: u64, amount: u64) -> Option<&RuleRecord> {
        self.records
            .iter()
            .find(|r| r.interval == interval && r.amount == amount)
    }

    /// The first record for `interval`, whatever its amount.
    pub fn find_interval(&self, interval: u64) -> Option<&RuleRecord> {
        self.records.iter().find(|r| r.interval == interval)
    }
}

/// Reads prior state from one path and writes snapshots to another (often
/// the same file).
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
    load_path: PathBuf,
}

impl SnapshotStore {
    /// Read and write the same file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            load_path: path.clone(),
            path,
        }
    }

    /// Read prior state from `load_path`, write snapshots to `path`.
    pub fn with_load_path(path: impl Into<PathBuf>, load_path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            load_path: load_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_path(&self) -> &Path {
        &self.load_path
    }

    /// Load prior state. A missing file is `Ok(None)`.
    pub fn load(&self) -> Result<Option<Snapshot>> {
        let contents = match fs::read_to_string(&self.load_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.load_path.display(), "No prior log, starting empty");
                return Ok(None);
            }
            Err(source) => {
                return Err(RatekeeperError::Persistence {
                    path: self.load_path.clone(),
                    source,
                })
            }
        };

        let snapshot =
            Snapshot::from_json(&contents).map_err(|source| RatekeeperError::LogFormat {
                path: self.load_path.clone(),
                source,
            })?;
        Ok(Some(snapshot))
    }

    /// Overwrite the log with `snapshot`.
    ///
    /// Writes to a sibling temp file, syncs it, then renames it over the
    /// log so readers never see a half-written file.
    pub fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        let json = snapshot
            .to_json()
            .map_err(|source| RatekeeperError::LogFormat {
                path: self.path.clone(),
                source,
            })?;

        let temp_name = format!(
            "{}.tmp.{}",
            self.path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy(),
            uuid::Uuid::new_v4().simple()
        );
        let temp_path = self.path.with_file_name(temp_name);
        let io_err = |source| RatekeeperError::Persistence {
            path: self.path.clone(),
            source,
        };

        let written = write_synced(&temp_path, json.as_bytes());
        if let Err(e) = written.and_then(|()| fs::rename(&temp_path, &self.path)) {
            let _ = fs::remove_file(&temp_path);
            return Err(io_err(e));
        }

        trace!(path = %self.path.display(), bytes = json.len(), "Snapshot persisted");
        Ok(())
    }
}

fn write_synced(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file: File = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}
