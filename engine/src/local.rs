//! Local snapshot store - the device-scoped copy of the counters.
//!
//! The local store never fails from the caller's point of view. Reads that
//! hit missing or malformed data degrade to an empty snapshot, and write
//! failures are logged and swallowed; the in-memory snapshot stays
//! authoritative either way.

use crate::{Counters, Error, Snapshot, Timestamp};
use chrono::DateTime;
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Storage key of the correct tally.
pub const CORRECT_KEY: &str = "correctCount";
/// Storage key of the incorrect tally.
pub const INCORRECT_KEY: &str = "incorrectCount";
/// Storage key of the last write time, in epoch milliseconds.
pub const TIMESTAMP_KEY: &str = "dataTimestamp";

/// Device-scoped persistence of a snapshot.
pub trait LocalStore: Send + Sync {
    /// Read the stored snapshot, or an empty one if nothing usable is stored.
    fn load(&self) -> Snapshot;

    /// Persist `snapshot`, including its `last_updated` stamp.
    fn save(&self, snapshot: &Snapshot);

    /// Zero the stored counters, stamped at `at`.
    fn reset(&self, at: Timestamp) {
        self.save(&Snapshot::zeroed(at));
    }
}

/// In-process local store.
///
/// Clones share the same slot, so tests can inspect what the reconciler wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryLocalStore {
    slot: Arc<Mutex<Option<Snapshot>>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `snapshot`.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(snapshot))),
        }
    }

    /// The raw stored value, `None` if never written.
    pub fn stored(&self) -> Option<Snapshot> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LocalStore for MemoryLocalStore {
    fn load(&self) -> Snapshot {
        self.stored().unwrap_or_default()
    }

    fn save(&self, snapshot: &Snapshot) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(*snapshot);
    }
}

/// Local store backed by a JSON key-value file.
///
/// The file is a flat object of string values, one per key:
///
/// ```json
/// {"correctCount": "3", "incorrectCount": "2", "dataTimestamp": "1706745600000"}
/// ```
#[derive(Debug, Clone)]
pub struct FileLocalStore {
    path: PathBuf,
}

impl FileLocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<Option<Map<String, Value>>, Error> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::LocalStoreCorrupt(e.to_string())),
        };

        match serde_json::from_str(&raw) {
            Ok(Value::Object(entries)) => Ok(Some(entries)),
            Ok(other) => Err(Error::LocalStoreCorrupt(format!(
                "expected an object, found {other}"
            ))),
            Err(e) => Err(Error::LocalStoreCorrupt(e.to_string())),
        }
    }

    fn write_entries(&self, entries: &Map<String, Value>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string(entries)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)
    }
}

impl LocalStore for FileLocalStore {
    fn load(&self) -> Snapshot {
        let entries = match self.read_entries() {
            Ok(Some(entries)) => entries,
            Ok(None) => return Snapshot::empty(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring local snapshot");
                return Snapshot::empty();
            }
        };

        let correct = read_count(&entries, CORRECT_KEY);
        let incorrect = read_count(&entries, INCORRECT_KEY);
        let millis = read_count(&entries, TIMESTAMP_KEY);

        let last_updated = i64::try_from(millis)
            .ok()
            .filter(|ms| *ms > 0)
            .and_then(DateTime::from_timestamp_millis);

        Snapshot::new(Counters::new(correct, incorrect), last_updated)
    }

    fn save(&self, snapshot: &Snapshot) {
        let millis = snapshot
            .last_updated
            .map(|at| at.timestamp_millis())
            .unwrap_or(0);

        let mut entries = Map::new();
        entries.insert(
            CORRECT_KEY.to_string(),
            Value::String(snapshot.correct_count().to_string()),
        );
        entries.insert(
            INCORRECT_KEY.to_string(),
            Value::String(snapshot.incorrect_count().to_string()),
        );
        entries.insert(TIMESTAMP_KEY.to_string(), Value::String(millis.to_string()));

        if let Err(e) = self.write_entries(&entries) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to write local snapshot");
        }
    }
}

/// Read a non-negative integer the way browser storage values are parsed:
/// leading digits are taken, anything unparseable counts as zero.
fn read_count(entries: &Map<String, Value>, key: &str) -> u64 {
    let parsed = match entries.get(key) {
        None | Some(Value::Null) => return 0,
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => parse_leading_digits(s),
        Some(_) => None,
    };

    parsed.unwrap_or_else(|| {
        let err = Error::LocalStoreCorrupt(format!("{key} = {}", entries[key]));
        tracing::warn!(error = %err, "Treating local value as zero");
        0
    })
}

fn parse_leading_digits(s: &str) -> Option<u64> {
    let trimmed = s.trim_start();
    let end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    trimmed[..end].parse().ok()
}
