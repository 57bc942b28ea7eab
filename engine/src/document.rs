//! Wire schema of the shared counter document.
//!
//! ```json
//! {
//!   "correctCount": 3,
//!   "incorrectCount": 2,
//!   "lastUpdated": "2024-02-01T00:00:00.000Z",
//!   "timestamp": 1706745600000,
//!   "reset": true
//! }
//! ```
//!
//! `lastUpdated` and `timestamp` are both assigned by the server when the
//! document is written. `reset` is only present on documents written by a
//! reset.

use crate::{Counters, Snapshot, Timestamp};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Collection holding the counter document.
pub const DEFAULT_COLLECTION: &str = "questionCounters";

/// Fixed identifier of the counter document.
pub const DEFAULT_DOCUMENT_ID: &str = "userCounters";

/// The stored document, as served by the remote store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDocument {
    #[serde(default)]
    pub correct_count: u64,
    #[serde(default)]
    pub incorrect_count: u64,
    /// ISO-8601 write time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    /// Write time in epoch milliseconds.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset: Option<bool>,
}

impl RemoteDocument {
    /// A document as written at `at`.
    pub fn written(counters: Counters, reset: bool, at: Timestamp) -> Self {
        Self {
            correct_count: counters.correct_count,
            incorrect_count: counters.incorrect_count,
            last_updated: Some(at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            timestamp: at.timestamp_millis(),
            reset: reset.then_some(true),
        }
    }

    pub fn counters(&self) -> Counters {
        Counters::new(self.correct_count, self.incorrect_count)
    }

    /// The server write time.
    ///
    /// Prefers `lastUpdated`; falls back to `timestamp` when the string is
    /// missing or unparseable, and to `None` when neither is usable.
    pub fn written_at(&self) -> Option<Timestamp> {
        self.last_updated
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| {
                (self.timestamp > 0)
                    .then(|| DateTime::from_timestamp_millis(self.timestamp))
                    .flatten()
            })
    }

    pub fn is_reset(&self) -> bool {
        self.reset.unwrap_or(false)
    }

    /// Convert to the snapshot the reconciler consumes.
    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot::new(self.counters(), self.written_at())
    }
}

/// Body of a document write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteRequest {
    pub correct_count: u64,
    pub incorrect_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset: Option<bool>,
}

impl WriteRequest {
    pub fn update(counters: Counters) -> Self {
        Self {
            correct_count: counters.correct_count,
            incorrect_count: counters.incorrect_count,
            reset: None,
        }
    }

    pub fn reset() -> Self {
        Self {
            correct_count: 0,
            incorrect_count: 0,
            reset: Some(true),
        }
    }

    pub fn counters(&self) -> Counters {
        Counters::new(self.correct_count, self.incorrect_count)
    }

    pub fn is_reset(&self) -> bool {
        self.reset.unwrap_or(false)
    }

    /// The document this request produces when the server stamps it at `at`.
    pub fn into_document(self, at: Timestamp) -> RemoteDocument {
        RemoteDocument::written(self.counters(), self.is_reset(), at)
    }
}
