//! Startup merge of the local and remote snapshots.
//!
//! This is the core of the conflict resolution. Given the snapshot this
//! device last wrote and the snapshot the shared document holds, it decides
//! deterministically which one becomes the in-memory state.
//!
//! # Rule
//!
//! 1. Remote wins if its total is strictly greater (more answers recorded).
//! 2. Otherwise remote wins if it carries a write time strictly later than
//!    the local one. A local snapshot without a write time counts as written
//!    at the Unix epoch.
//! 3. Otherwise local wins.
//!
//! The rule is asymmetric: a remote write with a lower total wins only
//! through the timestamp branch, and local and server stamps come from
//! different clocks.

use crate::{Snapshot, Timestamp};
use serde::{Deserialize, Serialize};

/// Which side the merge adopted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictResolution {
    /// Local snapshot kept
    LocalWins,
    /// Remote snapshot adopted
    RemoteWins,
}

/// Why the merge resolved the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeReason {
    /// Remote recorded more answers
    RemoteHasMoreProgress,
    /// Remote total not greater, but its write is newer
    RemoteIsNewer,
    /// Remote is stale or equal
    LocalUpToDate,
}

/// Result of a startup merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeOutcome {
    pub resolution: ConflictResolution,
    pub reason: MergeReason,
    /// The snapshot to adopt as in-memory state
    pub snapshot: Snapshot,
}

impl MergeOutcome {
    pub fn remote_won(&self) -> bool {
        self.resolution == ConflictResolution::RemoteWins
    }
}

/// Merge a local and a remote snapshot.
pub fn merge(local: &Snapshot, remote: &Snapshot) -> MergeOutcome {
    let (resolution, reason) = if remote.total() > local.total() {
        (
            ConflictResolution::RemoteWins,
            MergeReason::RemoteHasMoreProgress,
        )
    } else if is_newer(remote.last_updated, local.last_updated) {
        (ConflictResolution::RemoteWins, MergeReason::RemoteIsNewer)
    } else {
        (ConflictResolution::LocalWins, MergeReason::LocalUpToDate)
    };

    let snapshot = match resolution {
        ConflictResolution::RemoteWins => *remote,
        ConflictResolution::LocalWins => *local,
    };

    MergeOutcome {
        resolution,
        reason,
        snapshot,
    }
}

fn is_newer(remote: Option<Timestamp>, local: Option<Timestamp>) -> bool {
    match remote {
        Some(remote) => remote > local.unwrap_or(Timestamp::UNIX_EPOCH),
        None => false,
    }
}
