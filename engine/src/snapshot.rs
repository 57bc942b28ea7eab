//! Snapshot types exchanged between the stores and the reconciler.
//!
//! A snapshot is the unit of state: the two tallies plus the instant they
//! were last written. Totals and success rates are derived, never stored.

use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// Which tally an answer counts towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    Correct,
    Incorrect,
}

/// The bare counter pair, without a timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counters {
    pub correct_count: u64,
    pub incorrect_count: u64,
}

impl Counters {
    /// Both tallies at zero.
    pub const ZERO: Counters = Counters::new(0, 0);

    pub const fn new(correct_count: u64, incorrect_count: u64) -> Self {
        Self {
            correct_count,
            incorrect_count,
        }
    }

    /// Count one more answer. Saturates instead of wrapping.
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Correct => self.correct_count = self.correct_count.saturating_add(1),
            Outcome::Incorrect => self.incorrect_count = self.incorrect_count.saturating_add(1),
        }
    }

    /// Number of answers recorded.
    pub fn total(&self) -> u64 {
        self.correct_count.saturating_add(self.incorrect_count)
    }

    /// Percentage of correct answers, rounded half up; `0` when nothing is recorded.
    pub fn success_rate(&self) -> u8 {
        let total = u128::from(self.total());
        if total == 0 {
            return 0;
        }
        let correct = u128::from(self.correct_count);
        // round(100 * c / t) == floor((200 * c + t) / (2 * t))
        ((200 * correct + total) / (2 * total)) as u8
    }

    pub fn is_zero(&self) -> bool {
        self.total() == 0
    }
}

/// Counters plus the instant they were last written.
///
/// `last_updated` is `None` for a snapshot that has never been written.
/// Local snapshots carry client-clock stamps; remote snapshots carry
/// server-clock stamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(flatten)]
    pub counters: Counters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<Timestamp>,
}

impl Snapshot {
    /// A snapshot that has never been written.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(counters: Counters, last_updated: Option<Timestamp>) -> Self {
        Self {
            counters,
            last_updated,
        }
    }

    /// Zeroed counters stamped at `at`.
    pub fn zeroed(at: Timestamp) -> Self {
        Self::new(Counters::ZERO, Some(at))
    }

    /// Same counters, restamped.
    pub fn stamped(self, at: Timestamp) -> Self {
        Self::new(self.counters, Some(at))
    }

    pub fn correct_count(&self) -> u64 {
        self.counters.correct_count
    }

    pub fn incorrect_count(&self) -> u64 {
        self.counters.incorrect_count
    }

    pub fn total(&self) -> u64 {
        self.counters.total()
    }

    pub fn success_rate(&self) -> u8 {
        self.counters.success_rate()
    }
}
