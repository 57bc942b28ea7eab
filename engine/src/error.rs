//! Error types for the Tally engine.

use crate::reconciler::Phase;
use thiserror::Error;

/// All possible errors from the Tally engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Store errors
    #[error("remote store unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("local store corrupt: {0}")]
    LocalStoreCorrupt(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    // Reconciler errors
    #[error("reconciler not ready (currently {0})")]
    NotReady(Phase),

    #[error("reconciler has shut down")]
    Closed,
}

impl Error {
    /// Whether the failure came from the remote side and local data is still usable.
    pub fn is_remote(&self) -> bool {
        matches!(self, Error::RemoteUnavailable(_) | Error::InvalidDocument(_))
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
