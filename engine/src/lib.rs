//! # Tally Engine
//!
//! Dual-store reconciliation for a pair of answer counters.
//!
//! The counters live in three places: in memory, in a device-local store,
//! and in a shared remote document. This crate keeps the three convergent
//! across network failures, concurrent devices and manual resets.
//!
//! ## Core Concepts
//!
//! ### Snapshots
//!
//! A [`Snapshot`] is the correct/incorrect pair plus the instant it was last
//! written. Totals and success rates are derived on demand.
//!
//! ### Stores
//!
//! - [`LocalStore`] - infallible, synchronous, device-scoped
//!   ([`MemoryLocalStore`], [`FileLocalStore`])
//! - [`RemoteStore`] - fallible, asynchronous, shared
//!   ([`MemoryRemoteStore`], and `HttpRemoteStore` with the `http` feature)
//!
//! ### Merge
//!
//! On startup [`merge`] picks a winner: the remote wins if it recorded more
//! answers, or failing that if its write is strictly newer.
//!
//! ### Reconciler
//!
//! The [`Reconciler`] actor owns the in-memory snapshot. Increments are
//! pushed to both stores after a debounce; manual sync adopts the remote
//! snapshot unconditionally; reset zeroes both stores.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use tally_engine::{
//!     MemoryLocalStore, MemoryRemoteStore, Reconciler, ReconcilerConfig, SystemClock,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> tally_engine::Result<()> {
//! let clock = Arc::new(SystemClock);
//! let local = MemoryLocalStore::new();
//! let remote = MemoryRemoteStore::new(clock.clone());
//!
//! let handle = Reconciler::start(local, remote.clone(), clock, ReconcilerConfig::default());
//! handle.ready().await?;
//!
//! handle.on_correct()?;
//! handle.on_correct()?;
//! handle.on_incorrect()?;
//! handle.flush().await?;
//!
//! let status = handle.status();
//! assert_eq!(status.total(), 3);
//! assert_eq!(status.success_rate(), 67);
//! assert_eq!(remote.save_calls(), 1);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod document;
pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod local;
pub mod reconcile;
pub mod reconciler;
pub mod remote;
pub mod snapshot;

// Re-export main types at crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, ReconcilerConfig, DEFAULT_DEBOUNCE};
pub use document::{RemoteDocument, WriteRequest, DEFAULT_COLLECTION, DEFAULT_DOCUMENT_ID};
pub use error::{Error, Result};
#[cfg(feature = "http")]
pub use http::{HttpRemoteConfig, HttpRemoteStore};
pub use local::{FileLocalStore, LocalStore, MemoryLocalStore};
pub use reconcile::{merge, ConflictResolution, MergeOutcome, MergeReason};
pub use reconciler::{
    ConnectionStatus, OfflineReason, OperationReport, Phase, Reconciler, ReconcilerHandle, Status,
};
pub use remote::{MemoryRemoteStore, RemoteStore};
pub use snapshot::{Counters, Outcome, Snapshot};

/// Wall-clock instant, always UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
