//! Remote snapshot store - the shared document every device mirrors.
//!
//! Every call may fail with [`Error::RemoteUnavailable`]. A missing document
//! is not a failure: it loads as an empty snapshot.

use crate::clock::{Clock, SystemClock};
use crate::document::{RemoteDocument, WriteRequest};
use crate::error::Result;
use crate::{Counters, Error, Snapshot};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared, network-bound persistence of a snapshot.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the current document as a snapshot stamped with the server write time.
    async fn load(&self) -> Result<Snapshot>;

    /// Write `counters`; the server stamps the write time.
    ///
    /// Returns whether the write was acknowledged.
    async fn save(&self, counters: Counters) -> Result<bool>;

    /// Write zeroed counters with the reset marker.
    ///
    /// Returns whether the write was acknowledged.
    async fn reset(&self) -> Result<bool>;
}

#[async_trait]
impl<T: RemoteStore + ?Sized> RemoteStore for Arc<T> {
    async fn load(&self) -> Result<Snapshot> {
        (**self).load().await
    }

    async fn save(&self, counters: Counters) -> Result<bool> {
        (**self).save(counters).await
    }

    async fn reset(&self) -> Result<bool> {
        (**self).reset().await
    }
}

#[derive(Debug)]
struct Inner {
    document: Mutex<Option<RemoteDocument>>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
    acknowledge: AtomicBool,
    loads: AtomicUsize,
    saves: AtomicUsize,
    resets: AtomicUsize,
    saved: std::sync::Mutex<VecDeque<Counters>>,
}

/// Most recent `save` payloads kept by [`MemoryRemoteStore::saved_counters`].
const SAVED_HISTORY: usize = 256;

/// In-process remote store for tests and demos.
///
/// Stands in for the document service; nothing is persisted. Outages are simulated with [`set_available`](Self::set_available), and
/// writes that resolve without acknowledgment with
/// [`set_acknowledge`](Self::set_acknowledge). Clones share state.
#[derive(Debug, Clone)]
pub struct MemoryRemoteStore {
    inner: Arc<Inner>,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryRemoteStore {
    /// An empty store stamping writes with `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::build(clock, None)
    }

    /// A store already holding `document`.
    pub fn with_document(clock: Arc<dyn Clock>, document: RemoteDocument) -> Self {
        Self::build(clock, Some(document))
    }

    fn build(clock: Arc<dyn Clock>, document: Option<RemoteDocument>) -> Self {
        Self {
            inner: Arc::new(Inner {
                document: Mutex::new(document),
                clock,
                available: AtomicBool::new(true),
                acknowledge: AtomicBool::new(true),
                loads: AtomicUsize::new(0),
                saves: AtomicUsize::new(0),
                resets: AtomicUsize::new(0),
                saved: std::sync::Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Toggle reachability; while unavailable every call fails.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Toggle acknowledgment; while off, writes are dropped and resolve `false`.
    pub fn set_acknowledge(&self, acknowledge: bool) {
        self.inner.acknowledge.store(acknowledge, Ordering::SeqCst);
    }

    /// Replace the stored document, as another device would.
    pub async fn put_document(&self, document: RemoteDocument) {
        *self.inner.document.lock().await = Some(document);
    }

    /// The stored document, if any.
    pub async fn document(&self) -> Option<RemoteDocument> {
        self.inner.document.lock().await.clone()
    }

    pub fn load_calls(&self) -> usize {
        self.inner.loads.load(Ordering::SeqCst)
    }

    pub fn save_calls(&self) -> usize {
        self.inner.saves.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) -> usize {
        self.inner.resets.load(Ordering::SeqCst)
    }

    /// Counters passed to `save`, oldest first, acknowledged or not.
    ///
    /// Only the last 256 calls are kept.
    pub fn saved_counters(&self) -> Vec<Counters> {
        self.inner
            .saved
            .lock()
            .map(|saved| saved.iter().copied().collect())
            .unwrap_or_default()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.inner.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::RemoteUnavailable("remote store is offline".into()))
        }
    }

    async fn write(&self, request: WriteRequest) -> Result<bool> {
        self.ensure_available()?;
        if !self.inner.acknowledge.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let document = request.into_document(self.inner.clock.now());
        *self.inner.document.lock().await = Some(document);
        Ok(true)
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn load(&self) -> Result<Snapshot> {
        self.inner.loads.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;
        let document = self.inner.document.lock().await;
        Ok(document
            .as_ref()
            .map(RemoteDocument::to_snapshot)
            .unwrap_or_default())
    }

    async fn save(&self, counters: Counters) -> Result<bool> {
        self.inner.saves.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut saved) = self.inner.saved.lock() {
            if saved.len() == SAVED_HISTORY {
                saved.pop_front();
            }
            saved.push_back(counters);
        }
        self.write(WriteRequest::update(counters)).await
    }

    async fn reset(&self) -> Result<bool> {
        self.inner.resets.fetch_add(1, Ordering::SeqCst);
        self.write(WriteRequest::reset()).await
    }
}
