//! The reconciler - owner of the in-memory snapshot.
//!
//! The reconciler runs as an actor: a single task owns the counters and both
//! stores, and every trigger reaches it through a command queue. Store calls
//! are strictly ordered and the snapshot has a single writer.
//!
//! # Lifecycle
//!
//! ```text
//! Initializing -> Merging -> Ready <-> { Saving, Syncing, Resetting }
//! ```
//!
//! - **Merging** reads both stores once and applies [`merge`].
//! - **Saving** is entered when the debounce timer fires after the last
//!   increment of a burst. Increments arriving meanwhile queue behind it.
//! - **Syncing** adopts the remote snapshot unconditionally. A pending push
//!   is dropped only when the remote load succeeds.
//! - **Resetting** zeroes local state first, then the remote.
//!
//! Triggers are refused while the phase is loading (everything except
//! `Ready` and `Saving`), mirroring disabled UI controls.

use crate::clock::Clock;
use crate::config::ReconcilerConfig;
use crate::error::Result;
use crate::local::LocalStore;
use crate::reconcile::merge;
use crate::remote::RemoteStore;
use crate::{Counters, Error, Outcome, Snapshot, Timestamp};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};

/// Reconciler phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Initializing,
    Merging,
    Ready,
    Saving,
    Syncing,
    Resetting,
}

impl Phase {
    /// Whether the UI shows a loading state (controls disabled).
    pub fn is_loading(self) -> bool {
        matches!(
            self,
            Phase::Initializing | Phase::Merging | Phase::Syncing | Phase::Resetting
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Initializing => "initializing",
            Phase::Merging => "merging",
            Phase::Ready => "ready",
            Phase::Saving => "saving",
            Phase::Syncing => "syncing",
            Phase::Resetting => "resetting",
        };
        f.write_str(name)
    }
}

/// Why the reconciler is working from local data only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OfflineReason {
    /// Remote unreachable at startup
    UsingLocalCache,
    /// A background push failed; the local write went through
    SavedLocally,
    /// A reset cleared local state but not the remote
    ResetPending,
}

/// Last known connectivity outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionStatus {
    Connecting,
    Syncing,
    Connected,
    Offline(OfflineReason),
    SyncError,
    Resetting,
}

impl ConnectionStatus {
    pub fn is_offline(self) -> bool {
        matches!(self, ConnectionStatus::Offline(_))
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectionStatus::Connecting => "Connecting...",
            ConnectionStatus::Syncing => "Syncing...",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Offline(OfflineReason::UsingLocalCache) => {
                "Offline (using local cache)"
            }
            ConnectionStatus::Offline(OfflineReason::SavedLocally) => "Offline (saved locally)",
            ConnectionStatus::Offline(OfflineReason::ResetPending) => "Offline (reset pending)",
            ConnectionStatus::SyncError => "Sync error",
            ConnectionStatus::Resetting => "Resetting...",
        };
        f.write_str(text)
    }
}

/// Observable reconciler state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub phase: Phase,
    pub loading: bool,
    pub connection: ConnectionStatus,
    pub last_saved_at: Option<Timestamp>,
    pub correct_count: u64,
    pub incorrect_count: u64,
}

impl Status {
    fn initial() -> Self {
        Self {
            phase: Phase::Initializing,
            loading: true,
            connection: ConnectionStatus::Connecting,
            last_saved_at: None,
            correct_count: 0,
            incorrect_count: 0,
        }
    }

    pub fn counters(&self) -> Counters {
        Counters::new(self.correct_count, self.incorrect_count)
    }

    pub fn total(&self) -> u64 {
        self.counters().total()
    }

    pub fn success_rate(&self) -> u8 {
        self.counters().success_rate()
    }
}

/// Acknowledgment of an explicit sync or reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationReport {
    pub ok: bool,
    pub message: String,
}

impl OperationReport {
    fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

enum Command {
    Record(Outcome),
    Sync(oneshot::Sender<OperationReport>),
    Reset(oneshot::Sender<OperationReport>),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Entry point for starting a reconciler.
pub struct Reconciler;

impl Reconciler {
    /// Spawn the reconciler actor on the current tokio runtime.
    ///
    /// The startup merge runs in the background; await
    /// [`ReconcilerHandle::ready`] before expecting triggers to be accepted.
    pub fn start<L, R>(
        local: L,
        remote: R,
        clock: Arc<dyn Clock>,
        config: ReconcilerConfig,
    ) -> ReconcilerHandle
    where
        L: LocalStore + 'static,
        R: RemoteStore + 'static,
    {
        let (status_tx, status_rx) = watch::channel(Status::initial());
        let (tx, rx) = mpsc::unbounded_channel();

        let actor = Actor {
            local,
            remote,
            clock,
            config,
            status: status_tx,
            phase: Phase::Initializing,
            connection: ConnectionStatus::Connecting,
            last_saved_at: None,
            counters: Counters::ZERO,
            push_deadline: None,
        };
        tokio::spawn(actor.run(rx));

        ReconcilerHandle {
            tx,
            status: status_rx,
        }
    }
}

/// Cloneable handle the UI talks to.
#[derive(Debug, Clone)]
pub struct ReconcilerHandle {
    tx: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<Status>,
}

impl ReconcilerHandle {
    /// Wait until the startup merge has finished.
    pub async fn ready(&self) -> Result<Status> {
        let mut rx = self.status.clone();
        let status = rx
            .wait_for(|s| !matches!(s.phase, Phase::Initializing | Phase::Merging))
            .await
            .map_err(|_| Error::Closed)?;
        Ok(status.clone())
    }

    /// Count a correct answer.
    pub fn on_correct(&self) -> Result<()> {
        self.record(Outcome::Correct)
    }

    /// Count an incorrect answer.
    pub fn on_incorrect(&self) -> Result<()> {
        self.record(Outcome::Incorrect)
    }

    /// Count one answer of the given outcome.
    pub fn record(&self, outcome: Outcome) -> Result<()> {
        self.ensure_accepting()?;
        self.send(Command::Record(outcome))
    }

    /// Replace local state with the remote snapshot.
    pub async fn on_sync_requested(&self) -> Result<OperationReport> {
        self.ensure_accepting()?;
        self.request(Command::Sync).await
    }

    /// Zero both stores. Confirmation is the caller's job.
    pub async fn on_reset_requested(&self) -> Result<OperationReport> {
        self.ensure_accepting()?;
        self.request(Command::Reset).await
    }

    /// Push a pending debounced write now and wait for it.
    pub async fn flush(&self) -> Result<()> {
        self.request(Command::Flush).await
    }

    /// Flush, then stop the actor.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(Command::Shutdown).await
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.status.borrow().clone()
    }

    /// Status updates, starting from the current value.
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status.clone()
    }

    fn ensure_accepting(&self) -> Result<()> {
        let phase = self.status.borrow().phase;
        if phase.is_loading() {
            return Err(Error::NotReady(phase));
        }
        Ok(())
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).map_err(|_| Error::Closed)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.send(make(reply))?;
        response.await.map_err(|_| Error::Closed)
    }
}

struct Actor<L, R> {
    local: L,
    remote: R,
    clock: Arc<dyn Clock>,
    config: ReconcilerConfig,
    status: watch::Sender<Status>,
    phase: Phase,
    connection: ConnectionStatus,
    last_saved_at: Option<Timestamp>,
    counters: Counters,
    push_deadline: Option<Instant>,
}

impl<L: LocalStore, R: RemoteStore> Actor<L, R> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        self.startup().await;

        loop {
            let deadline = self.push_deadline;
            tokio::select! {
                biased;

                command = rx.recv() => match command {
                    Some(command) => {
                        if !self.handle(command).await {
                            break;
                        }
                    }
                    None => {
                        self.flush().await;
                        break;
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.push_deadline = None;
                    self.push().await;
                }
            }
        }

        tracing::debug!("Reconciler stopped");
    }

    /// Process one command; returns `false` once the actor should stop.
    async fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Record(outcome) => self.record(outcome),
            Command::Sync(reply) => {
                let report = self.sync().await;
                let _ = reply.send(report);
            }
            Command::Reset(reply) => {
                let report = self.reset().await;
                let _ = reply.send(report);
            }
            Command::Flush(reply) => {
                self.flush().await;
                let _ = reply.send(());
            }
            Command::Shutdown(reply) => {
                self.flush().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    async fn startup(&mut self) {
        self.phase = Phase::Merging;
        self.connection = ConnectionStatus::Syncing;
        self.publish();

        let local = self.local.load();

        match self.remote.load().await {
            Ok(remote) => {
                let outcome = merge(&local, &remote);
                tracing::info!(
                    resolution = ?outcome.resolution,
                    reason = ?outcome.reason,
                    local_total = local.total(),
                    remote_total = remote.total(),
                    "Merged local and remote snapshots"
                );

                self.counters = outcome.snapshot.counters;
                if outcome.remote_won() {
                    self.local.save(&remote.stamped(self.clock.now()));
                }
                if remote.last_updated.is_some() {
                    self.last_saved_at = remote.last_updated;
                }
                self.connection = ConnectionStatus::Connected;

                if !self.counters.is_zero() && self.counters != remote.counters {
                    self.schedule_push();
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Remote unavailable, using local cache");
                self.counters = local.counters;
                self.connection = ConnectionStatus::Offline(OfflineReason::UsingLocalCache);

                if !self.counters.is_zero() {
                    self.schedule_push();
                }
            }
        }

        self.phase = Phase::Ready;
        self.publish();
    }

    fn record(&mut self, outcome: Outcome) {
        self.counters.record(outcome);
        self.schedule_push();
        self.publish();
    }

    fn schedule_push(&mut self) {
        self.push_deadline = Some(Instant::now() + self.config.debounce);
    }

    async fn flush(&mut self) {
        if self.push_deadline.take().is_some() {
            self.push().await;
        }
    }

    async fn push(&mut self) {
        self.phase = Phase::Saving;
        self.publish();

        let counters = self.counters;
        self.local
            .save(&Snapshot::new(counters, Some(self.clock.now())));

        match self.remote.save(counters).await {
            Ok(true) => {
                tracing::debug!(
                    correct = counters.correct_count,
                    incorrect = counters.incorrect_count,
                    "Pushed snapshot"
                );
                self.connection = ConnectionStatus::Connected;
                self.last_saved_at = Some(self.clock.now());
            }
            Ok(false) => {
                tracing::warn!("Remote did not acknowledge push, kept local copy");
                self.connection = ConnectionStatus::Offline(OfflineReason::SavedLocally);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Push failed, kept local copy");
                self.connection = ConnectionStatus::Offline(OfflineReason::SavedLocally);
            }
        }

        self.phase = Phase::Ready;
        self.publish();
    }

    async fn sync(&mut self) -> OperationReport {
        self.phase = Phase::Syncing;
        self.connection = ConnectionStatus::Syncing;
        self.publish();

        let report = match self.remote.load().await {
            Ok(remote) => {
                tracing::info!(
                    correct = remote.correct_count(),
                    incorrect = remote.incorrect_count(),
                    "Adopted remote snapshot"
                );
                // The adopted snapshot supersedes unpushed increments.
                self.push_deadline = None;
                self.counters = remote.counters;
                self.local.save(&remote.stamped(self.clock.now()));
                if remote.last_updated.is_some() {
                    self.last_saved_at = remote.last_updated;
                }
                self.connection = ConnectionStatus::Connected;
                OperationReport::success("Data synchronized")
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    push_pending = self.push_deadline.is_some(),
                    "Manual sync failed"
                );
                self.connection = ConnectionStatus::SyncError;
                OperationReport::failure(format!("Sync failed: {e}"))
            }
        };

        self.phase = Phase::Ready;
        self.publish();
        report
    }

    async fn reset(&mut self) -> OperationReport {
        self.push_deadline = None;
        self.phase = Phase::Resetting;
        self.connection = ConnectionStatus::Resetting;

        self.counters = Counters::ZERO;
        self.local.reset(self.clock.now());
        self.publish();

        let acknowledged = match self.remote.reset().await {
            Ok(acknowledged) => acknowledged,
            Err(e) => {
                tracing::warn!(error = %e, "Remote reset failed");
                false
            }
        };

        let report = if acknowledged {
            tracing::info!("Counters reset");
            self.connection = ConnectionStatus::Connected;
            self.last_saved_at = Some(self.clock.now());
            OperationReport::success("All counters reset")
        } else {
            self.connection = ConnectionStatus::Offline(OfflineReason::ResetPending);
            OperationReport::failure("Reset locally, cloud error")
        };

        self.phase = Phase::Ready;
        self.publish();
        report
    }

    fn publish(&self) {
        self.status.send_replace(Status {
            phase: self.phase,
            loading: self.phase.is_loading(),
            connection: self.connection,
            last_saved_at: self.last_saved_at,
            correct_count: self.counters.correct_count,
            incorrect_count: self.counters.incorrect_count,
        });
    }
}
