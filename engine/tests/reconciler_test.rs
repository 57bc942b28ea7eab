//! Integration tests for the reconciler actor.
//!
//! Time is paused, so debounce intervals elapse instantly and
//! deterministically whenever every task is idle.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration};
use std::sync::Arc;
use std::time::Duration;
use tally_engine::{
    Clock, ConnectionStatus, Counters, Error, LocalStore, ManualClock, MemoryLocalStore,
    MemoryRemoteStore, OfflineReason, Phase, Reconciler, ReconcilerConfig, ReconcilerHandle,
    RemoteDocument, RemoteStore, Snapshot, Timestamp,
};
use tokio::time::sleep;

const T0: i64 = 1_706_745_600_000;
const T1: i64 = T0 + 60_000;

/// Comfortably longer than the default debounce.
const SETTLE: Duration = Duration::from_millis(2_000);

fn at(millis: i64) -> Timestamp {
    DateTime::from_timestamp_millis(millis).unwrap()
}

struct Fixture {
    clock: ManualClock,
    local: MemoryLocalStore,
    remote: MemoryRemoteStore,
}

impl Fixture {
    fn new() -> Self {
        let clock = ManualClock::at_millis(T1 + 60_000);
        Self {
            local: MemoryLocalStore::new(),
            remote: MemoryRemoteStore::new(Arc::new(clock.clone())),
            clock,
        }
    }

    fn with_local(self, correct: u64, incorrect: u64, millis: i64) -> Self {
        self.local.save(&Snapshot::new(
            Counters::new(correct, incorrect),
            Some(at(millis)),
        ));
        self
    }

    fn with_remote(self, correct: u64, incorrect: u64, millis: i64) -> Self {
        let remote = MemoryRemoteStore::with_document(
            Arc::new(self.clock.clone()),
            RemoteDocument::written(Counters::new(correct, incorrect), false, at(millis)),
        );
        Self { remote, ..self }
    }

    fn start(&self) -> ReconcilerHandle {
        self.start_with(self.remote.clone())
    }

    fn start_with<R: RemoteStore + 'static>(&self, remote: R) -> ReconcilerHandle {
        Reconciler::start(
            self.local.clone(),
            remote,
            Arc::new(self.clock.clone()),
            ReconcilerConfig::default(),
        )
    }
}

/// Remote store that takes a while to answer.
struct SlowRemote {
    inner: MemoryRemoteStore,
    delay: Duration,
}

#[async_trait]
impl RemoteStore for SlowRemote {
    async fn load(&self) -> tally_engine::Result<Snapshot> {
        sleep(self.delay).await;
        self.inner.load().await
    }

    async fn save(&self, counters: Counters) -> tally_engine::Result<bool> {
        sleep(self.delay).await;
        self.inner.save(counters).await
    }

    async fn reset(&self) -> tally_engine::Result<bool> {
        sleep(self.delay).await;
        self.inner.reset().await
    }
}

// ============================================================================
// Startup merge
// ============================================================================

#[tokio::test(start_paused = true)]
async fn empty_stores_start_at_zero() {
    let fx = Fixture::new();
    let handle = fx.start();

    let status = handle.ready().await.unwrap();

    assert_eq!(status.phase, Phase::Ready);
    assert!(!status.loading);
    assert_eq!(status.connection, ConnectionStatus::Connected);
    assert_eq!(status.counters(), Counters::ZERO);
    assert_eq!(status.last_saved_at, None);
}

#[tokio::test(start_paused = true)]
async fn merge_picks_remote_with_more_progress() {
    let fx = Fixture::new().with_local(3, 2, T1).with_remote(5, 1, T0);
    let handle = fx.start();

    let status = handle.ready().await.unwrap();

    assert_eq!(status.counters(), Counters::new(5, 1));
    assert_eq!(status.connection, ConnectionStatus::Connected);
    assert_eq!(status.last_saved_at, Some(at(T0)));

    let stored = fx.local.stored().unwrap();
    assert_eq!(stored.counters, Counters::new(5, 1));
    assert_eq!(stored.last_updated, Some(fx.clock.now()));
}

#[tokio::test(start_paused = true)]
async fn merge_keeps_local_when_remote_is_behind() {
    let fx = Fixture::new().with_local(5, 1, T1).with_remote(3, 2, T0);
    let handle = fx.start();

    let status = handle.ready().await.unwrap();

    assert_eq!(status.counters(), Counters::new(5, 1));
    assert_eq!(
        fx.local.stored().unwrap(),
        Snapshot::new(Counters::new(5, 1), Some(at(T1)))
    );
}

#[tokio::test(start_paused = true)]
async fn merge_picks_newer_remote_on_equal_totals() {
    let fx = Fixture::new().with_local(3, 2, T0).with_remote(4, 1, T1);
    let handle = fx.start();

    let status = handle.ready().await.unwrap();

    assert_eq!(status.counters(), Counters::new(4, 1));
    assert_eq!(fx.local.load().counters, Counters::new(4, 1));
}

#[tokio::test(start_paused = true)]
async fn merge_falls_back_to_local_when_remote_unreachable() {
    let fx = Fixture::new().with_local(3, 2, T0).with_remote(50, 50, T1);
    fx.remote.set_available(false);
    let handle = fx.start();

    let status = handle.ready().await.unwrap();

    assert_eq!(status.counters(), Counters::new(3, 2));
    assert_eq!(
        status.connection,
        ConnectionStatus::Offline(OfflineReason::UsingLocalCache)
    );
    assert!(status.connection.is_offline());
    assert_eq!(status.phase, Phase::Ready);
}

#[tokio::test(start_paused = true)]
async fn local_winner_is_pushed_to_remote() {
    let fx = Fixture::new().with_local(5, 1, T1).with_remote(3, 2, T0);
    let handle = fx.start();
    handle.ready().await.unwrap();

    sleep(SETTLE).await;

    assert_eq!(fx.remote.saved_counters(), vec![Counters::new(5, 1)]);
    let doc = fx.remote.document().await.unwrap();
    assert_eq!(doc.counters(), Counters::new(5, 1));
}

#[tokio::test(start_paused = true)]
async fn remote_winner_is_not_pushed_back() {
    let fx = Fixture::new().with_local(1, 0, T0).with_remote(5, 1, T1);
    let handle = fx.start();
    handle.ready().await.unwrap();

    sleep(SETTLE).await;

    assert_eq!(fx.remote.save_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn offline_start_retries_push_after_debounce() {
    let fx = Fixture::new().with_local(2, 1, T0);
    fx.remote.set_available(false);
    let handle = fx.start();
    handle.ready().await.unwrap();

    fx.remote.set_available(true);
    sleep(SETTLE).await;

    let status = handle.status();
    assert_eq!(status.connection, ConnectionStatus::Connected);
    assert_eq!(
        fx.remote.document().await.unwrap().counters(),
        Counters::new(2, 1)
    );
}

// ============================================================================
// Increments and debounced push
// ============================================================================

#[tokio::test(start_paused = true)]
async fn increments_accumulate() {
    let fx = Fixture::new();
    let handle = fx.start();
    handle.ready().await.unwrap();

    for _ in 0..4 {
        handle.on_correct().unwrap();
    }
    for _ in 0..3 {
        handle.on_incorrect().unwrap();
    }
    handle.flush().await.unwrap();

    let status = handle.status();
    assert_eq!(status.counters(), Counters::new(4, 3));
    assert_eq!(status.total(), 7);
    assert_eq!(fx.local.load().counters, Counters::new(4, 3));
    assert_eq!(
        fx.remote.document().await.unwrap().counters(),
        Counters::new(4, 3)
    );
}

#[tokio::test(start_paused = true)]
async fn burst_produces_one_push_with_final_state() {
    let fx = Fixture::new();
    let handle = fx.start();
    handle.ready().await.unwrap();

    for i in 0..5 {
        if i % 2 == 0 {
            handle.on_correct().unwrap();
        } else {
            handle.on_incorrect().unwrap();
        }
        sleep(Duration::from_millis(400)).await;
    }
    assert_eq!(fx.remote.save_calls(), 0);

    sleep(SETTLE).await;

    assert_eq!(fx.remote.save_calls(), 1);
    assert_eq!(fx.remote.saved_counters(), vec![Counters::new(3, 2)]);
}

#[tokio::test(start_paused = true)]
async fn push_waits_for_quiet_period() {
    let fx = Fixture::new();
    let handle = fx.start();
    handle.ready().await.unwrap();

    handle.on_correct().unwrap();
    sleep(Duration::from_millis(1_000)).await;
    assert_eq!(fx.remote.save_calls(), 0);
    assert!(fx.local.stored().is_none());

    sleep(Duration::from_millis(1_000)).await;
    assert_eq!(fx.remote.save_calls(), 1);

    let status = handle.status();
    assert_eq!(status.connection, ConnectionStatus::Connected);
    assert_eq!(status.last_saved_at, Some(fx.clock.now()));
}

#[tokio::test(start_paused = true)]
async fn separate_bursts_push_separately() {
    let fx = Fixture::new();
    let handle = fx.start();
    handle.ready().await.unwrap();

    handle.on_correct().unwrap();
    handle.on_correct().unwrap();
    sleep(SETTLE).await;
    handle.on_incorrect().unwrap();
    sleep(SETTLE).await;

    assert_eq!(
        fx.remote.saved_counters(),
        vec![Counters::new(2, 0), Counters::new(2, 1)]
    );
}

#[tokio::test(start_paused = true)]
async fn custom_debounce_interval() {
    let fx = Fixture::new();
    let handle = Reconciler::start(
        fx.local.clone(),
        fx.remote.clone(),
        Arc::new(fx.clock.clone()),
        ReconcilerConfig::default().with_debounce(Duration::from_millis(100)),
    );
    handle.ready().await.unwrap();

    handle.on_correct().unwrap();
    sleep(Duration::from_millis(150)).await;

    assert_eq!(fx.remote.save_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_push_keeps_local_copy() {
    let fx = Fixture::new();
    let handle = fx.start();
    handle.ready().await.unwrap();

    fx.remote.set_available(false);
    handle.on_correct().unwrap();
    sleep(SETTLE).await;

    let status = handle.status();
    assert_eq!(
        status.connection,
        ConnectionStatus::Offline(OfflineReason::SavedLocally)
    );
    assert_eq!(status.phase, Phase::Ready);
    assert_eq!(fx.local.load().counters, Counters::new(1, 0));

    fx.remote.set_available(true);
    handle.on_correct().unwrap();
    sleep(SETTLE).await;

    assert_eq!(handle.status().connection, ConnectionStatus::Connected);
    assert_eq!(
        fx.remote.document().await.unwrap().counters(),
        Counters::new(2, 0)
    );
}

#[tokio::test(start_paused = true)]
async fn unacknowledged_push_reports_offline() {
    let fx = Fixture::new();
    let handle = fx.start();
    handle.ready().await.unwrap();

    fx.remote.set_acknowledge(false);
    handle.on_incorrect().unwrap();
    sleep(SETTLE).await;

    assert_eq!(
        handle.status().connection,
        ConnectionStatus::Offline(OfflineReason::SavedLocally)
    );
    assert_eq!(handle.status().last_saved_at, None);
}

#[tokio::test(start_paused = true)]
async fn increments_during_save_queue_behind_it() {
    let fx = Fixture::new();
    let slow = SlowRemote {
        inner: fx.remote.clone(),
        delay: Duration::from_millis(500),
    };
    let handle = fx.start_with(slow);
    handle.ready().await.unwrap();

    handle.on_correct().unwrap();
    handle
        .subscribe()
        .wait_for(|s| s.phase == Phase::Saving)
        .await
        .unwrap();

    handle.on_correct().unwrap();
    sleep(Duration::from_millis(3_000)).await;

    assert_eq!(
        fx.remote.saved_counters(),
        vec![Counters::new(1, 0), Counters::new(2, 0)]
    );
    assert_eq!(handle.status().counters(), Counters::new(2, 0));
}

// ============================================================================
// Manual sync
// ============================================================================

#[tokio::test(start_paused = true)]
async fn sync_adopts_lower_remote_unconditionally() {
    let fx = Fixture::new().with_local(9, 1, T1).with_remote(2, 2, T0);
    let handle = fx.start();
    handle.ready().await.unwrap();
    assert_eq!(handle.status().counters(), Counters::new(9, 1));

    fx.remote
        .put_document(RemoteDocument::written(Counters::new(1, 1), false, at(T0)))
        .await;

    let report = handle.on_sync_requested().await.unwrap();

    assert!(report.ok);
    let status = handle.status();
    assert_eq!(status.counters(), Counters::new(1, 1));
    assert_eq!(status.connection, ConnectionStatus::Connected);
    assert_eq!(status.last_saved_at, Some(at(T0)));
    assert_eq!(fx.local.load().counters, Counters::new(1, 1));
}

#[tokio::test(start_paused = true)]
async fn sync_cancels_pending_push() {
    let fx = Fixture::new().with_remote(4, 4, T0);
    let handle = fx.start();
    handle.ready().await.unwrap();

    handle.on_correct().unwrap();
    let report = handle.on_sync_requested().await.unwrap();
    assert!(report.ok);

    sleep(SETTLE).await;

    assert_eq!(fx.remote.save_calls(), 0);
    assert_eq!(handle.status().counters(), Counters::new(4, 4));
}

#[tokio::test(start_paused = true)]
async fn sync_failure_is_reported() {
    let fx = Fixture::new().with_local(3, 1, T0);
    let handle = fx.start();
    handle.ready().await.unwrap();

    fx.remote.set_available(false);
    let report = handle.on_sync_requested().await.unwrap();

    assert!(!report.ok);
    assert!(report.message.starts_with("Sync failed"));
    let status = handle.status();
    assert_eq!(status.connection, ConnectionStatus::SyncError);
    assert_eq!(status.counters(), Counters::new(3, 1));
    assert_eq!(status.phase, Phase::Ready);
}

#[tokio::test(start_paused = true)]
async fn failed_sync_keeps_pending_push() {
    let fx = Fixture::new();
    let handle = fx.start();
    handle.ready().await.unwrap();

    handle.on_correct().unwrap();
    fx.remote.set_available(false);
    let report = handle.on_sync_requested().await.unwrap();
    assert!(!report.ok);

    fx.remote.set_available(true);
    sleep(SETTLE).await;

    assert_eq!(fx.remote.saved_counters(), vec![Counters::new(1, 0)]);
    assert_eq!(fx.local.load().counters, Counters::new(1, 0));
    assert_eq!(handle.status().connection, ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn shutdown_after_failed_sync_flushes() {
    let fx = Fixture::new();
    let handle = fx.start();
    handle.ready().await.unwrap();

    handle.on_incorrect().unwrap();
    fx.remote.set_available(false);
    assert!(!handle.on_sync_requested().await.unwrap().ok);
    fx.remote.set_available(true);

    handle.shutdown().await.unwrap();

    assert_eq!(fx.remote.saved_counters(), vec![Counters::new(0, 1)]);
    assert_eq!(
        fx.remote.document().await.unwrap().counters(),
        Counters::new(0, 1)
    );
    assert_eq!(fx.local.load().counters, Counters::new(0, 1));
}

// ============================================================================
// Reset
// ============================================================================

#[tokio::test(start_paused = true)]
async fn reset_zeroes_both_stores() {
    let fx = Fixture::new().with_local(6, 2, T0);
    let handle = fx.start();
    handle.ready().await.unwrap();
    fx.clock.advance(ChronoDuration::seconds(30));

    let report = handle.on_reset_requested().await.unwrap();

    assert!(report.ok);
    let status = handle.status();
    assert_eq!(status.counters(), Counters::ZERO);
    assert_eq!(status.connection, ConnectionStatus::Connected);
    assert_eq!(fx.local.load(), Snapshot::zeroed(fx.clock.now()));

    let doc = fx.remote.document().await.unwrap();
    assert!(doc.is_reset());
    assert_eq!(doc.counters(), Counters::ZERO);
}

#[tokio::test(start_paused = true)]
async fn reset_is_idempotent() {
    let fx = Fixture::new().with_local(6, 2, T0);
    let handle = fx.start();
    handle.ready().await.unwrap();

    let first = handle.on_reset_requested().await.unwrap();
    let after_first = (handle.status().counters(), fx.local.load());
    let second = handle.on_reset_requested().await.unwrap();
    let after_second = (handle.status().counters(), fx.local.load());

    assert_eq!(first, second);
    assert_eq!(after_first, after_second);
    assert_eq!(after_second.0, Counters::ZERO);
}

#[tokio::test(start_paused = true)]
async fn reset_with_remote_failure_is_partial() {
    let fx = Fixture::new().with_local(6, 2, T0);
    let handle = fx.start();
    handle.ready().await.unwrap();

    fx.remote.set_available(false);
    let report = handle.on_reset_requested().await.unwrap();

    assert!(!report.ok);
    assert_eq!(report.message, "Reset locally, cloud error");
    assert_eq!(handle.status().counters(), Counters::ZERO);
    assert_eq!(
        handle.status().connection,
        ConnectionStatus::Offline(OfflineReason::ResetPending)
    );
    assert_eq!(fx.local.load().counters, Counters::ZERO);
}

#[tokio::test(start_paused = true)]
async fn reset_cancels_pending_push() {
    let fx = Fixture::new();
    let handle = fx.start();
    handle.ready().await.unwrap();

    handle.on_correct().unwrap();
    handle.on_reset_requested().await.unwrap();
    sleep(SETTLE).await;

    assert_eq!(fx.remote.save_calls(), 0);
    assert_eq!(fx.remote.reset_calls(), 1);
}

// ============================================================================
// Phase gating and shutdown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn triggers_rejected_while_loading() {
    let fx = Fixture::new();
    let slow = SlowRemote {
        inner: fx.remote.clone(),
        delay: Duration::from_millis(500),
    };
    let handle = fx.start_with(slow);

    assert_eq!(
        handle.on_correct(),
        Err(Error::NotReady(Phase::Initializing))
    );

    handle
        .subscribe()
        .wait_for(|s| s.phase == Phase::Merging)
        .await
        .unwrap();
    assert_eq!(handle.status().connection, ConnectionStatus::Syncing);
    assert!(handle.status().loading);
    assert_eq!(handle.on_incorrect(), Err(Error::NotReady(Phase::Merging)));

    handle.ready().await.unwrap();

    let syncing = handle.clone();
    let sync = tokio::spawn(async move { syncing.on_sync_requested().await });
    handle
        .subscribe()
        .wait_for(|s| s.phase == Phase::Syncing)
        .await
        .unwrap();

    assert_eq!(handle.on_correct(), Err(Error::NotReady(Phase::Syncing)));
    assert!(matches!(
        handle.on_reset_requested().await,
        Err(Error::NotReady(Phase::Syncing))
    ));

    assert!(sync.await.unwrap().unwrap().ok);
    assert!(handle.on_correct().is_ok());
}

#[tokio::test(start_paused = true)]
async fn shutdown_flushes_pending_push() {
    let fx = Fixture::new();
    let handle = fx.start();
    handle.ready().await.unwrap();

    handle.on_correct().unwrap();
    handle.shutdown().await.unwrap();

    assert_eq!(fx.remote.saved_counters(), vec![Counters::new(1, 0)]);
    assert_eq!(handle.on_correct(), Err(Error::Closed));
}

#[tokio::test(start_paused = true)]
async fn flush_without_pending_push_is_noop() {
    let fx = Fixture::new();
    let handle = fx.start();
    handle.ready().await.unwrap();

    handle.flush().await.unwrap();

    assert_eq!(fx.remote.save_calls(), 0);
}

// ============================================================================
// Properties
// ============================================================================

mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_increments_count_exactly(sequence in proptest::collection::vec(any::<bool>(), 0..40)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .start_paused(true)
                .build()
                .unwrap();

            let (counters, stored) = runtime.block_on(async {
                let fx = Fixture::new();
                let handle = fx.start();
                handle.ready().await.unwrap();

                for (i, correct) in sequence.iter().enumerate() {
                    if *correct {
                        handle.on_correct().unwrap();
                    } else {
                        handle.on_incorrect().unwrap();
                    }
                    if i % 7 == 0 {
                        sleep(Duration::from_millis(900)).await;
                    }
                }
                handle.flush().await.unwrap();
                (handle.status().counters(), fx.local.load().counters)
            });

            let a = sequence.iter().filter(|c| **c).count() as u64;
            let b = sequence.len() as u64 - a;
            prop_assert_eq!(counters, Counters::new(a, b));
            if !sequence.is_empty() {
                prop_assert_eq!(stored, Counters::new(a, b));
            }
        }
    }
}
