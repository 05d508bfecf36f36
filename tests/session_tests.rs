mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{pump_until, samples, steady, test_config, FakeSource, Reply};
use streamwatch::kernel::connection::ConnectionRequest;
use streamwatch::kernel::event::{Epoch, Event, HistoryOutcome};
use streamwatch::{ConnectionState, QualityTier, TelemetryController};

const WAIT: Duration = Duration::from_secs(5);

fn controller(source: FakeSource) -> TelemetryController {
    TelemetryController::new(test_config(), Arc::new(source))
}

fn connect(controller: &mut TelemetryController) {
    for request in [ConnectionRequest::ConnectRequested, ConnectionRequest::Opened] {
        let epoch = controller.epoch().unwrap();
        controller.apply(Event::Connection { epoch, request });
    }
}

fn push(controller: &mut TelemetryController, bitrate: f64) {
    let epoch = controller.epoch().unwrap();
    let sample = steady(bitrate, 1).remove(0);
    controller.apply(Event::Push { epoch, sample });
}

#[tokio::test]
async fn test_initial_snapshot_is_empty() {
    let controller = controller(FakeSource::new());
    let snap = controller.snapshot();
    assert_eq!(snap.tier, QualityTier::Unknown);
    assert_eq!(snap.connection_state, ConnectionState::Disconnected);
    assert_eq!(snap.sample_count, 0);
    assert!(!snap.is_loading);
    assert!(controller.session().is_none());
}

#[tokio::test]
async fn test_history_seeds_buffer() {
    let source = FakeSource::new().with_history(Reply::Samples(steady(4500.0, 20)));
    let mut controller = controller(source);

    controller.start("alice");
    assert!(controller.snapshot().is_loading, "loading until the seed lands");

    assert!(pump_until(&mut controller, WAIT, |s| !s.is_loading).await);
    let snap = controller.snapshot();
    assert_eq!(snap.sample_count, 20);
    assert_eq!(snap.tier, QualityTier::Good);
}

#[tokio::test]
async fn test_empty_history_falls_back_to_current_value() {
    let source = FakeSource::new()
        .with_history(Reply::Samples(Vec::new()))
        .with_current(Some(2750.0));
    let mut controller = controller(source);

    controller.start("alice");
    assert!(pump_until(&mut controller, WAIT, |s| !s.is_loading).await);

    let snap = controller.snapshot();
    assert_eq!(snap.sample_count, 1);
    assert_eq!(snap.tier, QualityTier::Unknown, "one sample is not enough to classify");
    assert_eq!(controller.state().samples()[0].bitrate(), 2750.0);
}

#[tokio::test]
async fn test_failed_history_leaves_buffer_empty() {
    let source = FakeSource::new().with_history(Reply::Fail);
    let mut controller = controller(source);

    controller.start("alice");
    assert!(pump_until(&mut controller, WAIT, |s| !s.is_loading).await);

    let snap = controller.snapshot();
    assert_eq!(snap.sample_count, 0);
    assert_eq!(snap.tier, QualityTier::Unknown);
}

#[tokio::test]
async fn test_empty_history_and_failed_current_is_not_fatal() {
    let source = FakeSource::new().with_history(Reply::Samples(Vec::new()));
    let mut controller = controller(source);

    controller.start("alice");
    assert!(pump_until(&mut controller, WAIT, |s| !s.is_loading).await);
    assert_eq!(controller.snapshot().sample_count, 0);
}

#[tokio::test]
async fn test_push_appends_and_reclassifies() {
    let mut controller = controller(FakeSource::new());
    controller.start("alice");
    connect(&mut controller);
    assert_eq!(controller.snapshot().connection_state, ConnectionState::Connected);

    push(&mut controller, 3500.0);
    push(&mut controller, 3600.0);
    assert_eq!(controller.snapshot().tier, QualityTier::Unknown);

    push(&mut controller, 3550.0);
    let snap = controller.snapshot();
    assert_eq!(snap.sample_count, 3);
    assert_eq!(snap.tier, QualityTier::Good);
    assert!(!snap.is_loading);
}

#[tokio::test]
async fn test_push_window_stays_bounded() {
    let mut controller = controller(FakeSource::new());
    controller.start("alice");
    for _ in 0..100 {
        push(&mut controller, 4000.0);
        assert!(controller.snapshot().sample_count <= 60);
    }
    assert_eq!(controller.snapshot().sample_count, 60);
}

#[tokio::test]
async fn test_empty_poll_clears_window_but_keeps_connection() {
    let mut controller = controller(FakeSource::new());
    controller.start("alice");
    connect(&mut controller);
    let epoch = controller.epoch().unwrap();
    controller.apply(Event::Poll { epoch, samples: steady(5000.0, 30) });
    assert_eq!(controller.snapshot().tier, QualityTier::Good);

    let epoch = controller.epoch().unwrap();
    controller.apply(Event::Poll { epoch, samples: Vec::new() });

    let snap = controller.snapshot();
    assert_eq!(snap.sample_count, 0);
    assert_eq!(snap.tier, QualityTier::Unknown);
    assert_eq!(snap.connection_state, ConnectionState::Connected);
}

#[tokio::test]
async fn test_poll_replaces_wholesale() {
    let mut controller = controller(FakeSource::new());
    controller.start("alice");
    for _ in 0..10 {
        push(&mut controller, 900.0);
    }
    assert_eq!(controller.snapshot().tier, QualityTier::Poor);

    let epoch = controller.epoch().unwrap();
    controller.apply(Event::Poll { epoch, samples: steady(4200.0, 5) });

    let snap = controller.snapshot();
    assert_eq!(snap.sample_count, 5, "poll must not merge with pushed samples");
    assert_eq!(snap.tier, QualityTier::Good);
}

#[tokio::test]
async fn test_stale_poll_loses_to_newer_push() {
    let mut controller = controller(FakeSource::new());
    controller.start("alice");

    // Poll issued first, push arrives while it is in flight
    let poll_epoch = controller.epoch().unwrap();
    push(&mut controller, 3000.0);

    controller.apply(Event::Poll {
        epoch: poll_epoch,
        samples: steady(1000.0, 40),
    });

    let snap = controller.snapshot();
    assert_eq!(snap.sample_count, 1, "older poll result must not overwrite newer push");
}

#[tokio::test]
async fn test_stale_history_seed_is_discarded_but_loading_ends() {
    let mut controller = controller(FakeSource::new());
    controller.start("alice");
    let seed_epoch = controller.epoch().unwrap();
    push(&mut controller, 2000.0);

    controller.apply(Event::History {
        epoch: seed_epoch,
        outcome: HistoryOutcome::Seeded(steady(5000.0, 10)),
    });

    let snap = controller.snapshot();
    assert_eq!(snap.sample_count, 1);
    assert!(!snap.is_loading);
}

#[tokio::test]
async fn test_restart_resets_before_new_data() {
    let mut controller = controller(FakeSource::new());
    controller.start("alice");
    connect(&mut controller);
    let epoch = controller.epoch().unwrap();
    controller.apply(Event::Poll { epoch, samples: steady(5000.0, 30) });
    assert_eq!(controller.snapshot().tier, QualityTier::Good);

    controller.stop();
    controller.start("bob");

    let snap = controller.snapshot();
    assert_eq!(snap.sample_count, 0);
    assert_eq!(snap.connection_state, ConnectionState::Disconnected);
    assert_eq!(snap.tier, QualityTier::Unknown);
    assert_eq!(controller.username(), Some("bob"));
}

#[tokio::test]
async fn test_start_without_stop_tears_down_prior_session() {
    let mut controller = controller(FakeSource::new());
    controller.start("alice");
    let first = controller.session().unwrap();
    push(&mut controller, 3000.0);

    controller.start("bob");
    assert_ne!(controller.session().unwrap(), first);
    assert_eq!(controller.snapshot().sample_count, 0);
}

#[tokio::test]
async fn test_late_result_from_ended_session_is_ignored() {
    let mut controller = controller(FakeSource::new());
    controller.start("alice");
    let alice: Epoch = controller.epoch().unwrap();

    controller.stop();
    controller.start("bob");
    let before = controller.snapshot();

    controller.apply(Event::Poll { epoch: alice, samples: steady(5000.0, 30) });
    controller.apply(Event::History {
        epoch: alice,
        outcome: HistoryOutcome::Seeded(steady(5000.0, 30)),
    });
    controller.apply(Event::Push {
        epoch: alice,
        sample: samples(&[4000.0]).remove(0),
    });
    controller.apply(Event::Connection {
        epoch: alice,
        request: ConnectionRequest::ConnectRequested,
    });

    assert_eq!(controller.snapshot(), before);
}

#[tokio::test]
async fn test_events_after_stop_are_ignored() {
    let mut controller = controller(FakeSource::new());
    controller.start("alice");
    let epoch = controller.epoch().unwrap();
    controller.stop();

    controller.apply(Event::Push {
        epoch,
        sample: samples(&[4000.0]).remove(0),
    });
    assert_eq!(controller.snapshot().sample_count, 0);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let mut controller = controller(FakeSource::new());
    controller.stop();
    controller.start("alice");
    controller.stop();
    controller.stop();

    let snap = controller.snapshot();
    assert_eq!(snap.connection_state, ConnectionState::Disconnected);
    assert!(!snap.is_loading);
    assert!(controller.session().is_none());
}

#[tokio::test]
async fn test_unreachable_channel_degrades_to_disconnected() {
    let mut controller = controller(FakeSource::new());
    controller.start("alice");

    // Connecting first, then Disconnected once the single attempt fails
    assert!(pump_until(&mut controller, WAIT, |s| s.connection_state == ConnectionState::Connecting).await);
    assert!(pump_until(&mut controller, WAIT, |s| s.connection_state == ConnectionState::Disconnected).await);
}

#[tokio::test]
async fn test_handle_drives_controller() {
    let source = FakeSource::new().with_history(Reply::Samples(steady(1800.0, 12)));
    let (handle, driver) = controller(source).spawn();
    let mut snapshots = handle.subscribe();

    assert!(handle.start("alice").await);
    let seeded = tokio::time::timeout(WAIT, async {
        loop {
            snapshots.changed().await.unwrap();
            let snap = *snapshots.borrow_and_update();
            if snap.sample_count == 12 {
                return snap;
            }
        }
    })
    .await
    .expect("seed should arrive");
    assert_eq!(seeded.tier, QualityTier::Intermittent);

    assert!(handle.stop().await);
    assert!(handle.shutdown().await);
    tokio::time::timeout(WAIT, driver).await.unwrap().unwrap();
    assert_eq!(handle.snapshot().sample_count, 0);
}

#[tokio::test]
async fn test_drain_applies_queued_events() {
    let source = FakeSource::new().with_history(Reply::Samples(steady(3200.0, 8)));
    let mut controller = controller(source);
    controller.start("alice");

    let applied = tokio::time::timeout(WAIT, async {
        let mut applied = 0;
        while controller.state().is_loading() {
            applied += controller.drain();
            tokio::task::yield_now().await;
        }
        applied
    })
    .await
    .expect("history outcome never arrived");
    assert!(applied > 0);

    let state = controller.state();
    assert_eq!(state.sample_count(), 8);
    assert_eq!(state.tier(), QualityTier::Good);
    assert!(!state.is_loading());
    assert_eq!(state.stats().unwrap().average, 3200.0);
}

#[tokio::test]
async fn test_state_view_matches_published_snapshot() {
    let source = FakeSource::new().with_history(Reply::Samples(steady(3300.0, 12)));
    let mut controller = controller(source);
    let published = controller.subscribe();

    controller.start("alice");
    assert!(pump_until(&mut controller, WAIT, |s| !s.is_loading).await);

    assert_eq!(controller.state().snapshot(), controller.snapshot());
    assert_eq!(*published.borrow(), controller.snapshot());
    assert_eq!(controller.state().sample_count(), 12);
}
