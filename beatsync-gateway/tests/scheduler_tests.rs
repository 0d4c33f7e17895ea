//! Scheduler integration tests
//!
//! Drives the scheduler against a scripted player on a paused tokio clock, so
//! trigger timing is deterministic.

mod helpers;

use std::time::Duration;

use beatsync_common::events::SyncEvent;
use beatsync_common::Granularity;
use beatsync_gateway::sync::{ResyncDecision, SessionOutcome, TickOutcome, TickReport};
use helpers::{events, steady_events, Harness, ScriptedPlayer};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

fn report(outcome: TickOutcome) -> TickReport {
    match outcome {
        TickOutcome::Evaluated(report) => report,
        other => panic!("expected an evaluated tick, got {:?}", other),
    }
}

async fn playing_harness(media_id: &str) -> Harness {
    let player = ScriptedPlayer::new();
    player.with_timeline(media_id, Granularity::Beat, steady_events(400, 500));
    player.play(media_id, Duration::ZERO);
    Harness::new(player).await
}

#[tokio::test(start_paused = true)]
async fn test_two_events_fire_then_session_stays_quiet() {
    let player = ScriptedPlayer::new();
    player.with_timeline("X", Granularity::Beat, events(&[(500, 1000), (1500, 1000)]));
    player.play("X", Duration::ZERO);
    let mut h = Harness::new(player).await;

    // Nothing was running, so the new media only needs a start
    let first = report(h.scheduler.tick().await);
    assert_eq!(
        first.decision,
        ResyncDecision {
            must_stop: false,
            must_start: true
        }
    );
    assert_eq!(first.started, Some(1));
    assert_eq!(first.stopped, None);

    sleep(Duration::from_secs(2)).await;
    assert_eq!(h.published(), 2);

    // Session ran out of events but stays recorded until a change
    assert!(h.scheduler.is_detecting());
    let second = report(h.scheduler.tick().await);
    assert_eq!(second.decision, ResyncDecision::NONE);
    assert_eq!(h.player.timeline_fetches().len(), 1);

    sleep(Duration::from_secs(4)).await;
    assert_eq!(h.published(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_steady_playback_is_idempotent() {
    let mut h = playing_harness("X").await;

    assert_eq!(report(h.scheduler.tick().await).started, Some(1));
    for _ in 0..5 {
        sleep(Duration::from_secs(2)).await;
        let r = report(h.scheduler.tick().await);
        assert_eq!(r.decision, ResyncDecision::NONE);
        assert_eq!(r.stopped, None);
        assert_eq!(r.started, None);
    }

    assert_eq!(h.player.timeline_fetches().len(), 1);
    assert_eq!(h.scheduler.active_generation(), Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_failed_poll_skips_tick() {
    let mut h = playing_harness("X").await;
    h.player.fail_next_polls(1);

    assert_eq!(h.scheduler.tick().await, TickOutcome::PollFailed);
    assert_eq!(h.state.polls_failed(), 1);
    assert!(h.scheduler.last_snapshot().is_none());
    assert!(h.player.timeline_fetches().is_empty());

    assert_eq!(report(h.scheduler.tick().await).started, Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_failed_poll_leaves_live_session_running() {
    let mut h = playing_harness("X").await;
    report(h.scheduler.tick().await);

    sleep(Duration::from_millis(1900)).await;
    h.player.fail_next_polls(1);
    assert_eq!(h.scheduler.tick().await, TickOutcome::PollFailed);
    assert!(h.scheduler.is_detecting());

    let before = h.published();
    sleep(Duration::from_secs(1)).await;
    assert!(h.published() > before);
}

#[tokio::test(start_paused = true)]
async fn test_no_media_skips_tick() {
    let player = ScriptedPlayer::new();
    let mut h = Harness::new(player).await;

    assert_eq!(h.scheduler.tick().await, TickOutcome::NoActiveMedia);
    assert!(!h.scheduler.is_detecting());
    assert!(h.scheduler.last_snapshot().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_player_going_idle_keeps_session() {
    let mut h = playing_harness("X").await;
    report(h.scheduler.tick().await);

    h.player.stop();
    sleep(Duration::from_secs(2)).await;
    assert_eq!(h.scheduler.tick().await, TickOutcome::NoActiveMedia);
    assert_eq!(h.scheduler.active_generation(), Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_timeline_failure_is_retried_next_tick() {
    let mut h = playing_harness("X").await;
    h.player.fail_next_timelines(1);

    let first = report(h.scheduler.tick().await);
    assert!(first.decision.must_start);
    assert!(first.start_abandoned);
    assert_eq!(first.started, None);
    assert!(!h.scheduler.is_detecting());

    // Same media still playing, nothing running: start without a stop
    sleep(Duration::from_secs(2)).await;
    let second = report(h.scheduler.tick().await);
    assert_eq!(
        second.decision,
        ResyncDecision {
            must_stop: false,
            must_start: true
        }
    );
    assert_eq!(second.started, Some(1));
    assert_eq!(h.player.timeline_fetches().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_seek_restarts_from_new_position() {
    let mut h = playing_harness("X").await;
    report(h.scheduler.tick().await);

    sleep(Duration::from_millis(1750)).await;
    assert_eq!(h.published(), 3);

    h.player.seek(Duration::from_secs(60));
    let r = report(h.scheduler.tick().await);
    assert!(r.decision.is_restart());
    assert_eq!(r.stopped, Some(SessionOutcome::Cancelled { fired: 3 }));
    assert_eq!(r.started, Some(2));
    assert_eq!(h.dispatcher.live_generation(), Some(2));

    // Next event after 60s is 500ms away
    sleep(Duration::from_millis(499)).await;
    assert_eq!(h.published(), 3);
    sleep(Duration::from_millis(2)).await;
    assert_eq!(h.published(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_media_change_replaces_session() {
    let player = ScriptedPlayer::new();
    player.with_timeline("X", Granularity::Beat, steady_events(400, 500));
    player.with_timeline("Y", Granularity::Beat, steady_events(400, 400));
    player.play("X", Duration::ZERO);
    let mut h = Harness::new(player).await;
    report(h.scheduler.tick().await);

    sleep(Duration::from_millis(1900)).await;
    h.player.play("Y", Duration::ZERO);
    let r = report(h.scheduler.tick().await);

    assert!(r.decision.is_restart());
    assert!(matches!(r.stopped, Some(SessionOutcome::Cancelled { .. })));
    assert_eq!(r.started, Some(2));
    assert_eq!(h.player.timeline_fetches().last(), Some(&("Y".to_string(), Granularity::Beat)));

    let status = h.state.status().await;
    assert_eq!(status.media_id.as_deref(), Some("Y"));
    assert_eq!(status.session_generation, Some(2));
}

#[tokio::test(start_paused = true)]
async fn test_pause_stops_and_resume_restarts() {
    let mut h = playing_harness("X").await;
    report(h.scheduler.tick().await);

    sleep(Duration::from_millis(1000)).await;
    h.player.pause();
    let paused = report(h.scheduler.tick().await);
    assert_eq!(
        paused.decision,
        ResyncDecision {
            must_stop: true,
            must_start: false
        }
    );
    assert!(!h.scheduler.is_detecting());
    assert_eq!(h.dispatcher.live_generation(), None);

    let published = h.published();
    sleep(Duration::from_secs(2)).await;
    assert_eq!(h.scheduler.tick().await, TickOutcome::Evaluated(TickReport::default()));
    assert_eq!(h.published(), published);

    h.player.resume();
    let resumed = report(h.scheduler.tick().await);
    assert_eq!(resumed.started, Some(2));
    assert_eq!(resumed.stopped, None);

    // Paused at 1000ms, so the next beat is at 1500ms
    sleep(Duration::from_millis(501)).await;
    assert_eq!(h.published(), published + 1);
}

#[tokio::test(start_paused = true)]
async fn test_granularity_switch_restarts_at_new_granularity() {
    let player = ScriptedPlayer::new();
    player.with_timeline("X", Granularity::Beat, steady_events(400, 500));
    player.with_timeline("X", Granularity::Bar, steady_events(100, 2000));
    player.play("X", Duration::ZERO);
    let mut h = Harness::new(player).await;
    report(h.scheduler.tick().await);

    let previous = h.state.set_granularity(Granularity::Bar).await;
    assert_eq!(previous, Granularity::Beat);

    sleep(Duration::from_millis(500)).await;
    let r = report(h.scheduler.tick().await);
    assert!(r.decision.is_restart());
    assert_eq!(r.started, Some(2));
    assert_eq!(h.player.timeline_fetches().last(), Some(&("X".to_string(), Granularity::Bar)));
    assert_eq!(h.state.status().await.session_granularity, Some(Granularity::Bar));

    // Change is consumed once
    sleep(Duration::from_secs(2)).await;
    assert_eq!(report(h.scheduler.tick().await).decision, ResyncDecision::NONE);
}

#[tokio::test(start_paused = true)]
async fn test_granularity_switch_while_paused_waits_for_resume() {
    let player = ScriptedPlayer::new();
    player.with_timeline("X", Granularity::Beat, steady_events(400, 500));
    player.with_timeline("X", Granularity::Tatum, steady_events(800, 250));
    player.play("X", Duration::ZERO);
    let mut h = Harness::new(player).await;
    report(h.scheduler.tick().await);

    h.player.pause();
    report(h.scheduler.tick().await);
    h.state.set_granularity(Granularity::Tatum).await;
    assert_eq!(report(h.scheduler.tick().await).decision, ResyncDecision::NONE);

    h.player.resume();
    assert_eq!(report(h.scheduler.tick().await).started, Some(2));
    assert_eq!(h.player.timeline_fetches().last(), Some(&("X".to_string(), Granularity::Tatum)));
}

#[tokio::test(start_paused = true)]
async fn test_session_start_publishes_media_events() {
    let mut h = playing_harness("X").await;
    let mut rx = h.state.subscribe_events();

    report(h.scheduler.tick().await);

    match rx.try_recv() {
        Ok(SyncEvent::NewMedia { snapshot, granularity, .. }) => {
            assert_eq!(snapshot.media_id, "X");
            assert_eq!(granularity, Granularity::Beat);
        }
        other => panic!("expected new media event, got {:?}", other),
    }
    match rx.try_recv() {
        Ok(SyncEvent::MediaFeatures { media_id, features, .. }) => {
            assert_eq!(media_id, "X");
            assert_eq!(features.tempo, Some(120.0));
        }
        other => panic!("expected features event, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_features_failure_does_not_block_start() {
    let mut h = playing_harness("X").await;
    h.player.fail_features(true);
    let mut rx = h.state.subscribe_events();

    assert_eq!(report(h.scheduler.tick().await).started, Some(1));
    assert_eq!(h.player.feature_fetches(), 1);

    assert!(matches!(rx.try_recv(), Ok(SyncEvent::NewMedia { .. })));
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_polls_until_shutdown() {
    let Harness {
        player,
        state,
        scheduler,
        dispatcher,
        dispatcher_task,
    } = playing_harness("X").await;

    let shutdown = CancellationToken::new();
    let task = tokio::spawn(scheduler.run(shutdown.clone()));

    // Primed at 0s, ticks at 2s (start from 2000ms) and 4s
    sleep(Duration::from_millis(4900)).await;
    assert_eq!(player.polls(), 3);
    assert_eq!(player.timeline_fetches().len(), 1);
    assert_eq!(state.triggers_published(), 5);

    shutdown.cancel();
    task.await.unwrap();

    sleep(Duration::from_secs(2)).await;
    assert_eq!(state.triggers_published(), 5);
    assert_eq!(dispatcher.live_generation(), None);

    // Last sender gone: the dispatcher worker exits
    drop(dispatcher);
    dispatcher_task.await.unwrap();
}
