//! Scheduler loop
//!
//! Polls the player on a fixed cadence and keeps at most one trigger session
//! running in step with what the player reports:
//!
//! 1. Poll the player; a failed poll skips the tick
//! 2. Skip the tick when no media is identified
//! 3. Classify the snapshot and evaluate the resync policy
//! 4. Stop the live session when required, waiting until it has exited
//! 5. Start a new session when required (a failed timeline fetch abandons
//!    the start; the policy retries on a later tick)
//! 6. Remember the snapshot and granularity for the next comparison
//!
//! All scheduler context is owned by the loop's own task. The only input
//! written from elsewhere is the requested granularity in [`SharedState`].

use std::sync::Arc;
use std::time::Duration;

use beatsync_common::events::SyncEvent;
use beatsync_common::{Granularity, PlaybackSnapshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::policy::{self, ResyncDecision};
use super::session::{SessionHandle, SessionOutcome, TriggerSession};
use super::tracker::PlaybackStateTracker;
use crate::output::TriggerDispatcher;
use crate::player::PlayerClient;
use crate::state::{SharedState, SyncStatus};

/// What one tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The player could not be polled; nothing was touched
    PollFailed,
    /// The player reported no media; nothing was touched
    NoActiveMedia,
    /// The snapshot was evaluated
    Evaluated(TickReport),
}

/// Details of an evaluated tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub decision: ResyncDecision,
    /// Outcome of the session stopped this tick
    pub stopped: Option<SessionOutcome>,
    /// Generation of the session started this tick
    pub started: Option<u64>,
    /// A start was decided but the timeline could not be fetched
    pub start_abandoned: bool,
}

/// Scheduler-owned context, never shared
struct SchedulerContext {
    last_snapshot: Option<PlaybackSnapshot>,
    last_granularity: Granularity,
    active_session: Option<SessionHandle>,
    last_generation: u64,
}

/// Top-level polling driver
pub struct SchedulerLoop {
    player: Arc<dyn PlayerClient>,
    state: Arc<SharedState>,
    dispatcher: TriggerDispatcher,
    tracker: PlaybackStateTracker,
    ctx: SchedulerContext,
}

impl SchedulerLoop {
    /// Build a scheduler
    ///
    /// The granularity baseline is the one currently requested in `state`, so
    /// a change made before the first tick is not mistaken for a switch.
    pub async fn new(
        player: Arc<dyn PlayerClient>,
        state: Arc<SharedState>,
        dispatcher: TriggerDispatcher,
        poll_interval: Duration,
        drift_tolerance: Duration,
    ) -> Self {
        let last_granularity = state.granularity().await;
        Self {
            player,
            state,
            dispatcher,
            tracker: PlaybackStateTracker::new(poll_interval, drift_tolerance),
            ctx: SchedulerContext {
                last_snapshot: None,
                last_granularity,
                active_session: None,
                last_generation: 0,
            },
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.tracker.poll_interval()
    }

    /// A session is recorded as live (it may have run out of triggers)
    pub fn is_detecting(&self) -> bool {
        self.ctx.active_session.is_some()
    }

    pub fn active_generation(&self) -> Option<u64> {
        self.ctx.active_session.as_ref().map(SessionHandle::generation)
    }

    pub fn last_snapshot(&self) -> Option<&PlaybackSnapshot> {
        self.ctx.last_snapshot.as_ref()
    }

    /// Poll once to establish the comparison baseline
    ///
    /// A failed or empty poll leaves the baseline unset; the first tick then
    /// compares against the idle snapshot and sees a media change.
    pub async fn prime(&mut self) {
        match self.player.current_snapshot().await {
            Ok(Some(snapshot)) if snapshot.has_media() => {
                debug!(media_id = %snapshot.media_id, playing = snapshot.is_playing, "Initial snapshot");
                self.ctx.last_snapshot = Some(snapshot);
            }
            Ok(_) => debug!("Nothing playing at startup"),
            Err(e) => warn!("Initial player poll failed: {}", e),
        }
    }

    /// Run until `shutdown` is cancelled
    pub async fn run(mut self, shutdown: CancellationToken) {
        let poll_interval = self.poll_interval();
        info!(poll_interval_ms = poll_interval.as_millis() as u64, "Scheduler started");

        self.prime().await;

        let mut ticker = tokio::time::interval_at(Instant::now() + poll_interval, poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let outcome = self.tick().await;
                    debug!(?outcome, "Tick");
                }
            }
        }

        if let Some(outcome) = self.stop_active().await {
            info!(?outcome, "Stopped trigger session on shutdown");
        }
        info!("Scheduler stopped");
    }

    /// Evaluate one poll
    pub async fn tick(&mut self) -> TickOutcome {
        let current = match self.player.current_snapshot().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return TickOutcome::NoActiveMedia,
            Err(e) => {
                warn!("Player poll failed, retrying next tick: {}", e);
                self.state.record_poll_failure();
                return TickOutcome::PollFailed;
            }
        };

        let idle = PlaybackSnapshot::idle();
        let previous = self.ctx.last_snapshot.as_ref().unwrap_or(&idle);
        let Some(classification) = self.tracker.classify(previous, &current) else {
            return TickOutcome::NoActiveMedia;
        };

        let granularity = self.state.granularity().await;
        let granularity_changed = granularity != self.ctx.last_granularity;
        let decision = policy::decide(&classification, self.is_detecting(), granularity_changed);

        if decision != ResyncDecision::NONE {
            info!(
                media_id = %current.media_id,
                playing = current.is_playing,
                progress_ms = current.progress.as_millis() as u64,
                ?classification,
                stop = decision.must_stop,
                start = decision.must_start,
                "Resync required"
            );
        }

        let mut report = TickReport {
            decision,
            ..TickReport::default()
        };

        if decision.must_stop {
            report.stopped = self.stop_active().await;
        }

        if decision.must_start {
            report.started = self.start_session(&current, granularity).await;
            report.start_abandoned = report.started.is_none();
        }

        self.ctx.last_snapshot = Some(current);
        self.ctx.last_granularity = granularity;
        self.publish_status().await;

        TickOutcome::Evaluated(report)
    }

    /// Stop the recorded session and wait until it has exited
    async fn stop_active(&mut self) -> Option<SessionOutcome> {
        let handle = self.ctx.active_session.take()?;
        let generation = handle.generation();

        // Queued triggers from this session must not be published any more
        self.dispatcher.retire();
        let outcome = handle.stop().await;

        info!(generation, ?outcome, "Trigger session stopped");
        Some(outcome)
    }

    /// Fetch the timeline and launch a new session
    ///
    /// Returns the new session's generation, or `None` when the start was
    /// abandoned.
    async fn start_session(&mut self, snapshot: &PlaybackSnapshot, granularity: Granularity) -> Option<u64> {
        // One live session at a time, even if the policy only asked to start
        if let Some(outcome) = self.stop_active().await {
            debug!(?outcome, "Replaced previous session");
        }

        let timeline = match self.player.trigger_timeline(&snapshot.media_id, granularity).await {
            Ok(timeline) => timeline,
            Err(e) => {
                warn!(
                    media_id = %snapshot.media_id,
                    granularity = %granularity,
                    "Timeline fetch failed, will retry: {}",
                    e
                );
                return None;
            }
        };

        self.state.publish(SyncEvent::NewMedia {
            snapshot: snapshot.clone(),
            granularity,
            timestamp: chrono::Utc::now(),
        });

        match self.player.media_features(&snapshot.media_id).await {
            Ok(features) => self.state.publish(SyncEvent::MediaFeatures {
                media_id: snapshot.media_id.clone(),
                features,
                timestamp: chrono::Utc::now(),
            }),
            Err(e) => warn!(media_id = %snapshot.media_id, "Media features unavailable: {}", e),
        }

        // Account for the time spent since the snapshot was sampled
        let offset = snapshot.progress_at(Instant::now());

        self.ctx.last_generation += 1;
        let generation = self.ctx.last_generation;
        self.dispatcher.set_live_generation(generation);

        let handle = TriggerSession::new(generation, timeline, offset, Arc::new(self.dispatcher.clone())).spawn();

        info!(
            generation,
            media_id = %snapshot.media_id,
            media_name = snapshot.media_name.as_deref().unwrap_or(""),
            granularity = %granularity,
            offset_ms = offset.as_millis() as u64,
            "Trigger session started"
        );

        self.ctx.active_session = Some(handle);
        Some(generation)
    }

    async fn publish_status(&self) {
        let snapshot = self.ctx.last_snapshot.as_ref();
        let session = self.ctx.active_session.as_ref();
        self.state
            .set_status(SyncStatus {
                detecting: session.is_some(),
                media_id: snapshot.map(|s| s.media_id.clone()),
                media_name: snapshot.and_then(|s| s.media_name.clone()),
                is_playing: snapshot.is_some_and(|s| s.is_playing),
                session_generation: session.map(SessionHandle::generation),
                session_granularity: session.map(SessionHandle::granularity),
                last_poll_at: Some(chrono::Utc::now()),
            })
            .await;
    }
}
