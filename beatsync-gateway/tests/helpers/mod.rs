//! Test helpers for beatsync-gateway integration tests
//!
//! Provides a scripted player that behaves like a real one on the tokio
//! clock (progress advances while playing) and can be told to fail.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use beatsync_common::{Granularity, MediaFeatures, PlaybackSnapshot, TriggerEvent, TriggerTimeline};
use beatsync_gateway::output::TriggerDispatcher;
use beatsync_gateway::player::{PlayerClient, PlayerError};
use beatsync_gateway::sync::SchedulerLoop;
use beatsync_gateway::SharedState;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DRIFT_TOLERANCE: Duration = Duration::from_secs(1);

/// Build events from `(start_ms, duration_ms)` pairs
pub fn events(pairs: &[(u64, u64)]) -> Vec<TriggerEvent> {
    pairs
        .iter()
        .map(|&(start, duration)| TriggerEvent::new(Duration::from_millis(start), Duration::from_millis(duration)))
        .collect()
}

/// Evenly spaced events covering `[0, count * period)`
pub fn steady_events(count: u64, period_ms: u64) -> Vec<TriggerEvent> {
    (0..count)
        .map(|i| TriggerEvent::new(Duration::from_millis(i * period_ms), Duration::from_millis(period_ms)))
        .collect()
}

#[derive(Default)]
struct Script {
    media_id: Option<String>,
    playing: bool,
    /// Progress at `anchor`
    progress: Duration,
    anchor: Option<Instant>,
    fail_polls: usize,
    fail_timelines: usize,
    fail_features: bool,
    timelines: HashMap<(String, Granularity), Vec<TriggerEvent>>,
}

impl Script {
    fn progress_now(&self) -> Duration {
        match (self.playing, self.anchor) {
            (true, Some(anchor)) => self.progress + Instant::now().duration_since(anchor),
            _ => self.progress,
        }
    }

    fn rebase(&mut self) {
        self.progress = self.progress_now();
        self.anchor = Some(Instant::now());
    }
}

/// Player double driven by the test
#[derive(Default)]
pub struct ScriptedPlayer {
    script: Mutex<Script>,
    timeline_fetches: Mutex<Vec<(String, Granularity)>>,
    feature_fetches: AtomicUsize,
    polls: AtomicUsize,
}

impl ScriptedPlayer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register the timeline returned for `media_id` at `granularity`
    pub fn with_timeline(&self, media_id: &str, granularity: Granularity, events: Vec<TriggerEvent>) {
        self.script
            .lock()
            .unwrap()
            .timelines
            .insert((media_id.to_string(), granularity), events);
    }

    /// Start playing `media_id` from `progress`
    pub fn play(&self, media_id: &str, progress: Duration) {
        let mut script = self.script.lock().unwrap();
        script.media_id = Some(media_id.to_string());
        script.playing = true;
        script.progress = progress;
        script.anchor = Some(Instant::now());
    }

    pub fn pause(&self) {
        let mut script = self.script.lock().unwrap();
        script.rebase();
        script.playing = false;
    }

    pub fn resume(&self) {
        let mut script = self.script.lock().unwrap();
        script.rebase();
        script.playing = true;
    }

    pub fn seek(&self, progress: Duration) {
        let mut script = self.script.lock().unwrap();
        script.progress = progress;
        script.anchor = Some(Instant::now());
    }

    /// Nothing active on the player
    pub fn stop(&self) {
        let mut script = self.script.lock().unwrap();
        script.media_id = None;
        script.playing = false;
    }

    pub fn fail_next_polls(&self, count: usize) {
        self.script.lock().unwrap().fail_polls = count;
    }

    pub fn fail_next_timelines(&self, count: usize) {
        self.script.lock().unwrap().fail_timelines = count;
    }

    pub fn fail_features(&self, fail: bool) {
        self.script.lock().unwrap().fail_features = fail;
    }

    pub fn progress(&self) -> Duration {
        self.script.lock().unwrap().progress_now()
    }

    pub fn timeline_fetches(&self) -> Vec<(String, Granularity)> {
        self.timeline_fetches.lock().unwrap().clone()
    }

    pub fn feature_fetches(&self) -> usize {
        self.feature_fetches.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlayerClient for ScriptedPlayer {
    async fn current_snapshot(&self) -> Result<Option<PlaybackSnapshot>, PlayerError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        if script.fail_polls > 0 {
            script.fail_polls -= 1;
            return Err(PlayerError::Network("scripted poll failure".to_string()));
        }

        Ok(script.media_id.clone().map(|media_id| {
            PlaybackSnapshot::new(media_id, script.playing, script.progress_now()).with_sampled_at(Instant::now())
        }))
    }

    async fn trigger_timeline(
        &self,
        media_id: &str,
        granularity: Granularity,
    ) -> Result<TriggerTimeline, PlayerError> {
        self.timeline_fetches
            .lock()
            .unwrap()
            .push((media_id.to_string(), granularity));

        let mut script = self.script.lock().unwrap();
        if script.fail_timelines > 0 {
            script.fail_timelines -= 1;
            return Err(PlayerError::Api(503, "scripted timeline failure".to_string()));
        }

        script
            .timelines
            .get(&(media_id.to_string(), granularity))
            .map(|events| TriggerTimeline::new(media_id, granularity, events.clone()))
            .ok_or_else(|| PlayerError::NotFound(format!("audio-analysis/{}", media_id)))
    }

    async fn media_features(&self, media_id: &str) -> Result<MediaFeatures, PlayerError> {
        self.feature_fetches.fetch_add(1, Ordering::SeqCst);
        if self.script.lock().unwrap().fail_features {
            return Err(PlayerError::NotFound(format!("audio-features/{}", media_id)));
        }
        Ok(MediaFeatures {
            id: media_id.to_string(),
            tempo: Some(120.0),
            ..MediaFeatures::default()
        })
    }
}

/// A scheduler wired to a scripted player
pub struct Harness {
    pub player: Arc<ScriptedPlayer>,
    pub state: Arc<SharedState>,
    pub scheduler: SchedulerLoop,
    pub dispatcher: TriggerDispatcher,
    pub dispatcher_task: JoinHandle<()>,
}

impl Harness {
    pub async fn new(player: Arc<ScriptedPlayer>) -> Self {
        let state = Arc::new(SharedState::default());
        let (dispatcher, dispatcher_task) = TriggerDispatcher::spawn(state.clone(), None);
        let scheduler = SchedulerLoop::new(
            player.clone(),
            state.clone(),
            dispatcher.clone(),
            POLL_INTERVAL,
            DRIFT_TOLERANCE,
        )
        .await;

        Self {
            player,
            state,
            scheduler,
            dispatcher,
            dispatcher_task,
        }
    }

    pub fn published(&self) -> u64 {
        self.state.triggers_published()
    }
}
