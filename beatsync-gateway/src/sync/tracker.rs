//! Playback state tracking
//!
//! Compares each polled snapshot with the previous one. The result is a set of
//! independent facts rather than a single state, because a poll can observe a
//! track change and a pause at the same time.

use beatsync_common::time::abs_diff;
use beatsync_common::PlaybackSnapshot;
use std::time::Duration;

/// Default slack for polling jitter and network latency
pub const DEFAULT_DRIFT_TOLERANCE: Duration = Duration::from_secs(1);

/// What changed between two consecutive snapshots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Classification {
    /// Playing ↔ paused
    pub play_state_changed: bool,
    /// Different media than the previous sample
    pub media_changed: bool,
    /// Position moved more than one poll interval can explain (a seek)
    pub progress_drifted: bool,
    /// Passthrough of the current sample's play state
    pub is_playing: bool,
}

impl Classification {
    /// Nothing changed that could invalidate a running schedule
    pub fn is_steady(&self) -> bool {
        !self.play_state_changed && !self.media_changed && !self.progress_drifted
    }
}

/// Classifies snapshots against the previous one
#[derive(Debug, Clone, Copy)]
pub struct PlaybackStateTracker {
    poll_interval: Duration,
    drift_tolerance: Duration,
}

impl PlaybackStateTracker {
    pub fn new(poll_interval: Duration, drift_tolerance: Duration) -> Self {
        Self {
            poll_interval,
            drift_tolerance,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Largest position change still considered normal playback
    pub fn drift_threshold(&self) -> Duration {
        self.poll_interval + self.drift_tolerance
    }

    /// Classify `current` against `previous`
    ///
    /// Returns `None` when `current` identifies no media; the caller skips the
    /// tick without touching any session.
    pub fn classify(&self, previous: &PlaybackSnapshot, current: &PlaybackSnapshot) -> Option<Classification> {
        if !current.has_media() {
            return None;
        }

        Some(Classification {
            play_state_changed: previous.is_playing != current.is_playing,
            media_changed: previous.media_id != current.media_id,
            progress_drifted: abs_diff(current.progress, previous.progress) > self.drift_threshold(),
            is_playing: current.is_playing,
        })
    }
}
