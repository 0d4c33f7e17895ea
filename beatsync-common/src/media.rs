//! Playback and trigger timeline data model
//!
//! These are the values exchanged between the player client, the trigger
//! scheduler and the event bus. All of them are immutable once built: a new
//! poll produces a new [`PlaybackSnapshot`], a new session fetches a new
//! [`TriggerTimeline`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::Error;

/// Serialize a `Duration` as whole milliseconds
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(crate::time::duration_to_millis(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// One observation of the remote player
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    /// Opaque media identifier (empty when nothing is loaded)
    pub media_id: String,
    /// Display name of the media, when the player reports one
    #[serde(default)]
    pub media_name: Option<String>,
    pub is_playing: bool,
    /// Position since track start
    #[serde(rename = "progress_ms", with = "duration_ms")]
    pub progress: Duration,
    /// Local monotonic time the sample was taken
    #[serde(skip, default = "Instant::now")]
    pub sampled_at: Instant,
}

impl PlaybackSnapshot {
    /// Snapshot sampled now
    pub fn new(media_id: impl Into<String>, is_playing: bool, progress: Duration) -> Self {
        Self {
            media_id: media_id.into(),
            media_name: None,
            is_playing,
            progress,
            sampled_at: Instant::now(),
        }
    }

    /// The "nothing observed yet" snapshot: no media, not playing, zero progress
    pub fn idle() -> Self {
        Self::new("", false, Duration::ZERO)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.media_name = Some(name.into());
        self
    }

    pub fn with_sampled_at(mut self, sampled_at: Instant) -> Self {
        self.sampled_at = sampled_at;
        self
    }

    /// Whether the player identified any media in this sample
    pub fn has_media(&self) -> bool {
        !self.media_id.trim().is_empty()
    }

    /// Playback position extrapolated to `now`
    ///
    /// A paused player does not advance, so its progress is returned as-is.
    pub fn progress_at(&self, now: Instant) -> Duration {
        if self.is_playing {
            self.progress + now.saturating_duration_since(self.sampled_at)
        } else {
            self.progress
        }
    }
}

/// Trigger granularity selection
///
/// Each variant names one of the interval lists in a track's analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Beat,
    Bar,
    Tatum,
    Section,
}

impl Granularity {
    pub const ALL: [Granularity; 4] = [
        Granularity::Beat,
        Granularity::Bar,
        Granularity::Tatum,
        Granularity::Section,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Beat => "beat",
            Granularity::Bar => "bar",
            Granularity::Tatum => "tatum",
            Granularity::Section => "section",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Granularity::ALL
            .into_iter()
            .find(|g| g.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::InvalidInput(format!("Unknown trigger granularity: {:?}", wanted)))
    }
}

/// One trigger in a timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Offset from track start
    #[serde(rename = "start_ms", with = "duration_ms")]
    pub start: Duration,
    /// Intended span of the effect
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
}

impl TriggerEvent {
    pub fn new(start: Duration, duration: Duration) -> Self {
        Self { start, duration }
    }
}

/// Ordered trigger events for one (media, granularity) pair
///
/// Events are ascending by `start`. The scheduler relies on that order and
/// never re-sorts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerTimeline {
    pub media_id: String,
    pub granularity: Granularity,
    pub events: Vec<TriggerEvent>,
}

impl TriggerTimeline {
    pub fn new(media_id: impl Into<String>, granularity: Granularity, events: Vec<TriggerEvent>) -> Self {
        Self {
            media_id: media_id.into(),
            granularity,
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Index of the first event still ahead of `offset`
    ///
    /// One past the last event whose start is at or before `offset`; equals
    /// `len()` when the offset is past every event.
    pub fn next_index_after(&self, offset: Duration) -> usize {
        self.events
            .iter()
            .rposition(|event| event.start <= offset)
            .map_or(0, |last_passed| last_passed + 1)
    }

    /// Whether events are ascending by start offset
    pub fn is_ordered(&self) -> bool {
        self.events.windows(2).all(|pair| pair[0].start <= pair[1].start)
    }
}

/// Per-track feature summary published when a session starts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaFeatures {
    #[serde(default)]
    pub id: String,
    /// Estimated tempo in BPM
    #[serde(default)]
    pub tempo: Option<f64>,
    #[serde(default)]
    pub time_signature: Option<u32>,
    /// Pitch class of the key (-1 when undetected)
    #[serde(default)]
    pub key: Option<i32>,
    /// 1 = major, 0 = minor
    #[serde(default)]
    pub mode: Option<i32>,
    #[serde(default)]
    pub energy: Option<f64>,
    #[serde(default)]
    pub danceability: Option<f64>,
    #[serde(default)]
    pub valence: Option<f64>,
    /// Overall loudness in dB
    #[serde(default)]
    pub loudness: Option<f64>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}
