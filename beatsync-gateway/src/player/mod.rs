//! Remote media player boundary
//!
//! The gateway never pushes anything to the player; it only polls for the
//! current playback snapshot and fetches per-track analysis when a trigger
//! session starts.

mod web;

pub use web::{AudioAnalysis, CurrentlyPlaying, PlayingItem, TimeInterval, WebPlayerClient};

use async_trait::async_trait;
use beatsync_common::{Granularity, MediaFeatures, PlaybackSnapshot, TriggerTimeline};
use thiserror::Error;

/// Player client errors
#[derive(Debug, Error)]
pub enum PlayerError {
    /// Network communication error (connect, timeout, TLS)
    #[error("Network error: {0}")]
    Network(String),

    /// Access token missing, expired or rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Requested media has no analysis or features
    #[error("Not found: {0}")]
    NotFound(String),

    /// Player API returned an error response
    #[error("API error {0}: {1}")]
    Api(u16, String),

    /// Failed to parse API response JSON
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Source of playback snapshots and trigger timelines
#[async_trait]
pub trait PlayerClient: Send + Sync {
    /// Poll the player
    ///
    /// `Ok(None)` means the player reported nothing active.
    async fn current_snapshot(&self) -> Result<Option<PlaybackSnapshot>, PlayerError>;

    /// Trigger events for one track at the requested granularity
    async fn trigger_timeline(
        &self,
        media_id: &str,
        granularity: Granularity,
    ) -> Result<TriggerTimeline, PlayerError>;

    /// Feature summary for one track
    async fn media_features(&self, media_id: &str) -> Result<MediaFeatures, PlayerError>;
}
