//! HTTP client for the player's Web API
//!
//! Endpoints (relative to the configured base URL):
//! - `GET /me/player/currently-playing` → playback snapshot (204 = nothing active)
//! - `GET /audio-analysis/{id}` → beats, bars, tatums and sections
//! - `GET /audio-features/{id}` → feature summary
//!
//! Requests carry a bearer token. Obtaining and refreshing that token is the
//! operator's job; a 401 is reported as [`PlayerError::Unauthorized`].

use async_trait::async_trait;
use beatsync_common::time::secs_f64_to_duration;
use beatsync_common::{Granularity, MediaFeatures, PlaybackSnapshot, TriggerEvent, TriggerTimeline};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;

use super::{PlayerClient, PlayerError};

const USER_AGENT: &str = concat!("beatsync-gateway/", env!("CARGO_PKG_VERSION"));

/// `currently-playing` response (fields we use)
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentlyPlaying {
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub progress_ms: Option<u64>,
    #[serde(default)]
    pub item: Option<PlayingItem>,
}

/// The item being played; absent for ads and some local files
#[derive(Debug, Clone, Deserialize)]
pub struct PlayingItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl CurrentlyPlaying {
    /// Convert to a snapshot sampled at `sampled_at`
    ///
    /// A missing item yields a snapshot with an empty media id, which the
    /// scheduler treats as "no media identified".
    pub fn into_snapshot(self, sampled_at: Instant) -> PlaybackSnapshot {
        let (media_id, media_name) = match self.item {
            Some(item) => (item.id.unwrap_or_default(), item.name),
            None => (String::new(), None),
        };
        PlaybackSnapshot {
            media_id,
            media_name,
            is_playing: self.is_playing,
            progress: Duration::from_millis(self.progress_ms.unwrap_or(0)),
            sampled_at,
        }
    }
}

/// One interval of an analysis document (seconds)
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TimeInterval {
    pub start: f64,
    pub duration: f64,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl From<&TimeInterval> for TriggerEvent {
    fn from(interval: &TimeInterval) -> Self {
        TriggerEvent::new(
            secs_f64_to_duration(interval.start),
            secs_f64_to_duration(interval.duration),
        )
    }
}

/// `audio-analysis` response (interval lists only)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AudioAnalysis {
    #[serde(default)]
    pub bars: Vec<TimeInterval>,
    #[serde(default)]
    pub beats: Vec<TimeInterval>,
    #[serde(default)]
    pub tatums: Vec<TimeInterval>,
    #[serde(default)]
    pub sections: Vec<TimeInterval>,
}

impl AudioAnalysis {
    pub fn intervals(&self, granularity: Granularity) -> &[TimeInterval] {
        match granularity {
            Granularity::Beat => &self.beats,
            Granularity::Bar => &self.bars,
            Granularity::Tatum => &self.tatums,
            Granularity::Section => &self.sections,
        }
    }

    /// Build the trigger timeline for one granularity
    pub fn timeline(&self, media_id: &str, granularity: Granularity) -> TriggerTimeline {
        let events = self.intervals(granularity).iter().map(TriggerEvent::from).collect();
        TriggerTimeline::new(media_id, granularity, events)
    }
}

/// Path of a per-media resource, with the id as a single escaped segment
///
/// Dot segments survive escaping and would be resolved by the URL parser, so
/// they are rejected.
fn media_path(resource: &str, media_id: &str) -> Result<String, PlayerError> {
    if media_id.is_empty() || media_id == "." || media_id == ".." {
        return Err(PlayerError::NotFound(format!("{}/{:?}", resource, media_id)));
    }
    Ok(format!("{}/{}", resource, urlencoding::encode(media_id)))
}

/// Player Web API client
pub struct WebPlayerClient {
    http_client: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl WebPlayerClient {
    /// Create new client
    pub fn new(
        base_url: impl Into<String>,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, PlayerError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| PlayerError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, PlayerError> {
        let url = self.url(path);
        tracing::trace!(url = %url, "Player API request");

        let mut request = self.http_client.get(&url);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PlayerError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            let error_text = response.text().await.unwrap_or_default();
            return Err(PlayerError::Unauthorized(error_text));
        }
        if status == StatusCode::NOT_FOUND {
            return Err(PlayerError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(PlayerError::Api(status.as_u16(), error_text));
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, PlayerError> {
        self.get(path)
            .await?
            .json()
            .await
            .map_err(|e| PlayerError::Parse(e.to_string()))
    }
}

#[async_trait]
impl PlayerClient for WebPlayerClient {
    async fn current_snapshot(&self) -> Result<Option<PlaybackSnapshot>, PlayerError> {
        let response = self.get("me/player/currently-playing").await?;
        let sampled_at = Instant::now();

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let playing: CurrentlyPlaying = response
            .json()
            .await
            .map_err(|e| PlayerError::Parse(e.to_string()))?;

        Ok(Some(playing.into_snapshot(sampled_at)))
    }

    async fn trigger_timeline(
        &self,
        media_id: &str,
        granularity: Granularity,
    ) -> Result<TriggerTimeline, PlayerError> {
        let analysis: AudioAnalysis = self.get_json(&media_path("audio-analysis", media_id)?).await?;
        let timeline = analysis.timeline(media_id, granularity);

        tracing::debug!(
            media_id = %media_id,
            granularity = %granularity,
            events = timeline.len(),
            "Fetched trigger timeline"
        );

        if !timeline.is_ordered() {
            tracing::warn!(media_id = %media_id, "Analysis intervals are not ascending by start");
        }

        Ok(timeline)
    }

    async fn media_features(&self, media_id: &str) -> Result<MediaFeatures, PlayerError> {
        self.get_json(&media_path("audio-features", media_id)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANALYSIS: &str = r#"{
        "bars":   [{"start": 0.0, "duration": 2.0, "confidence": 0.9},
                   {"start": 2.0, "duration": 2.0, "confidence": 0.8}],
        "beats":  [{"start": 0.0, "duration": 0.5},
                   {"start": 0.5, "duration": 0.5},
                   {"start": 1.0, "duration": 0.5}],
        "tatums": [],
        "track":  {"tempo": 120.0}
    }"#;

    #[test]
    fn test_client_creation() {
        let client = WebPlayerClient::new("http://localhost:1/v1/", None, Duration::from_secs(1));
        assert!(client.is_ok());
        assert_eq!(client.unwrap().url("/me/player"), "http://localhost:1/v1/me/player");
    }

    #[test]
    fn test_media_id_is_one_path_segment() {
        assert_eq!(media_path("audio-analysis", "4uLU6hMC").unwrap(), "audio-analysis/4uLU6hMC");
        assert_eq!(
            media_path("audio-features", "../me/player?x=1#y").unwrap(),
            "audio-features/..%2Fme%2Fplayer%3Fx%3D1%23y"
        );
        assert!(matches!(media_path("audio-analysis", ".."), Err(PlayerError::NotFound(_))));
        assert!(media_path("audio-analysis", "").is_err());
    }

    #[test]
    fn test_analysis_timeline_per_granularity() {
        let analysis: AudioAnalysis = serde_json::from_str(ANALYSIS).unwrap();

        let beats = analysis.timeline("t", Granularity::Beat);
        assert_eq!(beats.len(), 3);
        assert_eq!(beats.events[1].start, Duration::from_millis(500));
        assert_eq!(beats.events[1].duration, Duration::from_millis(500));

        let bars = analysis.timeline("t", Granularity::Bar);
        assert_eq!(bars.granularity, Granularity::Bar);
        assert_eq!(bars.events[1].start, Duration::from_secs(2));

        // Missing and empty lists both yield empty timelines
        assert!(analysis.timeline("t", Granularity::Tatum).is_empty());
        assert!(analysis.timeline("t", Granularity::Section).is_empty());
    }

    #[test]
    fn test_currently_playing_into_snapshot() {
        let playing: CurrentlyPlaying = serde_json::from_str(
            r#"{"is_playing": true, "progress_ms": 42000, "item": {"id": "abc", "name": "Song"}}"#,
        )
        .unwrap();
        let snapshot = playing.into_snapshot(Instant::now());
        assert_eq!(snapshot.media_id, "abc");
        assert_eq!(snapshot.media_name.as_deref(), Some("Song"));
        assert!(snapshot.is_playing);
        assert_eq!(snapshot.progress, Duration::from_secs(42));
    }

    #[test]
    fn test_currently_playing_without_item() {
        let playing: CurrentlyPlaying =
            serde_json::from_str(r#"{"is_playing": true, "progress_ms": null, "item": null}"#).unwrap();
        let snapshot = playing.into_snapshot(Instant::now());
        assert!(!snapshot.has_media());
        assert_eq!(snapshot.progress, Duration::ZERO);
    }
}
