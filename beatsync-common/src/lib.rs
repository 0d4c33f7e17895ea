//! # BeatSync Common Library
//!
//! Shared code for the BeatSync gateway and its tooling:
//! - Playback and trigger timeline data model
//! - Event types (SyncEvent enum) and the EventBus
//! - Configuration loading
//! - Time conversion helpers

pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod time;

pub use error::{Error, Result};
pub use media::{Granularity, MediaFeatures, PlaybackSnapshot, TriggerEvent, TriggerTimeline};
