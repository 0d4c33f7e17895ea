//! Event types for the BeatSync event system
//!
//! Provides the published event definitions and the EventBus every
//! publisher and subscriber shares.

pub mod topics;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::media::{Granularity, MediaFeatures, PlaybackSnapshot};

/// BeatSync event types
///
/// Events are broadcast via EventBus and serialized as JSON for transmission.
/// Every variant maps to exactly one topic (see [`SyncEvent::topic`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// A trigger session started for this media
    ///
    /// Published once per session start, before the first trigger.
    NewMedia {
        snapshot: PlaybackSnapshot,
        /// Granularity the session fires at
        granularity: Granularity,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Feature summary of the media a session started for
    MediaFeatures {
        media_id: String,
        features: MediaFeatures,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A trigger fired
    ///
    /// Emitted by the dispatcher for every trigger of the live session.
    TriggerFired {
        /// Index of the event within its timeline
        index: usize,
        /// Intended span of the effect (milliseconds)
        duration_ms: u64,
        granularity: Granularity,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Trigger granularity changed by an external command
    GranularityChanged {
        old: Granularity,
        new: Granularity,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl SyncEvent {
    /// Topic this event is published on
    pub fn topic(&self) -> &'static str {
        match self {
            SyncEvent::NewMedia { .. } => topics::NEW_MEDIA,
            SyncEvent::MediaFeatures { .. } => topics::MEDIA_FEATURES,
            SyncEvent::TriggerFired { .. } => topics::TRIGGER_FIRED,
            SyncEvent::GranularityChanged { .. } => topics::TRIGGER_GRANULARITY,
        }
    }

    /// Serialized payload for transports that carry raw bytes
    pub fn payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use beatsync_common::events::{EventBus, SyncEvent};
/// use beatsync_common::Granularity;
///
/// let event_bus = EventBus::new(16);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(SyncEvent::GranularityChanged {
///     old: Granularity::Beat,
///     new: Granularity::Bar,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(matches!(rx.try_recv(), Ok(SyncEvent::GranularityChanged { .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: SyncEvent) -> Result<usize, broadcast::error::SendError<SyncEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SyncEvent) {
        let topic = event.topic();
        if self.emit(event).is_err() {
            tracing::trace!(topic, "No subscribers for event");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
