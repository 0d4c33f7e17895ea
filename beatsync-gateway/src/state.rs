//! Shared gateway state
//!
//! Thread-safe state shared between the scheduler task, the trigger
//! dispatcher and the HTTP handlers.
//!
//! The requested trigger granularity is the only value written from outside
//! the scheduler (by the command endpoint); the scheduler reads it once per
//! tick. Everything else here is a read-only mirror the scheduler publishes
//! for status reporting.

use beatsync_common::events::{EventBus, SyncEvent};
use beatsync_common::Granularity;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, RwLock};

/// Scheduler status mirror
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    /// A trigger session is recorded as live
    pub detecting: bool,
    /// Media of the most recent evaluated poll
    pub media_id: Option<String>,
    pub media_name: Option<String>,
    pub is_playing: bool,
    /// Generation of the recorded session
    pub session_generation: Option<u64>,
    /// Granularity the recorded session fires at
    pub session_granularity: Option<Granularity>,
    pub last_poll_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Shared state accessible by all components
///
/// Uses RwLock for concurrent read access with rare writes
pub struct SharedState {
    /// Requested trigger granularity
    granularity: RwLock<Granularity>,

    status: RwLock<SyncStatus>,

    /// Event bus for published messages
    event_bus: EventBus,

    triggers_published: AtomicU64,
    polls_failed: AtomicU64,
}

impl SharedState {
    pub fn new(default_granularity: Granularity, event_bus_capacity: usize) -> Self {
        Self {
            granularity: RwLock::new(default_granularity),
            status: RwLock::new(SyncStatus::default()),
            event_bus: EventBus::new(event_bus_capacity),
            triggers_published: AtomicU64::new(0),
            polls_failed: AtomicU64::new(0),
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Publish an event, ignoring if nobody is listening
    pub fn publish(&self, event: SyncEvent) {
        self.event_bus.emit_lossy(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_bus.subscribe()
    }

    /// Currently requested granularity
    pub async fn granularity(&self) -> Granularity {
        *self.granularity.read().await
    }

    /// Request a new granularity, returning the previous one
    ///
    /// Publishes a granularity change when the value actually changes. The
    /// scheduler picks the change up on its next tick.
    pub async fn set_granularity(&self, granularity: Granularity) -> Granularity {
        let old = {
            let mut current = self.granularity.write().await;
            std::mem::replace(&mut *current, granularity)
        };

        if old != granularity {
            tracing::info!(old = %old, new = %granularity, "Trigger granularity changed");
            self.publish(SyncEvent::GranularityChanged {
                old,
                new: granularity,
                timestamp: chrono::Utc::now(),
            });
        }
        old
    }

    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    pub async fn set_status(&self, status: SyncStatus) {
        *self.status.write().await = status;
    }

    pub fn record_trigger_published(&self) {
        self.triggers_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn triggers_published(&self) -> u64 {
        self.triggers_published.load(Ordering::Relaxed)
    }

    pub fn record_poll_failure(&self) {
        self.polls_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn polls_failed(&self) -> u64 {
        self.polls_failed.load(Ordering::Relaxed)
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(Granularity::default(), 256)
    }
}
