//! Trigger dispatcher
//!
//! Sessions hand fired triggers to the dispatcher through an unbounded
//! channel and return immediately. A dedicated worker task publishes each
//! trigger on the event bus and hands hardware rendering to a blocking task,
//! so a slow sink never delays the next trigger.
//!
//! The worker only forwards triggers from the live session generation.
//! Triggers still queued from a session that has since been stopped are
//! dropped. The generation check and the publish happen under the same lock
//! that [`TriggerDispatcher::retire`] takes, so once `retire` returns no
//! trigger from the retired session is published.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use beatsync_common::events::SyncEvent;
use beatsync_common::time::duration_to_millis;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::renderer::{Rgb, TriggerRenderer};
use crate::state::SharedState;
use crate::sync::session::{FiredTrigger, TriggerSink};

/// No session is live
const NO_GENERATION: u64 = 0;

/// Hardware output attached to the dispatcher
#[derive(Clone)]
pub struct HardwareOutput {
    pub renderer: Arc<dyn TriggerRenderer>,
    pub color: Rgb,
}

/// Sending side of the dispatcher
///
/// Cloning is cheap; all clones feed the same worker.
#[derive(Clone)]
pub struct TriggerDispatcher {
    tx: mpsc::UnboundedSender<FiredTrigger>,
    live_generation: Arc<Mutex<u64>>,
}

fn lock_generation(live_generation: &Mutex<u64>) -> MutexGuard<'_, u64> {
    // The guarded value is a plain integer, a poisoned lock still holds a valid one
    live_generation.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TriggerDispatcher {
    /// Start the dispatcher worker
    ///
    /// The worker runs until every dispatcher clone has been dropped.
    pub fn spawn(state: Arc<SharedState>, hardware: Option<HardwareOutput>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let live_generation = Arc::new(Mutex::new(NO_GENERATION));

        info!(hardware = hardware.is_some(), "Trigger dispatcher started");
        let worker = tokio::spawn(dispatch_loop(rx, live_generation.clone(), state, hardware));

        (Self { tx, live_generation }, worker)
    }

    /// Mark `generation` as the only session whose triggers are forwarded
    pub fn set_live_generation(&self, generation: u64) {
        *lock_generation(&self.live_generation) = generation;
    }

    /// Stop forwarding triggers from any session
    ///
    /// Waits for a publish already in progress to finish.
    pub fn retire(&self) {
        *lock_generation(&self.live_generation) = NO_GENERATION;
    }

    pub fn live_generation(&self) -> Option<u64> {
        match *lock_generation(&self.live_generation) {
            NO_GENERATION => None,
            generation => Some(generation),
        }
    }
}

impl TriggerSink for TriggerDispatcher {
    fn on_trigger(&self, fired: FiredTrigger) {
        if self.tx.send(fired).is_err() {
            warn!(index = fired.index, "Trigger dispatcher stopped, dropping trigger");
        }
    }
}

async fn dispatch_loop(
    mut rx: mpsc::UnboundedReceiver<FiredTrigger>,
    live_generation: Arc<Mutex<u64>>,
    state: Arc<SharedState>,
    hardware: Option<HardwareOutput>,
) {
    while let Some(fired) = rx.recv().await {
        let duration = fired.event.duration;
        {
            // Held across the publish; broadcast sends never block
            let live = lock_generation(&live_generation);
            if fired.generation != *live {
                debug!(
                    generation = fired.generation,
                    index = fired.index,
                    "Dropping trigger from retired session"
                );
                continue;
            }

            trace!(index = fired.index, duration_ms = duration_to_millis(duration), "Trigger");
            state.publish(SyncEvent::TriggerFired {
                index: fired.index,
                duration_ms: duration_to_millis(duration),
                granularity: fired.granularity,
                timestamp: chrono::Utc::now(),
            });
            state.record_trigger_published();
        }

        if let Some(output) = &hardware {
            render(output, duration, fired.is_alternate());
        }
    }

    debug!("Trigger dispatcher stopped");
}

fn render(output: &HardwareOutput, duration: Duration, alternate: bool) {
    let renderer = output.renderer.clone();
    let color = output.color;
    // Not awaited: the flash may outlast the gap to the next trigger
    drop(tokio::task::spawn_blocking(move || {
        renderer.render_trigger(color, duration, alternate)
    }));
}
