//! Trigger sessions
//!
//! A session walks one [`TriggerTimeline`] from a playback offset and fires
//! each remaining event at its due time, until the timeline is exhausted or
//! the session is cancelled.
//!
//! Timing model: the first trigger is armed against the event's absolute
//! start offset. Every later trigger is armed for the *next* event's own
//! `duration`, measured from the previous fire, not recomputed from the
//! session's reference time. Over a long track with a changing tempo this
//! can drift from the true position; the scheduler's periodic drift check is
//! what bounds it.

use beatsync_common::{Granularity, TriggerEvent, TriggerTimeline};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One trigger handed to the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredTrigger {
    /// Generation of the session that fired it
    pub generation: u64,
    /// Index of the event within its timeline
    pub index: usize,
    pub event: TriggerEvent,
    pub granularity: Granularity,
}

impl FiredTrigger {
    /// Hardware alternates on odd indices
    pub fn is_alternate(&self) -> bool {
        self.index % 2 == 1
    }
}

/// Receiver of fired triggers
///
/// Called from the session task at the trigger's due time, so implementations
/// must return immediately and push any slow work elsewhere.
pub trait TriggerSink: Send + Sync + 'static {
    fn on_trigger(&self, fired: FiredTrigger);
}

impl<F> TriggerSink for F
where
    F: Fn(FiredTrigger) + Send + Sync + 'static,
{
    fn on_trigger(&self, fired: FiredTrigger) {
        self(fired)
    }
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Every remaining event fired (possibly none)
    Completed { fired: usize },
    /// Stopped by its cancellation token
    Cancelled { fired: usize },
    /// The session task panicked or was aborted
    Aborted,
}

impl SessionOutcome {
    pub fn fired(&self) -> usize {
        match self {
            SessionOutcome::Completed { fired } | SessionOutcome::Cancelled { fired } => *fired,
            SessionOutcome::Aborted => 0,
        }
    }
}

/// Mutable run state, owned by the session task
#[derive(Debug)]
struct SessionState {
    /// Next event not yet fired
    cursor: usize,
    /// Playback offset the session was started at
    reference_offset: Duration,
    /// Local clock time the session was started at
    reference_time: Instant,
    fired: usize,
}

/// A single cancellable run over one timeline
pub struct TriggerSession {
    generation: u64,
    timeline: TriggerTimeline,
    start_offset: Duration,
    sink: Arc<dyn TriggerSink>,
    cancel: CancellationToken,
}

impl TriggerSession {
    pub fn new(
        generation: u64,
        timeline: TriggerTimeline,
        start_offset: Duration,
        sink: Arc<dyn TriggerSink>,
    ) -> Self {
        Self {
            generation,
            timeline,
            start_offset,
            sink,
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the session to completion or cancellation on the current task
    pub async fn run(self) -> SessionOutcome {
        let events = &self.timeline.events;
        let mut state = SessionState {
            cursor: self.timeline.next_index_after(self.start_offset),
            reference_offset: self.start_offset,
            reference_time: Instant::now(),
            fired: 0,
        };

        debug!(
            generation = self.generation,
            media_id = %self.timeline.media_id,
            granularity = %self.timeline.granularity,
            offset_ms = state.reference_offset.as_millis() as u64,
            next = state.cursor,
            total = events.len(),
            "Trigger session started"
        );

        let Some(first) = events.get(state.cursor) else {
            debug!(generation = self.generation, "No triggers ahead of offset, session complete");
            return SessionOutcome::Completed { fired: 0 };
        };

        let Some(mut deadline) = state
            .reference_time
            .checked_add(first.start.saturating_sub(state.reference_offset))
        else {
            warn!(generation = self.generation, index = state.cursor, "Trigger start out of clock range, session complete");
            return SessionOutcome::Completed { fired: 0 };
        };

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(generation = self.generation, fired = state.fired, "Trigger session cancelled");
                    return SessionOutcome::Cancelled { fired: state.fired };
                }
                _ = sleep_until(deadline) => {}
            }

            // The timer and a cancel can become ready together; never emit past a cancel
            if self.cancel.is_cancelled() {
                return SessionOutcome::Cancelled { fired: state.fired };
            }

            let fired_at = Instant::now();
            self.sink.on_trigger(FiredTrigger {
                generation: self.generation,
                index: state.cursor,
                event: events[state.cursor],
                granularity: self.timeline.granularity,
            });
            state.fired += 1;
            state.cursor += 1;

            // A deadline the clock cannot represent ends the session like the last event
            match events.get(state.cursor).and_then(|next| fired_at.checked_add(next.duration)) {
                Some(next_deadline) => deadline = next_deadline,
                None => {
                    debug!(
                        generation = self.generation,
                        fired = state.fired,
                        elapsed_ms = fired_at.duration_since(state.reference_time).as_millis() as u64,
                        "Trigger session complete"
                    );
                    return SessionOutcome::Completed { fired: state.fired };
                }
            }
        }
    }

    /// Run the session as a background task
    pub fn spawn(self) -> SessionHandle {
        let generation = self.generation;
        let media_id = self.timeline.media_id.clone();
        let granularity = self.timeline.granularity;
        let cancel = self.cancel.clone();
        let task = tokio::spawn(self.run());

        SessionHandle {
            generation,
            media_id,
            granularity,
            cancel,
            task,
        }
    }
}

/// Owner's handle on a running session
///
/// Dropping the handle does not stop the session; call [`SessionHandle::stop`].
pub struct SessionHandle {
    generation: u64,
    media_id: String,
    granularity: Granularity,
    cancel: CancellationToken,
    task: JoinHandle<SessionOutcome>,
}

impl SessionHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn media_id(&self) -> &str {
        &self.media_id
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Whether the session task has ended on its own or after a cancel
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel and wait until the session task has exited
    ///
    /// Once this returns, the session will not call its sink again.
    pub async fn stop(self) -> SessionOutcome {
        self.cancel.cancel();
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(generation = self.generation, "Trigger session task failed: {}", e);
                SessionOutcome::Aborted
            }
        }
    }

}
