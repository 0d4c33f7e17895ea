//! Playback-synchronized trigger scheduling
//!
//! - [`tracker`]: classify each polled snapshot against the previous one
//! - [`policy`]: decide whether the running session must stop and/or start
//! - [`session`]: fire one timeline's triggers on the local clock
//! - [`scheduler`]: the polling loop tying them together

pub mod policy;
pub mod scheduler;
pub mod session;
pub mod tracker;

pub use policy::{decide, ResyncDecision};
pub use scheduler::{SchedulerLoop, TickOutcome, TickReport};
pub use session::{FiredTrigger, SessionHandle, SessionOutcome, TriggerSession, TriggerSink};
pub use tracker::{Classification, PlaybackStateTracker, DEFAULT_DRIFT_TOLERANCE};
