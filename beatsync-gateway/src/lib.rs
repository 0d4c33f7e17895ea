//! # BeatSync Gateway (beatsync-gateway)
//!
//! Keeps a light flash in step with a remote media player that can only be
//! polled.
//!
//! **Purpose:** Poll the player, detect when the running trigger schedule has
//! become invalid (pause, resume, track change, seek, granularity switch),
//! and drive a cancellable sequence of triggers against the local clock.
//!
//! **Architecture:** one polling task ([`sync::SchedulerLoop`]), at most one
//! session task ([`sync::TriggerSession`]), and one dispatcher task
//! ([`output::TriggerDispatcher`]) that publishes triggers and feeds the
//! hardware renderer. Published events are streamed over HTTP/SSE.

pub mod api;
pub mod error;
pub mod output;
pub mod player;
pub mod state;
pub mod sync;

pub use error::{Error, Result};
pub use state::SharedState;
