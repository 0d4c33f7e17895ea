//! HTTP API
//!
//! The gateway's messaging boundary: published events are streamed over
//! Server-Sent Events, and the set-trigger command arrives as a POST.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{create_router, run, AppContext};
