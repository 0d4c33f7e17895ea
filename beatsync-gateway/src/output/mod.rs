//! Trigger output: event publication and hardware rendering

pub mod dispatcher;
pub mod renderer;

pub use dispatcher::{HardwareOutput, TriggerDispatcher};
pub use renderer::{LogRenderer, Rgb, TriggerRenderer};
