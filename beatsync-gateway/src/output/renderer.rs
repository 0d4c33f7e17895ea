//! Hardware rendering seam
//!
//! A renderer turns one trigger into a physical effect. Rendering may block
//! for the whole effect (a flash that lasts the trigger's duration), so the
//! dispatcher always calls it from a blocking task.

use beatsync_common::config::parse_hex_color;
use std::fmt;
use std::time::Duration;

/// Flash color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const RED: Rgb = Rgb { r: 255, g: 0, b: 0 };

    /// Parse `#rrggbb`
    pub fn parse(value: &str) -> beatsync_common::Result<Self> {
        let (r, g, b) = parse_hex_color(value)?;
        Ok(Self { r, g, b })
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Physical trigger output
pub trait TriggerRenderer: Send + Sync + 'static {
    /// Render one trigger
    ///
    /// `alternate` flips on every other trigger so the effect can alternate
    /// (e.g. left/right half of a light strip).
    fn render_trigger(&self, color: Rgb, duration: Duration, alternate: bool);
}

/// Renderer that writes each flash to the log
///
/// Used when no light driver is attached to the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRenderer;

impl TriggerRenderer for LogRenderer {
    fn render_trigger(&self, color: Rgb, duration: Duration, alternate: bool) {
        tracing::info!(
            target: "beatsync_gateway::hardware",
            color = %color,
            duration_ms = duration.as_millis() as u64,
            alternate,
            "Flash"
        );
    }
}
