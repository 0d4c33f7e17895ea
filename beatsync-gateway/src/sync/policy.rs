//! Re-synchronization policy
//!
//! Pure decision over a [`Classification`]: must the running session stop,
//! must a new one start, or both (a restart). Any doubt about whether the
//! current schedule is still valid resolves to stop-and-restart.

use super::tracker::Classification;

/// Outcome of one policy evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResyncDecision {
    pub must_stop: bool,
    pub must_start: bool,
}

impl ResyncDecision {
    pub const NONE: ResyncDecision = ResyncDecision {
        must_stop: false,
        must_start: false,
    };

    pub fn is_restart(&self) -> bool {
        self.must_stop && self.must_start
    }
}

/// Decide what to do with the session for this poll
///
/// * `was_detecting` - a session was recorded as live before this poll
/// * `granularity_changed` - the requested granularity differs from the last poll
pub fn decide(classification: &Classification, was_detecting: bool, granularity_changed: bool) -> ResyncDecision {
    let Classification {
        play_state_changed,
        media_changed,
        progress_drifted,
        is_playing,
    } = *classification;

    // Should be running but is not, e.g. after a failed timeline fetch
    let playing_without_detection = !was_detecting && is_playing;
    let granularity_switch = granularity_changed && is_playing;

    let invalidated = (play_state_changed && !is_playing) || media_changed || progress_drifted || granularity_switch;

    ResyncDecision {
        must_stop: invalidated && !playing_without_detection,
        must_start: (play_state_changed && is_playing)
            || media_changed
            || progress_drifted
            || playing_without_detection
            || granularity_switch,
    }
}
