//! Topic names used on the messaging boundary

/// Media that a new trigger session was started for
pub const NEW_MEDIA: &str = "media/new";

/// Feature summary of the media a session was started for
pub const MEDIA_FEATURES: &str = "media/features";

/// One fired trigger
pub const TRIGGER_FIRED: &str = "trigger/fired";

/// Trigger granularity changed by an external command
pub const TRIGGER_GRANULARITY: &str = "trigger/granularity";

pub const ALL: [&str; 4] = [NEW_MEDIA, MEDIA_FEATURES, TRIGGER_FIRED, TRIGGER_GRANULARITY];
