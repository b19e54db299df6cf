//! One-line user-visible status channel.
//!
//! The appliance has no screen worth speaking of; user-facing conditions
//! ("Error importing /media/track.mp3") are reduced to a single current
//! line with a level tag. A UI or the daemon picks the line up with
//! [`take`]; every line is mirrored to `tracing` so it also lands in the
//! logs.

use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Alert,
}

static CURRENT: Mutex<Option<(StatusLevel, String)>> = Mutex::new(None);

/// Replace the current status line.
pub fn set(level: StatusLevel, text: impl Into<String>) {
    let text = text.into();
    match level {
        StatusLevel::Info => tracing::info!(target: "status", "{text}"),
        StatusLevel::Alert => tracing::warn!(target: "status", "{text}"),
    }
    let mut current = CURRENT.lock().unwrap_or_else(|e| e.into_inner());
    *current = Some((level, text));
}

/// Take the current status line, leaving none.
pub fn take() -> Option<(StatusLevel, String)> {
    CURRENT.lock().unwrap_or_else(|e| e.into_inner()).take()
}
