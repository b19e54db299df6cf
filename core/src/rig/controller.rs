//! External controllers (MIDI surfaces etc.) serviced by the realtime
//! thread.

use std::os::fd::RawFd;

/// A controller device the realtime thread polls alongside the audio
/// device. `handle` runs in realtime context: no allocation, no locks.
pub trait Controller: Send + Sync {
    /// File descriptors to include in the realtime poll set. Collected
    /// once at startup.
    fn pollfds(&self) -> Vec<RawFd>;

    /// Service the device after poll activity.
    fn handle(&self);
}
