//! Contract with the audio rendering subsystem.
//!
//! The DSP kernel lives outside this crate. The core only needs this much
//! shape: file descriptors for the realtime poll loop, a non-blocking
//! `handle` to service them, the per-deck playback position and motor
//! speed the encoder engine re-synchronises against, track installation,
//! and a stats snapshot for the once-per-second status line.
//!
//! Every method may be called from the realtime thread except `start`,
//! `stop` and `set_track`; implementations must not allocate or block in
//! the realtime-callable ones.

use std::os::fd::RawFd;
use std::sync::Arc;

use crate::track::Track;

/// DSP load figures for the stats line.
#[derive(Debug, Clone, Copy, Default)]
pub struct DspStats {
    pub load_percent: f64,
    pub load_peak: f64,
    pub process_time_us: f64,
    pub budget_time_us: f64,
    pub xruns: u64,
}

/// The audio subsystem as seen by the control plane.
pub trait AudioBackend: Send + Sync {
    /// File descriptors the realtime thread should poll. Collected once at
    /// startup; an empty set means no realtime thread is needed.
    fn pollfds(&self) -> Vec<RawFd>;

    /// Begin audio output. Called after the realtime thread is up.
    fn start(&self);

    /// Stop audio output and make any polled fds return so the realtime
    /// thread can observe its finished flag.
    fn stop(&self);

    /// Service the device after poll reported activity. Realtime context:
    /// must not allocate, lock, or block.
    fn handle(&self);

    /// Current playback position of a deck, in seconds.
    fn position(&self, deck: usize) -> f64;

    /// Current motor speed of a deck (0.0 = stopped, 1.0 = nominal).
    fn motor_speed(&self, deck: usize) -> f64;

    /// Install a track on a deck. Coordination-thread only.
    fn set_track(&self, deck: usize, track: Arc<Track>);

    /// Load figures for the stats line.
    fn stats(&self) -> DspStats;
}
