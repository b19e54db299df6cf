//! Per-deck control signals and the player record.
//!
//! `PlayerInput` is the write-once-per-poll contract between the
//! coordination thread and the audio renderer. Every field is an individual
//! relaxed atomic: writes are torn-free, the realtime reader takes no lock,
//! and a value may be stale by at most one audio block. Do not wrap these
//! in any mutex the realtime thread could ever touch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::track::Track;
use crate::util::AtomicF64;

/// Control signals consumed by the audio subsystem, one record per deck.
#[derive(Debug)]
pub struct PlayerInput {
    /// Where the deck should be, in seconds. Unbounded.
    target_position: AtomicF64,
    /// Multiplicative pitch from the pitch-mode platter capture (1.0 = unison).
    pitch_note: AtomicF64,
    /// Multiplicative pitch from the fader.
    pitch_fader: AtomicF64,
    /// Per-deck gain contribution of the crossfader, 0..1.
    crossfader: AtomicF64,
    /// Volume knob, 0..1.
    volume_knob: AtomicF64,
    /// Slipmat is being held: follow `target_position` instead of free-running.
    touched: AtomicBool,
    /// Deck plays continuously regardless of the platter.
    just_play: AtomicBool,
    /// Transport stopped.
    stopped: AtomicBool,
    /// One-shot seek request in seconds; NaN when none is pending.
    seek_to: AtomicF64,
    /// Offset added to the rendered position, in seconds.
    position_offset: AtomicF64,
}

impl PlayerInput {
    pub fn new() -> Self {
        Self {
            target_position: AtomicF64::new(0.0),
            pitch_note: AtomicF64::new(1.0),
            pitch_fader: AtomicF64::new(1.0),
            crossfader: AtomicF64::new(0.0),
            volume_knob: AtomicF64::new(1.0),
            touched: AtomicBool::new(false),
            just_play: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            seek_to: AtomicF64::new(f64::NAN),
            position_offset: AtomicF64::new(0.0),
        }
    }

    pub fn target_position(&self) -> f64 {
        self.target_position.load()
    }

    pub fn set_target_position(&self, seconds: f64) {
        self.target_position.store(seconds);
    }

    pub fn pitch_note(&self) -> f64 {
        self.pitch_note.load()
    }

    pub fn set_pitch_note(&self, pitch: f64) {
        self.pitch_note.store(pitch);
    }

    pub fn pitch_fader(&self) -> f64 {
        self.pitch_fader.load()
    }

    pub fn set_pitch_fader(&self, pitch: f64) {
        self.pitch_fader.store(pitch);
    }

    pub fn crossfader(&self) -> f64 {
        self.crossfader.load()
    }

    pub fn set_crossfader(&self, gain: f64) {
        self.crossfader.store(gain);
    }

    pub fn volume_knob(&self) -> f64 {
        self.volume_knob.load()
    }

    pub fn set_volume_knob(&self, gain: f64) {
        self.volume_knob.store(gain);
    }

    pub fn touched(&self) -> bool {
        self.touched.load(Ordering::Relaxed)
    }

    pub fn set_touched(&self, touched: bool) {
        self.touched.store(touched, Ordering::Relaxed);
    }

    pub fn just_play(&self) -> bool {
        self.just_play.load(Ordering::Relaxed)
    }

    pub fn set_just_play(&self, just_play: bool) {
        self.just_play.store(just_play, Ordering::Relaxed);
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    pub fn set_stopped(&self, stopped: bool) {
        self.stopped.store(stopped, Ordering::Relaxed);
    }

    /// Queue a one-shot seek. Overwrites any pending request.
    pub fn request_seek(&self, seconds: f64) {
        self.seek_to.store(seconds);
    }

    /// Consume the pending seek request, if any. Called by the renderer.
    pub fn take_seek(&self) -> Option<f64> {
        let value = self.seek_to.swap(f64::NAN);
        (!value.is_nan()).then_some(value)
    }

    pub fn position_offset(&self) -> f64 {
        self.position_offset.load()
    }

    pub fn set_position_offset(&self, seconds: f64) {
        self.position_offset.store(seconds);
    }

    /// Reset both pitch contributions to unison.
    pub fn reset_pitch(&self) {
        self.pitch_note.store(1.0);
        self.pitch_fader.store(1.0);
    }
}

impl Default for PlayerInput {
    fn default() -> Self {
        Self::new()
    }
}

/// A deck's player: its shared control record plus the loaded track.
pub struct Player {
    pub input: Arc<PlayerInput>,
    track: Option<Arc<Track>>,
}

impl Player {
    pub fn new(input: Arc<PlayerInput>) -> Self {
        Self { input, track: None }
    }

    pub fn track(&self) -> Option<&Arc<Track>> {
        self.track.as_ref()
    }

    /// Install a new track, returning the previous one for release.
    pub fn set_track(&mut self, track: Arc<Track>) -> Option<Arc<Track>> {
        self.track.replace(track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let input = PlayerInput::new();
        assert_eq!(input.pitch_note(), 1.0);
        assert_eq!(input.pitch_fader(), 1.0);
        assert!(!input.touched());
        assert!(input.take_seek().is_none());
    }

    #[test]
    fn test_seek_is_one_shot() {
        let input = PlayerInput::new();
        input.request_seek(1.25);
        assert_eq!(input.take_seek(), Some(1.25));
        assert!(input.take_seek().is_none());
    }

    #[test]
    fn test_reset_pitch() {
        let input = PlayerInput::new();
        input.set_pitch_note(2.0);
        input.set_pitch_fader(1.5);
        input.reset_pitch();
        assert_eq!(input.pitch_note(), 1.0);
        assert_eq!(input.pitch_fader(), 1.0);
    }
}
