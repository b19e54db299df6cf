//! Encoder tracking engine.
//!
//! Reconciles three sources of truth on different clocks (the wrapping
//! 12-bit angle sensor, the audio thread's playback position, and the
//! capacitive touch flag) into one unbounded target position, or, in
//! pitch mode, a pitch value the renderer can interpolate against.

use tracing::debug;

use crate::engine::{PitchMode, PlayerInput};
use crate::settings::Settings;

/// Sentinel for "no sample accepted yet".
pub const UNINITIALISED: u16 = 0xFFFF;

/// Counts per revolution of the sensor.
const STEPS_PER_TURN: i32 = 4096;

/// Wrap detection bands: a jump from the top quarter to the bottom quarter
/// (or back) is a zero crossing, not a glitch.
const WRAP_LOW: u16 = 1024;
const WRAP_HIGH: u16 = 3072;

/// Samples further than this from the last accepted value are suspect.
const GLITCH_THRESHOLD: i32 = 100;

/// One full revolution maps to ±0.25 of pitch.
const PITCH_SCALE: f64 = 16384.0;

/// Readings the tracker needs from the audio subsystem this tick.
#[derive(Debug, Clone, Copy)]
pub struct AudioSnapshot {
    pub scratch_position: f64,
    pub motor_speed: f64,
}

/// Wrap-aware angular integrator with glitch filtering.
#[derive(Debug)]
pub struct EncoderTracker {
    /// Last raw sample (post reversal).
    pub angle_raw: u16,
    /// Last accepted sample.
    pub angle: u16,
    /// Accumulated wraps × 4096 plus the re-sync bias.
    pub offset: i32,
    /// Consecutive rejected samples.
    blips: u32,
    /// Pitch mode seen on the previous accepted tick.
    old_pitch_mode: PitchMode,
}

impl EncoderTracker {
    pub fn new() -> Self {
        Self {
            angle_raw: 0,
            angle: UNINITIALISED,
            offset: 0,
            blips: 0,
            old_pitch_mode: PitchMode::Off,
        }
    }

    /// Feed one sensor sample. Writes the scratch deck's target position
    /// (or the selected deck's pitch) into the shared control records.
    pub fn update(
        &mut self,
        raw: u16,
        cap_touched: bool,
        pitch_mode: PitchMode,
        audio: AudioSnapshot,
        settings: &Settings,
        beat_input: &PlayerInput,
        scratch_input: &PlayerInput,
    ) {
        let raw = if settings.jog_reverse { 4095 - raw } else { raw };
        self.angle_raw = raw;

        // First sample seeds the accepted angle so there is no spurious diff.
        if self.angle == UNINITIALISED {
            self.angle = raw;
        }

        // Wrap detection around zero.
        let (crossed_zero, wrapped_angle) = if raw < WRAP_LOW && self.angle >= WRAP_HIGH {
            (1i32, i32::from(self.angle) - STEPS_PER_TURN)
        } else if raw >= WRAP_HIGH && self.angle < WRAP_LOW {
            (-1i32, i32::from(self.angle) + STEPS_PER_TURN)
        } else {
            (0i32, i32::from(self.angle))
        };

        // Glitch filter: the sensor spikes several hundred counts during
        // motion. Reject at most one in a row; forcing acceptance after two
        // keeps the engine responsive under sustained noise.
        if (i32::from(raw) - wrapped_angle).abs() > GLITCH_THRESHOLD && self.blips < 2 {
            self.blips += 1;
            return;
        }
        self.blips = 0;
        self.angle = raw;

        if pitch_mode.active() {
            let pitched_input = match pitch_mode {
                PitchMode::Beat => beat_input,
                _ => scratch_input,
            };

            if !self.old_pitch_mode.active() {
                // Capture the current platter position as unison.
                pitched_input.set_pitch_note(1.0);
                self.offset = -i32::from(self.angle);
                scratch_input.set_touched(false);
            }

            self.offset += crossed_zero * STEPS_PER_TURN;

            let pitch = f64::from(i32::from(self.angle) + self.offset) / PITCH_SCALE + 1.0;
            pitched_input.set_pitch_note(pitch);
        } else {
            if settings.platter_enabled {
                if cap_touched || audio.motor_speed == 0.0 {
                    // Grabbing the platter (or a stopped motor) re-anchors
                    // the angular frame to the audio position.
                    let leaving_pitch_mode =
                        self.old_pitch_mode.active() && !scratch_input.stopped();
                    if !scratch_input.touched() || leaving_pitch_mode {
                        self.offset = (audio.scratch_position
                            * f64::from(settings.platter_speed)
                            - f64::from(self.angle)) as i32;
                        debug!("slipmat touch at {:.3}s", audio.scratch_position);
                        scratch_input.set_target_position(audio.scratch_position);
                        scratch_input.set_touched(true);
                    }
                } else {
                    scratch_input.set_touched(false);
                }
            } else {
                // Without a platter the deck always follows the encoder.
                scratch_input.set_touched(true);
            }

            self.offset += crossed_zero * STEPS_PER_TURN;

            scratch_input.set_target_position(
                f64::from(i32::from(self.angle) + self.offset)
                    / f64::from(settings.platter_speed),
            );
        }

        self.old_pitch_mode = pitch_mode;
    }
}

impl Default for EncoderTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        tracker: EncoderTracker,
        settings: Settings,
        beat: PlayerInput,
        scratch: PlayerInput,
    }

    impl Fixture {
        fn new() -> Self {
            let mut settings = Settings::default();
            settings.platter_speed = 4096; // one turn per second keeps sums easy
            Self {
                tracker: EncoderTracker::new(),
                settings,
                beat: PlayerInput::new(),
                scratch: PlayerInput::new(),
            }
        }

        fn tick(&mut self, raw: u16, touched: bool) {
            self.tracker.update(
                raw,
                touched,
                PitchMode::Off,
                AudioSnapshot {
                    scratch_position: 0.0,
                    motor_speed: 1.0,
                },
                &self.settings,
                &self.beat,
                &self.scratch,
            );
        }

        fn tick_pitch(&mut self, raw: u16, mode: PitchMode) {
            self.tracker.update(
                raw,
                false,
                mode,
                AudioSnapshot {
                    scratch_position: 0.0,
                    motor_speed: 1.0,
                },
                &self.settings,
                &self.beat,
                &self.scratch,
            );
        }
    }

    #[test]
    fn test_first_sample_seeds_without_motion() {
        let mut f = Fixture::new();
        f.tick(3000, true);
        assert_eq!(f.tracker.angle, 3000);
        assert_eq!(f.tracker.blips, 0);
    }

    #[test]
    fn test_forward_wrap_then_back_restores_position() {
        // Cross zero going forward once, then backward once: offset and
        // target must return to their starting values.
        let mut f = Fixture::new();
        f.tick(4090, true);
        let start_offset = f.tracker.offset;
        let start_target = f.scratch.target_position();

        f.tick(50, true); // forward across zero
        assert_eq!(f.tracker.offset, start_offset + STEPS_PER_TURN);
        f.tick(4090, true); // backward across zero
        assert_eq!(f.tracker.offset, start_offset);
        assert!((f.scratch.target_position() - start_target).abs() < 1e-9);
    }

    #[test]
    fn test_single_spike_is_transparent() {
        // A lone spike >100 counts away must not perturb the output.
        let mut f = Fixture::new();
        f.tick(1000, true);
        f.tick(1010, true);
        let before = f.scratch.target_position();
        f.tick(2500, true); // spike
        assert_eq!(f.scratch.target_position(), before);
        assert_eq!(f.tracker.angle, 1010);
        f.tick(1020, true);
        assert_eq!(f.tracker.angle, 1020);
    }

    #[test]
    fn test_two_spikes_resume_acceptance() {
        // Sustained deviation is real motion: accept on the second sample.
        let mut f = Fixture::new();
        f.tick(1000, true);
        f.tick(2500, true); // rejected
        assert_eq!(f.tracker.angle, 1000);
        f.tick(2510, true); // accepted (second consecutive)
        assert_eq!(f.tracker.angle, 2510);
    }

    #[test]
    fn test_per_tick_step_bounded_by_one_turn() {
        let mut f = Fixture::new();
        f.tick(0, true);
        let mut prev = f.scratch.target_position();
        let bound = f64::from(STEPS_PER_TURN) / f64::from(f.settings.platter_speed) + 1e-9;
        for raw in [90u16, 180, 270, 4090, 4000, 100, 190] {
            f.tick(raw, true);
            let target = f.scratch.target_position();
            assert!(
                (target - prev).abs() <= bound,
                "step {} -> {} exceeds one turn",
                prev,
                target
            );
            prev = target;
        }
    }

    #[test]
    fn test_jog_reverse_mirrors_angle() {
        let mut f = Fixture::new();
        f.settings.jog_reverse = true;
        f.tick(100, true);
        assert_eq!(f.tracker.angle, 3995);
    }

    #[test]
    fn test_platter_disabled_forces_touch() {
        let mut f = Fixture::new();
        f.settings.platter_enabled = false;
        f.tick(500, false);
        assert!(f.scratch.touched());
    }

    #[test]
    fn test_release_clears_touch() {
        let mut f = Fixture::new();
        f.tick(500, true);
        assert!(f.scratch.touched());
        f.tick(510, false);
        assert!(!f.scratch.touched());
    }

    #[test]
    fn test_resync_anchors_offset_to_audio_position() {
        let mut f = Fixture::new();
        f.tick(0, false);
        // Touch at 2.5 s of audio: offset = trunc(2.5 * 4096) - angle.
        f.tracker.update(
            1000,
            true,
            PitchMode::Off,
            AudioSnapshot {
                scratch_position: 2.5,
                motor_speed: 1.0,
            },
            &f.settings,
            &f.beat,
            &f.scratch,
        );
        assert_eq!(f.tracker.offset, 2.5_f64.mul_add(4096.0, -1000.0) as i32);
        assert!((f.scratch.target_position() - 2.5).abs() < 1e-3);
        assert!(f.scratch.touched());
    }

    #[test]
    fn test_stopped_motor_holds_touch() {
        let mut f = Fixture::new();
        f.tracker.update(
            100,
            false,
            PitchMode::Off,
            AudioSnapshot {
                scratch_position: 1.0,
                motor_speed: 0.0,
            },
            &f.settings,
            &f.beat,
            &f.scratch,
        );
        assert!(f.scratch.touched());
    }

    #[test]
    fn test_pitch_mode_captures_unison() {
        let mut f = Fixture::new();
        f.tick(2000, false);
        f.tick_pitch(2000, PitchMode::Scratch);
        // Entering pitch mode: current angle becomes the unison reference.
        assert_eq!(f.tracker.offset, -2000);
        assert_eq!(f.scratch.pitch_note(), 1.0);
        assert!(!f.scratch.touched());

        // A quarter turn forward raises pitch by 1024/16384.
        f.tick_pitch(2100, PitchMode::Scratch);
        let expected = 100.0 / PITCH_SCALE + 1.0;
        assert!((f.scratch.pitch_note() - expected).abs() < 1e-9);
        assert_eq!(f.beat.pitch_note(), 1.0);
    }

    #[test]
    fn test_pitch_mode_beat_targets_beat_deck() {
        let mut f = Fixture::new();
        f.tick(1000, false);
        f.tick_pitch(1000, PitchMode::Beat);
        f.tick_pitch(1080, PitchMode::Beat);
        assert!((f.beat.pitch_note() - (80.0 / PITCH_SCALE + 1.0)).abs() < 1e-9);
        // Scratch pitch untouched by beat-deck capture.
        assert_eq!(f.scratch.pitch_note(), 1.0);
    }

    #[test]
    fn test_pitch_mode_wrap_accumulates() {
        let mut f = Fixture::new();
        f.tick(4090, false);
        f.tick_pitch(4090, PitchMode::Scratch);
        f.tick_pitch(30, PitchMode::Scratch); // forward across zero
        let expected = f64::from(30 + (-4090 + STEPS_PER_TURN)) / PITCH_SCALE + 1.0;
        assert!((f.scratch.pitch_note() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_leaving_pitch_mode_resyncs() {
        let mut f = Fixture::new();
        f.tick(1000, false);
        f.tick_pitch(1000, PitchMode::Scratch);
        // Back to normal mode with the motor running and no touch: the
        // pitch-mode exit still re-anchors to the audio position.
        f.tracker.update(
            1080,
            true,
            PitchMode::Off,
            AudioSnapshot {
                scratch_position: 3.0,
                motor_speed: 1.0,
            },
            &f.settings,
            &f.beat,
            &f.scratch,
        );
        assert!(f.scratch.touched());
        assert!((f.scratch.target_position() - 3.0).abs() < 1e-3);
    }
}
