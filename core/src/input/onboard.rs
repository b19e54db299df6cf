//! Onboard four-button gesture machine.
//!
//! The four buttons next to the platter are chorded: a short press acts on
//! the set of buttons seen over the whole press (instant actions), a long
//! press acts on the buttons held right now (held actions). The machine
//! emits decoded gestures; the board layer applies them to the engine.

use tracing::{debug, warn};

/// Ticks of all-released needed to leave the cooldown state.
const RELEASE_TICKS: u32 = 20;

/// Decoded gesture for the board layer to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    /// First-ever press: play the boot confirmation sound.
    BootSound,
    ScratchPrevFile,
    ScratchNextFile,
    ScratchPrevFolder,
    ScratchNextFolder,
    ScratchRandomFile,
    BeatPrevFile,
    BeatNextFile,
    BeatPrevFolder,
    BeatNextFolder,
    BeatRandomFile,
    /// Enter pitch mode targeting the scratch deck.
    PitchModeScratch,
    /// Enter pitch mode targeting the beat deck.
    PitchModeBeat,
    /// Leave pitch mode (any instant gesture while it is active).
    PitchModeOff,
    /// All four buttons tapped: toggle the shift latch.
    ShiftLatch,
    /// All four buttons held: record a loop onto the beat deck.
    RecordBeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    None,
    Pressing,
    ActingInstant,
    ActingHeld,
    Waiting,
}

/// Context the decoder needs from the engine, captured per tick.
#[derive(Debug, Clone, Copy)]
pub struct GestureContext {
    pub first_time: bool,
    pub pitch_mode_active: bool,
    pub scratch_files_present: bool,
    pub beat_files_present: bool,
}

/// The machine itself: state, the OR-latch of buttons seen this press, and
/// a tick counter shared by the hold and cooldown phases.
#[derive(Debug)]
pub struct OnboardButtons {
    state: State,
    total: [bool; 4],
    counter: u32,
}

impl OnboardButtons {
    pub fn new() -> Self {
        Self {
            state: State::None,
            total: [false; 4],
            counter: 0,
        }
    }

    /// Advance one tick with the current button levels. At most one
    /// gesture is emitted per press cycle.
    pub fn step(
        &mut self,
        buttons: [bool; 4],
        ctx: GestureContext,
        hold_time: u32,
    ) -> Option<Gesture> {
        let any = buttons.iter().any(|&b| b);

        match self.state {
            State::None => {
                if any {
                    self.state = State::Pressing;
                    if ctx.first_time {
                        // Audible confirmation that the unit booted.
                        self.state = State::Waiting;
                        return Some(Gesture::BootSound);
                    }
                }
                None
            }

            State::Pressing => {
                for (latched, &now) in self.total.iter_mut().zip(buttons.iter()) {
                    *latched |= now;
                }

                if !any {
                    self.state = State::ActingInstant;
                }

                self.counter += 1;
                if self.counter > hold_time {
                    self.counter = 0;
                    self.state = State::ActingHeld;
                }
                None
            }

            State::ActingInstant => {
                self.state = State::Waiting;
                let gesture = self.decode_instant(ctx);
                if gesture.is_none() {
                    warn!("unrecognised button gesture {:?}", self.total);
                }
                gesture
            }

            State::ActingHeld => {
                self.state = State::Waiting;
                let gesture = self.decode_held(buttons, ctx);
                if gesture.is_none() {
                    warn!("unrecognised held gesture {buttons:?}");
                }
                gesture
            }

            State::Waiting => {
                self.counter += 1;
                if any {
                    self.counter = 0;
                }
                if self.counter > RELEASE_TICKS {
                    self.counter = 0;
                    self.state = State::None;
                    self.total = [false; 4];
                }
                None
            }
        }
    }

    /// Decode using the accumulated press set.
    fn decode_instant(&self, ctx: GestureContext) -> Option<Gesture> {
        // Any instant gesture while pitch mode is active just leaves it.
        if ctx.pitch_mode_active {
            debug!("pitch mode disabled");
            return Some(Gesture::PitchModeOff);
        }

        let scratch = ctx.scratch_files_present;
        let beat = ctx.beat_files_present;
        match self.total {
            [true, false, false, false] if scratch => Some(Gesture::ScratchPrevFile),
            [false, true, false, false] if scratch => Some(Gesture::ScratchNextFile),
            [true, true, false, false] if scratch => Some(Gesture::PitchModeScratch),
            [false, false, true, false] if beat => Some(Gesture::BeatPrevFile),
            [false, false, false, true] if beat => Some(Gesture::BeatNextFile),
            [false, false, true, true] if beat => Some(Gesture::PitchModeBeat),
            [true, true, true, true] => Some(Gesture::ShiftLatch),
            _ => None,
        }
    }

    /// Decode using the buttons held right now.
    fn decode_held(&self, buttons: [bool; 4], ctx: GestureContext) -> Option<Gesture> {
        let scratch = ctx.scratch_files_present;
        let beat = ctx.beat_files_present;
        match buttons {
            [true, false, false, false] if scratch => Some(Gesture::ScratchPrevFolder),
            [false, true, false, false] if scratch => Some(Gesture::ScratchNextFolder),
            [true, true, false, false] if scratch => Some(Gesture::ScratchRandomFile),
            [false, false, true, false] if beat => Some(Gesture::BeatPrevFolder),
            [false, false, false, true] if beat => Some(Gesture::BeatNextFolder),
            [false, false, true, true] if beat => Some(Gesture::BeatRandomFile),
            [true, true, true, true] if scratch => Some(Gesture::RecordBeat),
            _ => None,
        }
    }
}

impl Default for OnboardButtons {
    fn default() -> Self {
        Self::new()
    }
}
