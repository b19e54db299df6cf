//! Process-wide modifier latch: shift and pitch mode.

/// Which deck the scratch platter's rotation is pitching, if any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PitchMode {
    #[default]
    Off,
    Beat,
    Scratch,
}

impl PitchMode {
    /// Deck index the mode applies to.
    pub fn deck(self) -> Option<usize> {
        match self {
            PitchMode::Off => None,
            PitchMode::Beat => Some(super::BEAT_DECK),
            PitchMode::Scratch => Some(super::SCRATCH_DECK),
        }
    }

    pub fn active(self) -> bool {
        self != PitchMode::Off
    }
}

/// Momentary shift plus the pitch-mode latch.
#[derive(Debug, Default)]
pub struct InputState {
    shifted: bool,
    pitch_mode: PitchMode,
}

impl InputState {
    pub fn is_shifted(&self) -> bool {
        self.shifted
    }

    pub fn set_shifted(&mut self, shifted: bool) {
        self.shifted = shifted;
    }

    pub fn toggle_shift(&mut self) {
        self.shifted = !self.shifted;
    }

    pub fn pitch_mode(&self) -> PitchMode {
        self.pitch_mode
    }

    pub fn set_pitch_mode(&mut self, mode: PitchMode) {
        self.pitch_mode = mode;
    }
}
