//! One playback deck: player record, navigation, cues, encoder tracking.

use std::path::PathBuf;
use std::sync::Arc;

use crate::engine::cues::CueSheet;
use crate::engine::library::NavState;
use crate::engine::player::{Player, PlayerInput};
use crate::input::encoder::EncoderTracker;

/// A deck aggregates everything deck-scoped. Deck 0 plays straight
/// ("beat"); deck 1 is driven by the platter ("scratch"), and only its
/// [`EncoderTracker`] is ever advanced.
pub struct Deck {
    pub no: usize,
    pub player: Player,
    pub nav: NavState,
    pub cues: CueSheet,
    pub encoder: EncoderTracker,
    /// Importer program used for this deck's track loads.
    pub importer: PathBuf,
}

impl Deck {
    pub fn new(no: usize, importer: PathBuf, input: Arc<PlayerInput>, initial_volume: f64) -> Self {
        input.set_volume_knob(initial_volume);
        Self {
            no,
            player: Player::new(input),
            nav: NavState::default(),
            cues: CueSheet::default(),
            encoder: EncoderTracker::new(),
            importer,
        }
    }
}
