//! The engine facade: decks, crossfader, modifier latch, settings, and the
//! seams to the audio subsystem and the coordination rig.

pub mod audio;
pub mod crossfader;
pub mod cues;
pub mod deck;
pub mod input_state;
pub mod library;
pub mod player;

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::control::mapping::MappingTable;
use crate::rig::Rig;
use crate::settings::Settings;
use crate::track;
use crate::util::status::{self, StatusLevel};

pub use audio::{AudioBackend, DspStats};
pub use crossfader::Crossfader;
pub use deck::Deck;
pub use input_state::{InputState, PitchMode};
pub use library::NavState;
pub use player::{Player, PlayerInput};

/// Deck index of the straight-playing deck.
pub const BEAT_DECK: usize = 0;
/// Deck index of the platter-driven deck.
pub const SCRATCH_DECK: usize = 1;

/// Everything the control plane coordinates, aggregated.
///
/// Owned by the coordination thread. The only parts the realtime side ever
/// sees are the per-deck [`PlayerInput`] records (shared `Arc`s of atomics)
/// and the [`AudioBackend`] handle.
pub struct Engine {
    pub settings: Settings,
    pub beat_deck: Deck,
    pub scratch_deck: Deck,
    pub crossfader: Crossfader,
    pub input_state: InputState,
    pub mappings: MappingTable,
    pub audio: Arc<dyn AudioBackend>,
    pub rig: Arc<Rig>,
}

impl Engine {
    /// Assemble the engine. `inputs` are the shared control records, in
    /// deck order; hand the same `Arc`s to the audio backend.
    pub fn new(
        settings: Settings,
        audio: Arc<dyn AudioBackend>,
        rig: Arc<Rig>,
        inputs: [Arc<PlayerInput>; 2],
        music_root: Option<&Path>,
    ) -> Self {
        let [beat_input, scratch_input] = inputs;
        let mut beat_deck = Deck::new(
            BEAT_DECK,
            settings.importer.clone(),
            beat_input,
            settings.initial_volume,
        );
        let mut scratch_deck = Deck::new(
            SCRATCH_DECK,
            settings.importer.clone(),
            scratch_input,
            settings.initial_volume,
        );

        if let Some(root) = music_root {
            beat_deck.nav = NavState::scan(root);
            scratch_deck.nav = NavState::scan(root);
        }

        Self {
            settings,
            beat_deck,
            scratch_deck,
            crossfader: Crossfader::new(),
            input_state: InputState::default(),
            mappings: MappingTable::stock_layout(),
            audio,
            rig,
        }
    }

    pub fn deck(&self, no: usize) -> &Deck {
        match no {
            BEAT_DECK => &self.beat_deck,
            _ => &self.scratch_deck,
        }
    }

    pub fn deck_mut(&mut self, no: usize) -> &mut Deck {
        match no {
            BEAT_DECK => &mut self.beat_deck,
            _ => &mut self.scratch_deck,
        }
    }

    /// Import `path` onto a deck, releasing whatever was loaded before.
    pub fn load_track(&mut self, deck_no: usize, path: &Path) {
        let rate = self.settings.sample_rate;
        let rig = self.rig.clone();
        let audio = self.audio.clone();
        let deck = self.deck_mut(deck_no);
        let importer = deck.importer.clone();

        match rig.acquire_track(&importer, path, rate) {
            Ok(new_track) => {
                info!("deck {deck_no}: loading '{}'", path.display());
                let old = deck.player.set_track(new_track.clone());
                deck.cues.load_from_file(path);
                audio.set_track(deck_no, new_track);
                if let Some(old) = old {
                    rig.release_track(old);
                }
            }
            Err(e) => {
                status::set(StatusLevel::Alert, format!("Error importing {}", path.display()));
                tracing::warn!("deck {deck_no}: {e}");
            }
        }
    }

    /// Load the file under the deck's navigation cursor after a move.
    fn load_nav_selection(&mut self, deck_no: usize, selected: Option<std::path::PathBuf>) {
        if let Some(path) = selected {
            self.load_track(deck_no, &path);
        }
    }

    pub fn next_file(&mut self, deck_no: usize) {
        let selected = self.deck_mut(deck_no).nav.next_file().map(Path::to_path_buf);
        self.load_nav_selection(deck_no, selected);
    }

    pub fn prev_file(&mut self, deck_no: usize) {
        let selected = self.deck_mut(deck_no).nav.prev_file().map(Path::to_path_buf);
        self.load_nav_selection(deck_no, selected);
    }

    pub fn random_file(&mut self, deck_no: usize) {
        let selected = self
            .deck_mut(deck_no)
            .nav
            .random_file()
            .map(Path::to_path_buf);
        self.load_nav_selection(deck_no, selected);
    }

    pub fn next_folder(&mut self, deck_no: usize) {
        let selected = self
            .deck_mut(deck_no)
            .nav
            .next_folder()
            .map(Path::to_path_buf);
        self.load_nav_selection(deck_no, selected);
    }

    pub fn prev_folder(&mut self, deck_no: usize) {
        let selected = self
            .deck_mut(deck_no)
            .nav
            .prev_folder()
            .map(Path::to_path_buf);
        self.load_nav_selection(deck_no, selected);
    }

    /// Start a loop recording on a deck: install a fresh in-memory track
    /// for the DSP to write into and let it free-run.
    pub fn record(&mut self, deck_no: usize) {
        let rate = self.settings.sample_rate;
        let rig = self.rig.clone();
        let audio = self.audio.clone();
        let deck = self.deck_mut(deck_no);

        let recording = track::acquire_for_recording(rate);
        status::set(StatusLevel::Info, "Recording loop");
        let old = deck.player.set_track(recording.clone());
        deck.player.input.set_just_play(true);
        audio.set_track(deck_no, recording);
        if let Some(old) = old {
            rig.release_track(old);
        }
    }

    /// Drop a recorded loop, leaving the deck silent.
    pub fn loop_erase(&mut self, deck_no: usize) {
        let rig = self.rig.clone();
        let audio = self.audio.clone();
        let deck = self.deck_mut(deck_no);

        let empty = track::acquire_empty();
        status::set(StatusLevel::Info, "Loop erased");
        let old = deck.player.set_track(empty.clone());
        audio.set_track(deck_no, empty);
        if let Some(old) = old {
            rig.release_track(old);
        }
    }
}
