//! Action handlers: where a resolved mapping meets the engine.

use tracing::debug;

use crate::control::mapping::{Action, EdgeType, Mapping};
use crate::engine::{Engine, PitchMode, BEAT_DECK};

/// Volume change per VolUp/VolDown dispatch (and per tick while held).
const VOLUME_STEP: f64 = 0.01;

/// Apply the action of a fired mapping. MIDI-sourced dispatches pass the
/// raw message through `midi`; GPIO dispatches pass `None`.
pub fn dispatch(mapping: Mapping, midi: Option<[u8; 3]>, engine: &mut Engine) {
    let _ = midi;
    match mapping.action {
        Action::Gnd | Action::Nothing => {}

        Action::NextFile => {
            if engine.deck(mapping.deck).nav.files_present {
                engine.next_file(mapping.deck);
            }
        }
        Action::PrevFile => {
            if engine.deck(mapping.deck).nav.files_present {
                engine.prev_file(mapping.deck);
            }
        }
        Action::RandomFile => {
            if engine.deck(mapping.deck).nav.files_present {
                engine.random_file(mapping.deck);
            }
        }

        Action::JogPitch => {
            let mode = if engine.input_state.pitch_mode().active() {
                PitchMode::Off
            } else if mapping.deck == BEAT_DECK {
                PitchMode::Beat
            } else {
                PitchMode::Scratch
            };
            debug!("jog pitch: mode now {mode:?}");
            engine.input_state.set_pitch_mode(mode);
        }

        Action::VolUp | Action::VolUpHold => adjust_volume(engine, mapping.deck, VOLUME_STEP),
        Action::VolDown | Action::VolDownHold => adjust_volume(engine, mapping.deck, -VOLUME_STEP),

        Action::Cue(slot) => {
            let shifted = engine.input_state.is_shifted();
            let deck = engine.deck_mut(mapping.deck);
            if shifted {
                let position = deck.player.input.target_position();
                deck.cues.set(usize::from(slot), position);
                debug!("deck {}: cue {slot} set", mapping.deck);
            } else if let Some(seconds) = deck.cues.get(usize::from(slot)) {
                deck.player.input.request_seek(seconds);
                debug!("deck {}: cue {slot} -> {seconds:.3}s", mapping.deck);
            }
        }

        Action::StartStop => {
            let input = &engine.deck(mapping.deck).player.input;
            input.set_stopped(!input.stopped());
        }

        Action::Shift => {
            // Momentary: the press edge sets, the release edge clears.
            let shifted = matches!(
                mapping.edge,
                EdgeType::Pressed | EdgeType::PressedShifted
            );
            engine.input_state.set_shifted(shifted);
        }

        Action::Record => engine.record(mapping.deck),
        Action::LoopErase => engine.loop_erase(mapping.deck),
    }
}

fn adjust_volume(engine: &mut Engine, deck_no: usize, delta: f64) {
    let max = engine.settings.max_volume;
    let input = &engine.deck(deck_no).player.input;
    let volume = (input.volume_knob() + delta).clamp(0.0, max);
    input.set_volume_knob(volume);
}
