//! Input and coordination core for the platterbox two-deck turntable
//! appliance.
//!
//! This crate is the control plane between the board's sensors (magnetic
//! rotary encoder, capacitive slipmat, buttons, faders) and the realtime
//! audio renderer. It owns:
//!
//! - the encoder tracking engine (wrap-aware integration, glitch filtering,
//!   slip-mat re-synchronisation, pitch-mode capture)
//! - the button debounce and gesture state machines
//! - the track store (refcounted PCM buffers fed by an importer subprocess)
//! - the realtime / coordination thread split and its safety assertions
//!
//! The DSP itself is out of scope: it plugs in behind [`engine::AudioBackend`]
//! and consumes the per-deck control signals in [`engine::PlayerInput`].

pub mod control;
pub mod engine;
pub mod error;
pub mod input;
pub mod platform;
pub mod rig;
pub mod settings;
pub mod track;
pub mod util;

pub use engine::{AudioBackend, Deck, Engine, PlayerInput, BEAT_DECK, SCRATCH_DECK};
pub use error::{Error, Result};
pub use rig::Rig;
pub use settings::Settings;
pub use track::Track;
