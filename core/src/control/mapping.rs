//! The mapping table: (port, pin, edge) → action.
//!
//! Entries are configuration, fixed after init (the only post-init
//! mutation is the one-time I²C-bus conflict mask). The mutable per-button
//! runtime state lives in a parallel vector so an entry itself can be
//! copied around freely.

use crate::engine::{BEAT_DECK, SCRATCH_DECK};

/// What kind of event source a mapping listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingKind {
    Io,
    Midi,
    Adc,
}

/// Which edge of a button's life cycle a mapping fires on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeType {
    Pressed,
    Released,
    Holding,
    PressedShifted,
    ReleasedShifted,
    HoldingShifted,
}

/// The action a mapping dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Pin is wired as a ground reference: driven low, never dispatched.
    Gnd,
    Nothing,
    Record,
    LoopErase,
    NextFile,
    PrevFile,
    RandomFile,
    /// Toggle pitch mode for the mapping's deck.
    JogPitch,
    VolUp,
    VolDown,
    /// Auto-repeating volume step while held.
    VolUpHold,
    VolDownHold,
    /// Jump to (or, shifted, set) a cue slot.
    Cue(u8),
    StartStop,
    /// Momentary shift modifier.
    Shift,
}

/// One configured mapping entry.
#[derive(Debug, Clone, Copy)]
pub struct Mapping {
    pub kind: MappingKind,
    pub port: u8,
    pub pin: u8,
    pub pullup: bool,
    pub edge: EdgeType,
    pub action: Action,
    pub deck: usize,
}

/// Runtime debounce state for one mapping.
///
/// `debounce == 0` idle; positive counts pressed ticks; negative counts the
/// post-release cool-down back up to zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct ButtonState {
    pub debounce: i32,
    pub shifted_at_press: bool,
}

/// The ordered mapping table plus per-entry runtime state.
pub struct MappingTable {
    entries: Vec<Mapping>,
    states: Vec<ButtonState>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            states: Vec::new(),
        }
    }

    /// The wiring of the stock board: transport and cue buttons on the
    /// expander (port 0), volume rockers on SoC port 2, shift on the
    /// expander, and a handful of ground-reference pins.
    pub fn stock_layout() -> Self {
        let mut table = Self::new();

        let io = |port, pin, pullup, edge, action, deck| Mapping {
            kind: MappingKind::Io,
            port,
            pin,
            pullup,
            edge,
            action,
            deck,
        };

        // Expander bank: per-deck transport and cues.
        for (deck, base) in [(BEAT_DECK, 0u8), (SCRATCH_DECK, 4u8)] {
            table.push(io(0, base, true, EdgeType::Pressed, Action::StartStop, deck));
            table.push(io(0, base + 1, true, EdgeType::Pressed, Action::Cue(0), deck));
            table.push(io(
                0,
                base + 1,
                true,
                EdgeType::PressedShifted,
                Action::Cue(1),
                deck,
            ));
            table.push(io(0, base + 2, true, EdgeType::Pressed, Action::PrevFile, deck));
            table.push(io(
                0,
                base + 2,
                true,
                EdgeType::Holding,
                Action::RandomFile,
                deck,
            ));
            table.push(io(0, base + 3, true, EdgeType::Pressed, Action::NextFile, deck));
        }

        // Shift key (momentary: both edges).
        table.push(io(0, 8, true, EdgeType::Pressed, Action::Shift, BEAT_DECK));
        table.push(io(0, 8, true, EdgeType::Released, Action::Shift, BEAT_DECK));

        // Loop controls.
        table.push(io(0, 9, true, EdgeType::Holding, Action::Record, BEAT_DECK));
        table.push(io(
            0,
            9,
            true,
            EdgeType::HoldingShifted,
            Action::LoopErase,
            BEAT_DECK,
        ));

        // Volume rockers on SoC port 2, auto-repeat while held.
        table.push(io(2, 4, true, EdgeType::Pressed, Action::VolUp, SCRATCH_DECK));
        table.push(io(2, 4, true, EdgeType::Holding, Action::VolUpHold, SCRATCH_DECK));
        table.push(io(2, 5, true, EdgeType::Pressed, Action::VolDown, SCRATCH_DECK));
        table.push(io(2, 5, true, EdgeType::Holding, Action::VolDownHold, SCRATCH_DECK));

        // Pitch-mode toggle on the jog button.
        table.push(io(2, 6, true, EdgeType::Pressed, Action::JogPitch, SCRATCH_DECK));

        // Ground references for the button matrix.
        table.push(io(0, 15, false, EdgeType::Pressed, Action::Gnd, BEAT_DECK));
        table.push(io(2, 7, false, EdgeType::Pressed, Action::Gnd, BEAT_DECK));

        table
    }

    pub fn push(&mut self, mapping: Mapping) {
        debug_assert!(
            mapping.kind != MappingKind::Io
                || self
                    .find_gpio(mapping.port, mapping.pin, mapping.edge)
                    .is_none(),
            "duplicate mapping for port {} pin {} edge {:?}",
            mapping.port,
            mapping.pin,
            mapping.edge
        );
        self.entries.push(mapping);
        self.states.push(ButtonState::default());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, idx: usize) -> Mapping {
        self.entries[idx]
    }

    pub fn state_mut(&mut self, idx: usize) -> &mut ButtonState {
        &mut self.states[idx]
    }

    /// Indexed lookup of an IO mapping by pin and edge.
    pub fn find_gpio(&self, port: u8, pin: u8, edge: EdgeType) -> Option<usize> {
        self.entries.iter().position(|m| {
            m.kind == MappingKind::Io && m.port == port && m.pin == pin && m.edge == edge
        })
    }

    /// Neutralise a mapping whose pin conflicts with a bus (init-time only).
    pub fn mask_action(&mut self, idx: usize) {
        self.entries[idx].action = Action::Nothing;
    }
}

impl Default for MappingTable {
    fn default() -> Self {
        Self::stock_layout()
    }
}
