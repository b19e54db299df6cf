//! Mapping resolution and action dispatch.

pub mod actions;
pub mod mapping;

pub use actions::dispatch;
pub use mapping::{Action, ButtonState, EdgeType, Mapping, MappingKind, MappingTable};
