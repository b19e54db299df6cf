//! Ambient plumbing shared across the core.

pub mod atomic;
pub mod rtlog;
pub mod status;

pub use atomic::AtomicF64;
