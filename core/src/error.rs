//! Core error kinds.
//!
//! Only recoverable conditions are modelled here. A realtime thread calling
//! a blocking primitive is a programming error and aborts the process
//! (see [`crate::rig::thread::rt_not_allowed`]); it never surfaces as an
//! `Err`.

use std::path::PathBuf;

/// Errors produced by the control-plane core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A hardware surface could not be opened at all. Recovered locally by
    /// flipping the surface's presence flag and degrading.
    #[error("{device} not present: {reason}")]
    HardwareAbsent {
        device: &'static str,
        reason: std::io::Error,
    },

    /// A read or write on an otherwise-present device failed. Logged; the
    /// caller gets a best-effort value.
    #[error("I/O on {device}: {source}")]
    HardwareTransient {
        device: &'static str,
        source: std::io::Error,
    },

    /// The importer subprocess could not be launched, or exited with a
    /// failure we did not cause.
    #[error("import of '{}' failed", path.display())]
    ImportFailed { path: PathBuf },

    /// A track hit its block limit or the allocator refused more memory.
    /// Growth of that track halts; existing audio stays playable.
    #[error("track buffer exhausted after {blocks} blocks")]
    AllocationExhausted { blocks: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;
