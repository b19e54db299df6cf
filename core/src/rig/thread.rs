//! Realtime-thread bookkeeping and the blocking-call assertion.

use std::cell::Cell;

thread_local! {
    static IS_RT: Cell<bool> = const { Cell::new(false) };
}

/// Mark the current thread as realtime. Called once at thread entry.
pub fn mark_realtime() {
    IS_RT.with(|rt| rt.set(true));
}

pub fn is_realtime() -> bool {
    IS_RT.with(Cell::get)
}

/// Assert that the current thread may block or allocate.
///
/// Sits at the top of every blocking/allocating core primitive (track
/// acquisition, block growth, event-pipe posts). A realtime thread landing
/// here is a programming error that must be caught in development, so it
/// aborts rather than limping on with broken latency guarantees.
pub fn rt_not_allowed() {
    if is_realtime() {
        tracing::error!("realtime thread called a blocking function");
        std::process::abort();
    }
}
