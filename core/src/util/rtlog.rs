//! Realtime-safe logging path.
//!
//! The realtime thread must never take the locks inside `tracing`'s
//! subscriber, so it pushes fixed-size messages into a lock-free SPSC queue
//! instead. The coordination thread drains the queue once per loop
//! iteration and forwards each message to `tracing`. Messages are dropped
//! (and counted) when the queue is full rather than ever blocking the
//! producer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Queue depth. Deep enough that a burst of xrun reports survives one
/// coordination-loop latency.
const QUEUE_CAPACITY: usize = 64;

/// Payload bytes per message. Longer messages are truncated.
const MESSAGE_BYTES: usize = 120;

/// Severity carried through the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtLogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One queued message: a truncated UTF-8 string plus its level.
pub struct RtLogMessage {
    level: RtLogLevel,
    len: u8,
    bytes: [u8; MESSAGE_BYTES],
}

impl RtLogMessage {
    fn new(level: RtLogLevel, text: &str) -> Self {
        let mut bytes = [0u8; MESSAGE_BYTES];
        // Truncate on a char boundary so the flush side can trust the bytes.
        let mut len = text.len().min(MESSAGE_BYTES);
        while len > 0 && !text.is_char_boundary(len) {
            len -= 1;
        }
        bytes[..len].copy_from_slice(&text.as_bytes()[..len]);
        Self {
            level,
            len: len as u8,
            bytes,
        }
    }

    fn text(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("<invalid utf-8>")
    }
}

/// Producer handle, owned by the realtime side.
pub struct RtLogger {
    prod: HeapProd<RtLogMessage>,
    dropped: Arc<AtomicU64>,
}

impl RtLogger {
    /// Queue a message. Never blocks, never allocates; drops on overflow.
    pub fn log(&mut self, level: RtLogLevel, text: &str) {
        if self
            .prod
            .try_push(RtLogMessage::new(level, text))
            .is_err()
        {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Consumer handle, owned by the coordination thread.
pub struct RtLogDrain {
    cons: HeapCons<RtLogMessage>,
    dropped: Arc<AtomicU64>,
    reported_dropped: u64,
}

impl RtLogDrain {
    /// Forward all queued messages to `tracing`. Called from the rig loop.
    pub fn flush(&mut self) {
        while let Some(msg) = self.cons.try_pop() {
            match msg.level {
                RtLogLevel::Debug => tracing::debug!(target: "rt", "{}", msg.text()),
                RtLogLevel::Info => tracing::info!(target: "rt", "{}", msg.text()),
                RtLogLevel::Warn => tracing::warn!(target: "rt", "{}", msg.text()),
                RtLogLevel::Error => tracing::error!(target: "rt", "{}", msg.text()),
            }
        }

        let dropped = self.dropped.load(Ordering::Relaxed);
        if dropped > self.reported_dropped {
            tracing::warn!(
                target: "rt",
                "{} realtime log messages dropped",
                dropped - self.reported_dropped
            );
            self.reported_dropped = dropped;
        }
    }
}

/// Create a connected logger/drain pair.
pub fn queue() -> (RtLogger, RtLogDrain) {
    let (prod, cons) = HeapRb::<RtLogMessage>::new(QUEUE_CAPACITY).split();
    let dropped = Arc::new(AtomicU64::new(0));
    (
        RtLogger {
            prod,
            dropped: dropped.clone(),
        },
        RtLogDrain {
            cons,
            dropped,
            reported_dropped: 0,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_pass_through() {
        let (mut logger, mut drain) = queue();
        logger.log(RtLogLevel::Warn, "xrun");
        // Flush must consume without panicking; content goes to tracing.
        drain.flush();
        assert_eq!(drain.dropped.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_overflow_drops_and_counts() {
        let (mut logger, drain) = queue();
        for _ in 0..(QUEUE_CAPACITY + 10) {
            logger.log(RtLogLevel::Info, "spam");
        }
        assert_eq!(drain.dropped.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn test_truncation_keeps_utf8_boundary() {
        let long = "ä".repeat(MESSAGE_BYTES);
        let msg = RtLogMessage::new(RtLogLevel::Debug, &long);
        assert!(msg.len as usize <= MESSAGE_BYTES);
        assert!(std::str::from_utf8(&msg.bytes[..msg.len as usize]).is_ok());
    }
}
