use super::Frame;
use std::sync::{Mutex, MutexGuard};

/// Single-slot frame cache shared by capture, display and processing.
///
/// `put` always replaces the held frame, so readers only ever see the newest
/// one and nothing queues up behind a slow consumer. The lock covers the swap
/// or the `Arc` clone and nothing else.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    slot: Mutex<Option<Frame>>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held frame
    pub fn put(&self, frame: Frame) {
        let previous = self.slot().replace(frame);
        // Drop the stale frame outside the lock
        drop(previous);
    }

    /// Newest frame without removing it
    pub fn peek_latest(&self) -> Option<Frame> {
        self.slot().clone()
    }

    pub fn clear(&self) {
        let previous = self.slot().take();
        drop(previous);
    }

    fn slot(&self) -> MutexGuard<'_, Option<Frame>> {
        // A panic while holding the lock cannot leave a half-written Option
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
