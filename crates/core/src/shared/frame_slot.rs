use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::shared::frame::Frame;

/// Single-slot, last-write-wins hand-off for the most recent output frame.
///
/// A publish replaces whatever the reader has not picked up yet; there is no
/// queue. The mutex only guards an `Arc` swap.
#[derive(Debug, Default)]
pub struct LatestFrameSlot {
    frame: Mutex<Option<Arc<Frame>>>,
    generation: AtomicU64,
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: Frame) {
        let frame = Arc::new(frame);
        let mut slot = self.frame.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(frame);
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Number of frames published so far; changes whenever a new frame lands.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.frame
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Returns the latest frame only if it is newer than `seen_generation`.
    pub fn latest_since(&self, seen_generation: u64) -> Option<(u64, Arc<Frame>)> {
        let generation = self.generation();
        if generation == seen_generation {
            return None;
        }
        self.latest().map(|frame| (generation, frame))
    }
}
