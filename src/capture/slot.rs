//! Latest-frame slot
//!
//! Single-writer, multi-reader holder of the newest encoded frame. Frames are
//! published as whole `Arc`s, so a reader sees either the old or the new
//! frame and never a mix. The lock only covers the pointer swap.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// One JPEG frame ready for broadcast
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub bytes: Bytes,
    pub captured_at: DateTime<Utc>,
    pub width: u32,
    pub height: u32,
    pub sequence: u64,
}

impl EncodedFrame {
    pub fn new(bytes: Bytes, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            bytes,
            captured_at: Utc::now(),
            width,
            height,
            sequence,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Time since capture, zero if the clock went backwards
    pub fn age(&self) -> Duration {
        (Utc::now() - self.captured_at).to_std().unwrap_or_default()
    }
}

/// Freshness of the stream as seen by consumers
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameHealth {
    /// Nothing has ever been published
    NoFrameYet,
    Fresh,
    /// Latest frame is older than the staleness threshold
    Stale(Duration),
}

impl FrameHealth {
    pub fn is_degraded(&self) -> bool {
        !matches!(self, FrameHealth::Fresh)
    }
}

/// Holder of the most recent encoded frame
#[derive(Default)]
pub struct LatestFrameSlot {
    current: RwLock<Option<Arc<EncodedFrame>>>,
    published: AtomicU64,
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame; the previous one is dropped once no
    /// reader still holds it
    pub fn publish(&self, frame: EncodedFrame) {
        let frame = Arc::new(frame);
        let previous = self.current.write().replace(frame);
        self.published.fetch_add(1, Ordering::Release);
        drop(previous);
    }

    /// Snapshot of the newest frame
    pub fn latest(&self) -> Option<Arc<EncodedFrame>> {
        self.current.read().clone()
    }

    /// Number of frames published so far
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }

    pub fn health(&self, stale_after: Duration) -> FrameHealth {
        match self.latest() {
            None => FrameHealth::NoFrameYet,
            Some(frame) => {
                let age = frame.age();
                if age > stale_after {
                    FrameHealth::Stale(age)
                } else {
                    FrameHealth::Fresh
                }
            }
        }
    }

    pub fn clear(&self) {
        self.current.write().take();
    }
}

/// Thread-safe handle to a frame slot
pub type SharedFrameSlot = Arc<LatestFrameSlot>;

pub fn create_shared_slot() -> SharedFrameSlot {
    Arc::new(LatestFrameSlot::new())
}
