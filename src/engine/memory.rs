// src/engine/memory.rs
//
// Byte-weighted backpressure for concurrent transforms.
//
// Every item holds a permit sized to its estimated peak footprint while its
// pixels are alive, so a batch of large images cannot decode all at once.

use crate::engine::planner::{SourceMetadata, TransformPlan};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// Lower bound for any estimate to avoid zero-ish weights
const MIN_ESTIMATE_BYTES: u64 = 4 * 1024 * 1024;

/// Overhead for decode/encode scratch buffers (heuristic)
const CODEC_OVERHEAD_BYTES: u64 = 8 * 1024 * 1024;

/// Decoded layouts are at most RGBA8.
const DECODED_BYTES_PER_PIXEL: u64 = 4;

/// In-memory weighted semaphore for byte-based backpressure
#[derive(Debug)]
pub struct WeightedSemaphore {
    capacity: u64,
    state: Mutex<u64>, // available bytes
    cvar: Condvar,
}

#[derive(Debug)]
pub struct MemoryPermit {
    sem: Arc<WeightedSemaphore>,
    weight: u64,
}

impl MemoryPermit {
    pub fn weight(&self) -> u64 {
        self.weight
    }
}

impl WeightedSemaphore {
    pub fn new(capacity: u64) -> Self {
        let capacity = capacity.max(MIN_ESTIMATE_BYTES);
        Self {
            capacity,
            state: Mutex::new(capacity),
            cvar: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn available(&self) -> u64 {
        *self.state.lock()
    }

    /// Block until `weight` bytes are free. Weights above capacity are
    /// clamped so an oversized item runs alone instead of deadlocking.
    pub fn acquire(self: &Arc<Self>, weight: u64) -> MemoryPermit {
        let mut available = self.state.lock();
        let need = weight.min(self.capacity);
        while *available < need {
            self.cvar.wait(&mut available);
        }
        *available -= need;
        MemoryPermit {
            sem: Arc::clone(self),
            weight: need,
        }
    }

    fn release(&self, weight: u64) {
        let mut available = self.state.lock();
        *available = available.saturating_add(weight).min(self.capacity);
        // Waiters have heterogeneous weights; notify_one can starve a large one.
        self.cvar.notify_all();
    }
}

impl Drop for MemoryPermit {
    fn drop(&mut self) {
        self.sem.release(self.weight);
    }
}

/// Peak bytes for one item: decoded source, resized copy, encoded input and
/// output, plus codec scratch.
pub fn estimate_item_bytes(source: &SourceMetadata, input_len: usize, plan: &TransformPlan) -> u64 {
    let decoded = (source.width as u64)
        .saturating_mul(source.height as u64)
        .saturating_mul(DECODED_BYTES_PER_PIXEL);
    let resized = plan
        .target_dimensions()
        .map(|(w, h)| (w as u64) * (h as u64) * DECODED_BYTES_PER_PIXEL)
        .unwrap_or(0);
    let encoded = (input_len as u64).saturating_mul(2);

    decoded
        .saturating_add(resized)
        .saturating_add(encoded)
        .saturating_add(CODEC_OVERHEAD_BYTES)
        .max(MIN_ESTIMATE_BYTES)
}
