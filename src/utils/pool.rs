use crossbeam_queue::SegQueue;

use crate::constants::{POOL_CLASS_COUNT, POOL_MIN_CLASS, POOL_PER_CLASS_CAP};

/// Lock-free pool of byte buffers, bucketed by power-of-two capacity.
///
/// The encode path churns through short-lived intermediate buffers
/// (serialized frame, compressed block); recycling them keeps the
/// single-consumer write modes out of the allocator. Buffers above the
/// largest class are never retained.
pub struct BufferPool {
    classes: Vec<SegQueue<Vec<u8>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        let classes = (0..POOL_CLASS_COUNT).map(|_| SegQueue::new()).collect();
        Self { classes }
    }

    fn class_for(capacity: usize) -> Option<usize> {
        let mut size = POOL_MIN_CLASS;
        for idx in 0..POOL_CLASS_COUNT {
            if capacity <= size {
                return Some(idx);
            }
            size <<= 1;
        }
        None
    }

    fn class_size(idx: usize) -> usize {
        POOL_MIN_CLASS << idx
    }

    /// Take a cleared buffer with at least `min_capacity` bytes of capacity.
    pub fn acquire(&self, min_capacity: usize) -> Vec<u8> {
        match Self::class_for(min_capacity) {
            Some(idx) => match self.classes[idx].pop() {
                Some(mut buf) => {
                    buf.clear();
                    buf
                }
                None => Vec::with_capacity(Self::class_size(idx)),
            },
            None => Vec::with_capacity(min_capacity),
        }
    }

    /// Return a buffer to its size class. Oversized or overflow buffers are
    /// dropped.
    pub fn release(&self, buf: Vec<u8>) {
        if let Some(idx) = Self::class_for(buf.capacity()) {
            if self.classes[idx].len() < POOL_PER_CLASS_CAP {
                self.classes[idx].push(buf);
            }
        }
    }

    /// Drop every retained buffer.
    pub fn clear(&self) {
        for class in &self.classes {
            while class.pop().is_some() {}
        }
    }

    pub fn retained(&self) -> usize {
        self.classes.iter().map(|c| c.len()).sum()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}
