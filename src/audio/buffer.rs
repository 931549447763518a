//! Bounded ring buffer between the capture thread and the stream reader
//!
//! The writer never blocks and never fails: when the buffer is full the
//! oldest unread samples are dropped so the freshest data always wins.
//! Reads never wait either; they return whatever is available.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::constants::RING_BUFFER_SECONDS;
use crate::dsp::ComplexSample;

struct Ring {
    data: Vec<ComplexSample>,
    /// Next slot to write
    head: usize,
    /// Oldest unread slot
    tail: usize,
    /// Occupied slots; disambiguates head == tail (empty vs. full)
    len: usize,
}

/// Overwrite-oldest ring of complex samples, one writer and one reader
pub struct RingBuffer {
    ring: Mutex<Ring>,
    capacity: usize,
    overflow_count: AtomicUsize,
}

impl RingBuffer {
    /// Create a new ring buffer with the specified capacity
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be non-zero");

        Self {
            ring: Mutex::new(Ring {
                data: vec![ComplexSample::new(0.0, 0.0); capacity],
                head: 0,
                tail: 0,
                len: 0,
            }),
            capacity,
            overflow_count: AtomicUsize::new(0),
        }
    }

    /// Ring sized for two seconds of output at `output_rate`
    pub fn for_output_rate(output_rate: u32) -> Self {
        Self::new(RING_BUFFER_SECONDS * output_rate as usize)
    }

    /// Append samples, dropping the oldest unread ones on overflow
    pub fn write(&self, samples: &[ComplexSample]) {
        if samples.is_empty() {
            return;
        }

        let mut ring = self.ring.lock();
        let mut dropped = 0;

        for &sample in samples {
            let head = ring.head;
            ring.data[head] = sample;
            ring.head = (head + 1) % self.capacity;

            if ring.len == self.capacity {
                ring.tail = (ring.tail + 1) % self.capacity;
                dropped += 1;
            } else {
                ring.len += 1;
            }
        }

        if dropped > 0 {
            self.overflow_count.fetch_add(dropped, Ordering::Relaxed);
        }
    }

    /// Move up to `out.len()` of the oldest samples into `out`
    ///
    /// Returns how many were copied; zero when empty.
    pub fn read(&self, out: &mut [ComplexSample]) -> usize {
        let mut ring = self.ring.lock();
        let count = out.len().min(ring.len);

        for slot in out.iter_mut().take(count) {
            *slot = ring.data[ring.tail];
            ring.tail = (ring.tail + 1) % self.capacity;
        }
        ring.len -= count;

        count
    }

    /// Discard everything unread
    pub fn clear(&self) {
        let mut ring = self.ring.lock();
        ring.tail = ring.head;
        ring.len = 0;
    }

    /// Get current buffer length
    pub fn len(&self) -> usize {
        self.ring.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get buffer capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples overwritten before they were read
    pub fn overflow_count(&self) -> usize {
        self.overflow_count.load(Ordering::Relaxed)
    }

    /// Get fill level as a fraction of capacity
    pub fn fill_level(&self) -> f32 {
        self.len() as f32 / self.capacity as f32
    }
}

/// Thread-safe handle to a ring buffer
pub type SharedRingBuffer = Arc<RingBuffer>;

/// Create a new shared ring buffer
pub fn create_shared_buffer(capacity: usize) -> SharedRingBuffer {
    Arc::new(RingBuffer::new(capacity))
}
