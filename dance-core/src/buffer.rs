//! Sliding sample buffer of a live stream.
//!
//! Samples live in one growable vector; the valid window starts at a cursor.
//! Dropping old samples only moves the cursor, and the dead prefix is reclaimed
//! in place once it outweighs the live samples, so steady-state streaming does
//! not reallocate.

#[derive(Debug, Clone, Default)]
pub struct SlidingBuffer {
    data: Vec<f32>,
    start: usize,
}

impl SlidingBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            start: 0,
        }
    }

    /// Number of valid samples.
    pub fn len(&self) -> usize {
        self.data.len() - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The valid samples, oldest first.
    pub fn as_slice(&self) -> &[f32] {
        &self.data[self.start..]
    }

    /// Appends freshly captured samples.
    pub fn extend_from_slice(&mut self, samples: &[f32]) {
        if self.start > 0 && self.data.len() + samples.len() > self.data.capacity() {
            self.compact();
        }
        self.data.extend_from_slice(samples);
    }

    /// Keeps only the newest `keep` samples (all of them if fewer are held).
    pub fn retain_tail(&mut self, keep: usize) {
        let keep = keep.min(self.len());
        self.start = self.data.len() - keep;
        if self.start >= keep {
            self.compact();
        }
    }

    fn compact(&mut self) {
        self.data.drain(..self.start);
        self.start = 0;
    }
}
