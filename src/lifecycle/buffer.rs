//! Bounded accumulator of raw training samples.

use crate::features::RawSample;

#[derive(Debug, Clone)]
pub struct TrainingBuffer {
    samples: Vec<RawSample>,
    capacity: usize,
}

impl TrainingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample; returns true once the buffer has reached capacity.
    pub fn push(&mut self, sample: RawSample) -> bool {
        self.samples.push(sample);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    /// Take every buffered sample, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<RawSample> {
        std::mem::replace(&mut self.samples, Vec::with_capacity(self.capacity))
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
