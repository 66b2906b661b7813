//! Monitor buffer for sharing rendered output with the UI
//!
//! The render callback pushes (decimated) output samples here and the
//! scope widget reads them back each frame.

use std::sync::{Arc, Mutex};

/// Thread-safe circular buffer of mono output samples
///
/// This buffer is designed for the producer-consumer pattern:
/// - Producer (audio thread): Calls `push_samples()` after each render block
/// - Consumer (UI thread): Calls `recent()` to read samples
pub struct MonitorBuffer {
    inner: Arc<Mutex<BufferInner>>,
}

/// Internal buffer data
struct BufferInner {
    /// Circular buffer of samples
    samples: Vec<f32>,
    /// Current write position
    write_pos: usize,
}

impl MonitorBuffer {
    /// Create a new monitor buffer with the given capacity
    ///
    /// # Arguments
    /// * `capacity` - Number of samples to store (typically 1024-4096)
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BufferInner {
                samples: vec![0.0; capacity.max(1)],
                write_pos: 0,
            })),
        }
    }

    /// Push samples into the buffer
    ///
    /// Called from the audio thread. Uses `try_lock()` so the render
    /// callback never waits on the UI; a contended block is dropped
    /// (the scope just misses it, the audio is unaffected).
    ///
    /// # Returns
    /// `true` if the samples were stored
    pub fn push_samples(&self, samples: impl IntoIterator<Item = f32>) -> bool {
        if let Ok(mut inner) = self.inner.try_lock() {
            let len = inner.samples.len();
            let mut pos = inner.write_pos;
            for sample in samples {
                inner.samples[pos] = sample;
                pos = (pos + 1) % len;
            }
            inner.write_pos = pos;
            true
        } else {
            false
        }
    }

    /// Get the most recent `count` samples, oldest first
    pub fn recent(&self, count: usize) -> Vec<f32> {
        let inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let len = inner.samples.len();
        let count = count.min(len);
        let start = (inner.write_pos + len - count) % len;

        (0..count).map(|i| inner.samples[(start + i) % len]).collect()
    }

    /// Fill the buffer with silence
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.try_lock() {
            inner.samples.iter_mut().for_each(|s| *s = 0.0);
            inner.write_pos = 0;
        }
    }
}

// Clones share the same storage
impl Clone for MonitorBuffer {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_in_order() {
        let buffer = MonitorBuffer::new(4);
        buffer.push_samples([1.0, 2.0, 3.0]);

        assert_eq!(buffer.recent(2), vec![2.0, 3.0]);
        assert_eq!(buffer.recent(10).len(), 4);
    }

    #[test]
    fn test_circular_wrap() {
        let buffer = MonitorBuffer::new(3);
        buffer.push_samples([1.0, 2.0, 3.0, 4.0]);

        assert_eq!(buffer.recent(3), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_clones_share_storage() {
        let buffer = MonitorBuffer::new(2);
        let writer = buffer.clone();
        writer.push_samples([0.5]);
        buffer.clear();
        assert_eq!(buffer.recent(2), vec![0.0, 0.0]);
    }
}
