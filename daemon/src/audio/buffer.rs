use std::sync::{Arc, Mutex};

/// Audio shared between the driver callback (appends) and the keyword
/// processing tick (drains everything at once).
///
/// Only the newest `max_samples` are retained so a stalled consumer cannot
/// grow the buffer without bound.
#[derive(Clone)]
pub struct AudioBuffer {
    inner: Arc<Mutex<Vec<f32>>>,
    max_samples: usize,
}

impl AudioBuffer {
    pub fn new(max_samples: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
            max_samples: max_samples.max(1),
        }
    }

    /// Called from the capture callback. Holds the lock only for the copy.
    pub fn append(&self, samples: &[f32]) {
        let mut buf = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        buf.extend_from_slice(samples);
        if buf.len() > self.max_samples {
            let excess = buf.len() - self.max_samples;
            buf.drain(..excess);
        }
    }

    /// Take everything appended since the last drain.
    pub fn drain(&self) -> Vec<f32> {
        let mut buf = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *buf)
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
