use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use shared::PreviewImage;

use crate::command::unix_seconds;

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewFrame {
    pub jpeg: Vec<u8>,
    pub captured_at: SystemTime,
}

impl PreviewFrame {
    pub fn to_image(&self) -> PreviewImage {
        PreviewImage {
            captured_at: unix_seconds(self.captured_at),
            jpeg: self.jpeg.clone(),
        }
    }
}

/// Latest encoded preview. One writer (the video loop), any number of readers.
/// Frames are swapped in whole; readers get a shared handle, never a partial frame.
#[derive(Clone, Default)]
pub struct PreviewBuffer {
    latest: Arc<RwLock<Option<Arc<PreviewFrame>>>>,
}

impl PreviewBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, jpeg: Vec<u8>) {
        let frame = Arc::new(PreviewFrame {
            jpeg,
            captured_at: SystemTime::now(),
        });
        let mut slot = self.latest.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(frame);
    }

    pub fn latest(&self) -> Option<Arc<PreviewFrame>> {
        self.latest
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        *self.latest.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
