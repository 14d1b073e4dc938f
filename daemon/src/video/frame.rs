use crate::error::RunnerError;

const CHANNELS: usize = 3;

/// Packed RGB8 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

impl Frame {
    pub fn new(width: usize, height: usize, pixels: Vec<u8>) -> Result<Self, RunnerError> {
        if pixels.len() != width * height * CHANNELS {
            return Err(RunnerError::device(
                "camera",
                format!(
                    "frame buffer is {} bytes, expected {}x{}x{}",
                    pixels.len(),
                    width,
                    height,
                    CHANNELS
                ),
            ));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Flip horizontally in place so the preview behaves like a mirror.
    pub fn mirror(&mut self) {
        let stride = self.width * CHANNELS;
        if stride == 0 {
            return;
        }
        for row in self.pixels.chunks_exact_mut(stride) {
            let (mut left, mut right) = (0, self.width.saturating_sub(1));
            while left < right {
                for c in 0..CHANNELS {
                    row.swap(left * CHANNELS + c, right * CHANNELS + c);
                }
                left += 1;
                right -= 1;
            }
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let at = (y * self.width + x) * CHANNELS;
        Some([self.pixels[at], self.pixels[at + 1], self.pixels[at + 2]])
    }
}

/// Outcome of one read from a capture device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameRead {
    Frame(Frame),
    /// Nothing complete arrived within the source's wait limit.
    Pending,
    EndOfStream,
}

impl From<Option<Frame>> for FrameRead {
    fn from(frame: Option<Frame>) -> Self {
        match frame {
            Some(frame) => FrameRead::Frame(frame),
            None => FrameRead::EndOfStream,
        }
    }
}

/// An exclusively owned capture device.
pub trait FrameSource: Send {
    /// Wait for the next frame. Sources that can bound the wait return
    /// `Pending` so the loop can observe the stop signal.
    fn read_frame(&mut self) -> Result<FrameRead, RunnerError>;

    /// Release the device. Called once, from the loop that owns it.
    fn close(&mut self) {}
}

pub trait PreviewEncoder: Send {
    fn encode_jpeg(&mut self, frame: &Frame, quality: u8) -> Result<Vec<u8>, RunnerError>;
}
