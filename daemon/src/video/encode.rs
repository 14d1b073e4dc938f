use jpeg_encoder::{ColorType, Encoder};

use crate::error::RunnerError;
use crate::video::frame::{Frame, PreviewEncoder};

/// Baseline JPEG encoder for preview frames.
#[derive(Debug, Default)]
pub struct JpegPreviewEncoder;

impl PreviewEncoder for JpegPreviewEncoder {
    fn encode_jpeg(&mut self, frame: &Frame, quality: u8) -> Result<Vec<u8>, RunnerError> {
        let too_large = || RunnerError::device("camera", "frame too large for JPEG");
        let width = u16::try_from(frame.width).map_err(|_| too_large())?;
        let height = u16::try_from(frame.height).map_err(|_| too_large())?;

        let mut jpeg = Vec::new();
        Encoder::new(&mut jpeg, quality.clamp(1, 100))
            .encode(&frame.pixels, width, height, ColorType::Rgb)
            .map_err(|e| RunnerError::device("camera", format!("JPEG encoding failed: {}", e)))?;
        Ok(jpeg)
    }
}
