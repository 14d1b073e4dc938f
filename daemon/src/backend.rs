//! Construction of the runner's collaborators.
//!
//! The runner never opens devices or loads models itself; it asks a
//! [`Backends`] implementation at start time. Any failure here disables the
//! affected subsystem only.

use std::sync::Arc;

use crate::audio::{AudioBuffer, AudioStream, CpalAudioInput};
use crate::classify::{GestureClassifier, HandLandmarker, KeywordClassifier};
use crate::config::{AudioConfig, CameraConfig, GestureConfig, KeywordConfig, SerialConfig};
use crate::error::RunnerError;
use crate::output::{EnigoInjector, KeyInjector, SerialSink};
use crate::video::{FrameSource, JpegPreviewEncoder, PreviewEncoder, RawVideoSource};

pub trait Backends: Send + Sync {
    fn open_camera(&self, config: &CameraConfig) -> Result<Box<dyn FrameSource>, RunnerError>;

    fn hand_landmarker(
        &self,
        config: &GestureConfig,
    ) -> Result<Box<dyn HandLandmarker>, RunnerError>;

    fn gesture_classifier(
        &self,
        config: &GestureConfig,
    ) -> Result<Box<dyn GestureClassifier>, RunnerError>;

    fn preview_encoder(&self) -> Box<dyn PreviewEncoder> {
        Box::new(JpegPreviewEncoder)
    }

    fn keyword_classifier(
        &self,
        config: &KeywordConfig,
    ) -> Result<Arc<dyn KeywordClassifier>, RunnerError>;

    fn open_audio(
        &self,
        config: &AudioConfig,
        sample_rate: u32,
        buffer: AudioBuffer,
    ) -> Result<Box<dyn AudioStream>, RunnerError>;

    fn open_serial(&self, config: &SerialConfig) -> Result<SerialSink, RunnerError> {
        SerialSink::open(config)
    }

    fn key_injector(&self) -> Arc<dyn KeyInjector> {
        Arc::new(EnigoInjector)
    }
}

/// Real devices: raw-video camera stream, cpal microphone, serialport, enigo.
///
/// No inference runtime is linked into the daemon, so the landmark and
/// classifier constructors report the subsystem as unavailable. Embedders
/// supply those through their own [`Backends`].
#[derive(Debug, Default)]
pub struct DefaultBackends;

impl DefaultBackends {
    fn no_inference(section: &'static str, model: Option<&std::path::Path>) -> RunnerError {
        match model {
            Some(path) if !path.exists() => {
                RunnerError::config(section, format!("model not found at {}", path.display()))
            }
            Some(path) => RunnerError::config(
                section,
                format!("no inference backend available for {}", path.display()),
            ),
            None => RunnerError::config(section, "model_path is not set"),
        }
    }
}

impl Backends for DefaultBackends {
    fn open_camera(&self, config: &CameraConfig) -> Result<Box<dyn FrameSource>, RunnerError> {
        Ok(Box::new(RawVideoSource::open(config)?))
    }

    fn hand_landmarker(
        &self,
        config: &GestureConfig,
    ) -> Result<Box<dyn HandLandmarker>, RunnerError> {
        Err(Self::no_inference("gesture", config.model_path.as_deref()))
    }

    fn gesture_classifier(
        &self,
        config: &GestureConfig,
    ) -> Result<Box<dyn GestureClassifier>, RunnerError> {
        Err(Self::no_inference("gesture", config.model_path.as_deref()))
    }

    fn keyword_classifier(
        &self,
        config: &KeywordConfig,
    ) -> Result<Arc<dyn KeywordClassifier>, RunnerError> {
        Err(Self::no_inference("keyword", config.model_path.as_deref()))
    }

    fn open_audio(
        &self,
        config: &AudioConfig,
        sample_rate: u32,
        buffer: AudioBuffer,
    ) -> Result<Box<dyn AudioStream>, RunnerError> {
        Ok(Box::new(CpalAudioInput::open(config, sample_rate, buffer)?))
    }
}
