//! Contracts for the external classifiers. Inference itself lives outside
//! this crate; the runner only schedules calls and interprets the output.

use crate::error::RunnerError;
use crate::video::Frame;

/// Landmarks a full hand skeleton provides.
pub const HAND_LANDMARKS: usize = 21;

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: Option<String>,
    pub confidence: f32,
}

impl Prediction {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: Some(label.into()),
            confidence,
        }
    }

    /// No label this tick.
    pub fn none() -> Self {
        Self {
            label: None,
            confidence: 0.0,
        }
    }
}

/// One landmark in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub id: u32,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Handedness {
    Left,
    #[default]
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandObservation {
    pub landmarks: Vec<Landmark>,
    pub handedness: Handedness,
}

/// Hand landmark extraction over a mirrored frame.
pub trait HandLandmarker: Send {
    /// Find the first hand. When `draw` is set, debug overlays are painted
    /// onto `frame` so they show up in the preview.
    fn detect(&mut self, frame: &mut Frame, draw: bool) -> Option<HandObservation>;
}

/// Gesture classification over one hand.
pub trait GestureClassifier: Send {
    /// Must return [`Prediction::none`] rather than an error when there are
    /// fewer than [`HAND_LANDMARKS`] landmarks.
    fn predict(
        &mut self,
        landmarks: &[Landmark],
        handedness: Handedness,
    ) -> Result<Prediction, RunnerError>;
}

/// Keyword spotting over a fixed-length window of mono samples.
pub trait KeywordClassifier: Send + Sync {
    fn sample_rate(&self) -> u32;

    /// Samples per window. Fixed for the lifetime of the classifier.
    fn window_len(&self) -> usize;

    fn predict(&self, window: &[f32]) -> Result<Prediction, RunnerError>;
}
