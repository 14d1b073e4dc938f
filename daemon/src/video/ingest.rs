use std::sync::atomic::{AtomicBool, Ordering};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use shared::EventKind;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::classify::{GestureClassifier, HandLandmarker, Prediction};
use crate::command::{ClassificationSample, CommandSender, Source};
use crate::config::PreviewConfig;
use crate::confirm::ConfirmationFilter;
use crate::events::EventHub;
use crate::preview::PreviewBuffer;
use crate::rate_limit::Cooldown;
use crate::video::frame::{Frame, FrameRead, FrameSource, PreviewEncoder};

/// Why the video loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoExit {
    /// The stop signal was raised.
    Stopped,
    /// The camera reported end of stream.
    EndOfStream,
    /// The camera failed to deliver a frame.
    Failed(String),
}

impl VideoExit {
    /// Whether the whole runner should stop because of this exit.
    pub fn stops_runner(&self) -> bool {
        !matches!(self, VideoExit::Stopped)
    }
}

/// Everything the loop owns exclusively for its lifetime.
pub struct VideoDevices {
    pub source: Box<dyn FrameSource>,
    pub landmarker: Box<dyn HandLandmarker>,
    pub classifier: Box<dyn GestureClassifier>,
    pub encoder: Box<dyn PreviewEncoder>,
}

pub struct VideoIngestLoop {
    devices: VideoDevices,
    filter: ConfirmationFilter,
    preview: PreviewBuffer,
    preview_limit: Cooldown,
    jpeg_quality: u8,
    overlay: Arc<AtomicBool>,
    commands: CommandSender,
    hub: EventHub,
    stop_rx: watch::Receiver<bool>,
}

impl VideoIngestLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        devices: VideoDevices,
        filter: ConfirmationFilter,
        preview: PreviewBuffer,
        preview_config: &PreviewConfig,
        overlay: Arc<AtomicBool>,
        commands: CommandSender,
        hub: EventHub,
        stop_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            devices,
            filter,
            preview,
            preview_limit: Cooldown::new(preview_config.interval()),
            jpeg_quality: preview_config.jpeg_quality.clamp(1, 100),
            overlay,
            commands,
            hub,
            stop_rx,
        }
    }

    /// Run on a dedicated thread. The exit reason is reported through `on_exit`.
    pub fn spawn(self, on_exit: oneshot::Sender<VideoExit>) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("video-ingest".to_string())
            .spawn(move || {
                let exit = self.run();
                let _ = on_exit.send(exit);
            })
    }

    pub fn run(mut self) -> VideoExit {
        info!("Video processing started");

        let exit = loop {
            if self.stopping() {
                break VideoExit::Stopped;
            }

            let mut frame = match self.devices.source.read_frame() {
                Ok(FrameRead::Frame(frame)) => frame,
                Ok(FrameRead::Pending) => continue,
                Ok(FrameRead::EndOfStream) => {
                    info!("Camera reached end of stream");
                    break VideoExit::EndOfStream;
                }
                Err(e) => {
                    error!("Camera read failed: {}", e);
                    break VideoExit::Failed(e.to_string());
                }
            };

            // The read may have blocked across a stop.
            if self.stopping() {
                break VideoExit::Stopped;
            }

            self.process(&mut frame);
        };

        self.devices.source.close();
        info!("Video processing stopped ({:?})", exit);
        exit
    }

    fn stopping(&self) -> bool {
        *self.stop_rx.borrow()
    }

    fn process(&mut self, frame: &mut Frame) {
        frame.mirror();

        let draw = self.overlay.load(Ordering::Relaxed);
        let landmarker = &mut self.devices.landmarker;
        let hand = panic::catch_unwind(AssertUnwindSafe(|| landmarker.detect(frame, draw)))
            .unwrap_or_else(|_| {
                warn!("Hand landmarker panicked, treating frame as empty");
                None
            });

        if self.preview_limit.try_acquire() {
            match self.devices.encoder.encode_jpeg(frame, self.jpeg_quality) {
                Ok(jpeg) => self.preview.replace(jpeg),
                Err(e) => debug!("Preview encode failed: {}", e),
            }
        }

        let prediction = match hand {
            Some(hand) => {
                let classifier = &mut self.devices.classifier;
                match panic::catch_unwind(AssertUnwindSafe(|| {
                    classifier.predict(&hand.landmarks, hand.handedness)
                })) {
                    Ok(Ok(prediction)) => prediction,
                    Ok(Err(e)) => {
                        warn!("Gesture classification failed: {}", e);
                        Prediction::none()
                    }
                    Err(_) => {
                        warn!("Gesture classifier panicked");
                        Prediction::none()
                    }
                }
            }
            None => Prediction::none(),
        };

        let sample =
            ClassificationSample::new(Source::Video, prediction.label, prediction.confidence);
        let Some(command) = self.filter.observe_sample(&sample) else {
            return;
        };

        info!(
            "Gesture '{}' confirmed ({:.2}) -> {}",
            command.source_label.as_deref().unwrap_or_default(),
            command.confidence,
            command.action
        );
        self.hub.publish(command.event(EventKind::Recognized, None));
        if self.commands.send(command).is_err() {
            debug!("Command queue closed, gesture command discarded");
        }
    }
}
