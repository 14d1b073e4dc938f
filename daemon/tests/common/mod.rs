// Shared fakes for handcued integration tests
//
// Everything the runner would normally get from hardware or a model is
// scripted here:
// - camera frames carry their gesture code in the first pixel
// - the keyword classifier fires on loud windows
// - serial and key output are recorded instead of sent

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use handcued::audio::{AudioBuffer, AudioStream};
use handcued::backend::Backends;
use handcued::classify::{
    GestureClassifier, HandLandmarker, HandObservation, Handedness, KeywordClassifier, Landmark,
    Prediction,
};
use handcued::config::{AudioConfig, CameraConfig, Config, GestureConfig, KeywordConfig, SerialConfig};
use handcued::output::{InjectError, KeyInjector, MediaKey, SerialSink};
use handcued::video::{Frame, FrameRead, FrameSource, PreviewEncoder};
use handcued::{ConfigSource, Runner, RunnerError};

pub const NO_HAND: u8 = 0;
pub const PINCA: u8 = 1;
pub const JOINHA: u8 = 2;

pub const KWS_SAMPLE_RATE: u32 = 16000;
pub const KWS_WINDOW: usize = 160;

pub enum CameraScript {
    Unavailable,
    /// Deliver these codes once, then end of stream.
    Frames(Vec<u8>),
    /// Deliver the current code every few milliseconds until stopped.
    Live(Arc<AtomicU8>),
    /// One empty frame right away, then every read hangs this long.
    Stalled(Duration),
    /// The first read panics.
    Crashing,
}

pub struct FakeBackends {
    pub camera: CameraScript,
    pub keyword_available: bool,
    pub serial: Option<SharedWriter>,
    pub injector: Arc<RecordingInjector>,
    /// Buffer handed to the most recently opened microphone.
    pub microphone: Arc<Mutex<Option<AudioBuffer>>>,
    pub audio_opened: Arc<AtomicUsize>,
    pub audio_closed: Arc<AtomicUsize>,
    pub classifier_builds: Arc<AtomicUsize>,
    pub camera_closed: Arc<AtomicBool>,
}

impl FakeBackends {
    pub fn new(camera: CameraScript) -> Self {
        Self {
            camera,
            keyword_available: true,
            serial: None,
            injector: Arc::new(RecordingInjector::default()),
            microphone: Arc::new(Mutex::new(None)),
            audio_opened: Arc::new(AtomicUsize::new(0)),
            audio_closed: Arc::new(AtomicUsize::new(0)),
            classifier_builds: Arc::new(AtomicUsize::new(0)),
            camera_closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_serial(mut self, writer: SharedWriter) -> Self {
        self.serial = Some(writer);
        self
    }

    /// Speak into the fake microphone.
    pub fn speak(&self, level: f32) {
        if let Some(buffer) = self.microphone.lock().unwrap().as_ref() {
            buffer.append(&[level; KWS_WINDOW]);
        }
    }
}

impl Backends for FakeBackends {
    fn open_camera(&self, _config: &CameraConfig) -> Result<Box<dyn FrameSource>, RunnerError> {
        let closed = self.camera_closed.clone();
        match &self.camera {
            CameraScript::Unavailable => Err(RunnerError::device("camera", "no camera in tests")),
            CameraScript::Frames(codes) => Ok(Box::new(ScriptedCamera {
                codes: codes.iter().copied().collect(),
                closed,
            })),
            CameraScript::Live(code) => Ok(Box::new(LiveCamera {
                code: code.clone(),
                closed,
            })),
            CameraScript::Stalled(stall) => Ok(Box::new(StalledCamera {
                stall: *stall,
                reads: 0,
                closed,
            })),
            CameraScript::Crashing => Ok(Box::new(CrashingCamera { closed })),
        }
    }

    fn hand_landmarker(
        &self,
        _config: &GestureConfig,
    ) -> Result<Box<dyn HandLandmarker>, RunnerError> {
        Ok(Box::new(PixelLandmarker))
    }

    fn gesture_classifier(
        &self,
        _config: &GestureConfig,
    ) -> Result<Box<dyn GestureClassifier>, RunnerError> {
        Ok(Box::new(CodeClassifier))
    }

    fn preview_encoder(&self) -> Box<dyn PreviewEncoder> {
        Box::new(TagEncoder)
    }

    fn keyword_classifier(
        &self,
        _config: &KeywordConfig,
    ) -> Result<Arc<dyn KeywordClassifier>, RunnerError> {
        if !self.keyword_available {
            return Err(RunnerError::config("keyword", "model not found"));
        }
        self.classifier_builds.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(LoudnessClassifier))
    }

    fn open_audio(
        &self,
        _config: &AudioConfig,
        sample_rate: u32,
        buffer: AudioBuffer,
    ) -> Result<Box<dyn AudioStream>, RunnerError> {
        assert_eq!(sample_rate, KWS_SAMPLE_RATE);
        *self.microphone.lock().unwrap() = Some(buffer);
        self.audio_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeMicrophone {
            slot: self.microphone.clone(),
            closed: self.audio_closed.clone(),
        }))
    }

    fn open_serial(&self, config: &SerialConfig) -> Result<SerialSink, RunnerError> {
        match &self.serial {
            Some(writer) => Ok(SerialSink::from_writer(
                config.port.clone(),
                Box::new(writer.clone()),
            )),
            None => Err(RunnerError::device("serial", "no such port")),
        }
    }

    fn key_injector(&self) -> Arc<dyn KeyInjector> {
        self.injector.clone()
    }
}

struct ScriptedCamera {
    codes: VecDeque<u8>,
    closed: Arc<AtomicBool>,
}

impl FrameSource for ScriptedCamera {
    fn read_frame(&mut self) -> Result<FrameRead, RunnerError> {
        Ok(self.codes.pop_front().map(frame).into())
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct LiveCamera {
    code: Arc<AtomicU8>,
    closed: Arc<AtomicBool>,
}

impl FrameSource for LiveCamera {
    fn read_frame(&mut self) -> Result<FrameRead, RunnerError> {
        std::thread::sleep(Duration::from_millis(5));
        Ok(FrameRead::Frame(frame(self.code.load(Ordering::SeqCst))))
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// A camera whose reads block, like a device that stopped delivering.
struct StalledCamera {
    stall: Duration,
    reads: usize,
    closed: Arc<AtomicBool>,
}

impl FrameSource for StalledCamera {
    fn read_frame(&mut self) -> Result<FrameRead, RunnerError> {
        if self.reads > 0 {
            std::thread::sleep(self.stall);
        }
        self.reads += 1;
        Ok(FrameRead::Frame(frame(NO_HAND)))
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct CrashingCamera {
    closed: Arc<AtomicBool>,
}

impl FrameSource for CrashingCamera {
    fn read_frame(&mut self) -> Result<FrameRead, RunnerError> {
        panic!("camera driver crashed");
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub fn frame(code: u8) -> Frame {
    Frame::new(1, 1, vec![code, 0, 0]).unwrap()
}

struct PixelLandmarker;

impl HandLandmarker for PixelLandmarker {
    fn detect(&mut self, frame: &mut Frame, _draw: bool) -> Option<HandObservation> {
        let code = frame.pixels[0];
        (code != NO_HAND).then(|| HandObservation {
            landmarks: (0..21)
                .map(|id| Landmark {
                    id: if id == 0 { u32::from(code) } else { id },
                    x: 0.0,
                    y: 0.0,
                })
                .collect(),
            handedness: Handedness::Right,
        })
    }
}

struct CodeClassifier;

impl GestureClassifier for CodeClassifier {
    fn predict(
        &mut self,
        landmarks: &[Landmark],
        _handedness: Handedness,
    ) -> Result<Prediction, RunnerError> {
        Ok(match landmarks.first().map(|l| l.id as u8) {
            Some(PINCA) => Prediction::new("Pinca", 0.95),
            Some(JOINHA) => Prediction::new("Joinha", 0.95),
            _ => Prediction::none(),
        })
    }
}

struct TagEncoder;

impl PreviewEncoder for TagEncoder {
    fn encode_jpeg(&mut self, frame: &Frame, _quality: u8) -> Result<Vec<u8>, RunnerError> {
        Ok(vec![0xff, 0xd8, frame.pixels[0], 0xff, 0xd9])
    }
}

struct LoudnessClassifier;

impl KeywordClassifier for LoudnessClassifier {
    fn sample_rate(&self) -> u32 {
        KWS_SAMPLE_RATE
    }

    fn window_len(&self) -> usize {
        KWS_WINDOW
    }

    fn predict(&self, window: &[f32]) -> Result<Prediction, RunnerError> {
        let mean = window.iter().sum::<f32>() / window.len() as f32;
        if mean > 0.5 {
            Ok(Prediction::new("proxima", 0.97))
        } else {
            Ok(Prediction::new("background", 0.99))
        }
    }
}

struct FakeMicrophone {
    slot: Arc<Mutex<Option<AudioBuffer>>>,
    closed: Arc<AtomicUsize>,
}

impl AudioStream for FakeMicrophone {
    fn close(self: Box<Self>) {
        *self.slot.lock().unwrap() = None;
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingInjector {
    pub pressed: Mutex<Vec<MediaKey>>,
}

impl KeyInjector for RecordingInjector {
    fn press(&self, key: MediaKey) -> Result<(), InjectError> {
        self.pressed.lock().unwrap().push(key);
        Ok(())
    }
}

impl RecordingInjector {
    pub fn pressed(&self) -> Vec<MediaKey> {
        self.pressed.lock().unwrap().clone()
    }
}

/// Serial wire captured in memory.
#[derive(Clone, Default)]
pub struct SharedWriter(pub Arc<Mutex<Vec<u8>>>);

impl SharedWriter {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Gesture on with a short streak, keyword off, no cooldown, serial off.
pub fn test_config() -> Config {
    let mut config = Config::default();

    config.gesture.confirmation_frames = 3;
    config.gesture.mapping = BTreeMap::from([
        ("Pinca".to_string(), "playpause".to_string()),
        ("Joinha".to_string(), "nexttrack".to_string()),
    ]);

    config.keyword.enabled = false;
    config.keyword.tick_ms = 20;
    config.keyword.mapping = BTreeMap::from([("proxima".to_string(), "nexttrack".to_string())]);

    config.dispatch.cooldown_seconds = 0.0;
    config.preview.max_fps = 1000.0;
    config.preview.stream_interval_ms = 10;
    config
}

pub fn runner_with(config: Config, backends: Arc<FakeBackends>) -> Runner {
    Runner::new(ConfigSource::Fixed(config), backends)
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Print a section header
pub fn print_header(title: &str) {
    println!("\n{}", "=".repeat(60));
    println!("  {}", title);
    println!("{}", "=".repeat(60));
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("\nℹ {}", message);
}

/// Ask user to confirm an action
pub fn confirm_action(prompt: &str) -> bool {
    print!(
        "\n[CONFIRM] {}\nPress 'y' to confirm, any other key to skip: ",
        prompt
    );
    io::stdout().flush().unwrap();

    let mut input = String::new();
    io::stdin().read_line(&mut input).unwrap();

    input.trim().to_lowercase() == "y"
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("\n✓ {}", message);
}

/// Print an error message
pub fn print_error(message: &str) {
    println!("\n✗ {}", message);
}
