use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::RunnerError;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub camera: CameraConfig,
    pub gesture: GestureConfig,
    pub keyword: KeywordConfig,
    pub audio: AudioConfig,
    pub dispatch: DispatchConfig,
    pub output: OutputConfig,
    pub serial: SerialConfig,
    pub preview: PreviewConfig,
    pub events: EventsConfig,
    pub control: ControlConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CameraConfig {
    #[serde(default)]
    pub index: u32,
    /// Raw RGB24 frame stream (file or FIFO), e.g. fed by ffmpeg.
    #[serde(default)]
    pub source: Option<PathBuf>,
    #[serde(default = "default_camera_width")]
    pub width: u32,
    #[serde(default = "default_camera_height")]
    pub height: u32,
    #[serde(default = "default_camera_fps")]
    pub fps: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            source: None,
            width: default_camera_width(),
            height: default_camera_height(),
            fps: default_camera_fps(),
        }
    }
}

fn default_camera_width() -> u32 {
    640
}
fn default_camera_height() -> u32 {
    480
}
fn default_camera_fps() -> f32 {
    30.0
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GestureConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_detection_confidence")]
    pub detection_confidence: f32,
    #[serde(default = "default_tracking_confidence")]
    pub tracking_confidence: f32,
    #[serde(default = "default_confirmation_frames")]
    pub confirmation_frames: u32,
    #[serde(default = "default_gesture_min_confidence")]
    pub min_confidence: f32,
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Gesture label → action.
    #[serde(default)]
    pub mapping: BTreeMap<String, String>,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            detection_confidence: default_detection_confidence(),
            tracking_confidence: default_tracking_confidence(),
            confirmation_frames: default_confirmation_frames(),
            min_confidence: default_gesture_min_confidence(),
            model_path: None,
            labels: Vec::new(),
            mapping: BTreeMap::new(),
        }
    }
}

impl GestureConfig {
    pub fn validate(&self) -> Result<(), RunnerError> {
        if self.confirmation_frames == 0 {
            return Err(RunnerError::config(
                "gesture",
                "confirmation_frames must be at least 1",
            ));
        }
        check_unit("gesture", "min_confidence", self.min_confidence)?;
        check_unit("gesture", "detection_confidence", self.detection_confidence)?;
        check_unit("gesture", "tracking_confidence", self.tracking_confidence)?;
        if self.mapping.is_empty() {
            tracing::warn!("[gesture] mapping is empty, confirmed gestures will not dispatch");
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
fn default_detection_confidence() -> f32 {
    0.8
}
fn default_tracking_confidence() -> f32 {
    0.8
}
fn default_confirmation_frames() -> u32 {
    5
}
fn default_gesture_min_confidence() -> f32 {
    0.7
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct KeywordConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    #[serde(default)]
    pub labels_path: Option<PathBuf>,
    #[serde(default = "default_keyword_min_confidence")]
    pub min_confidence: f32,
    #[serde(default = "default_ignore_labels")]
    pub ignore_labels: Vec<String>,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Keyword label → action.
    #[serde(default)]
    pub mapping: BTreeMap<String, String>,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model_path: None,
            labels_path: None,
            min_confidence: default_keyword_min_confidence(),
            ignore_labels: default_ignore_labels(),
            tick_ms: default_tick_ms(),
            mapping: BTreeMap::new(),
        }
    }
}

impl KeywordConfig {
    pub fn validate(&self) -> Result<(), RunnerError> {
        check_unit("keyword", "min_confidence", self.min_confidence)?;
        if self.tick_ms == 0 {
            return Err(RunnerError::config("keyword", "tick_ms must be positive"));
        }
        Ok(())
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

fn default_keyword_min_confidence() -> f32 {
    0.9
}
fn default_ignore_labels() -> Vec<String> {
    vec!["background".to_string(), "unknown".to_string()]
}
fn default_tick_ms() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AudioConfig {
    /// Input device name, or "default".
    #[serde(default = "default_audio_device")]
    pub device: String,
    #[serde(default = "default_channels")]
    pub channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: default_audio_device(),
            channels: default_channels(),
        }
    }
}

fn default_audio_device() -> String {
    "default".to_string()
}
fn default_channels() -> u16 {
    1
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DispatchConfig {
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: default_cooldown_seconds(),
        }
    }
}

impl DispatchConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::try_from_secs_f64(self.cooldown_seconds).unwrap_or(Duration::ZERO)
    }
}

fn default_cooldown_seconds() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct OutputConfig {
    #[serde(default)]
    pub mode: shared::OutputMode,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SerialConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_serial_port")]
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_serial_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_serial_timeout_ms(),
        }
    }
}

fn default_serial_port() -> String {
    "/dev/ttyUSB0".to_string()
}
fn default_baud_rate() -> u32 {
    115200
}
fn default_serial_timeout_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PreviewConfig {
    #[serde(default = "default_max_fps")]
    pub max_fps: f32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_true")]
    pub overlay: bool,
    #[serde(default = "default_stream_interval_ms")]
    pub stream_interval_ms: u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_fps: default_max_fps(),
            jpeg_quality: default_jpeg_quality(),
            overlay: true,
            stream_interval_ms: default_stream_interval_ms(),
        }
    }
}

impl PreviewConfig {
    /// Minimum spacing between preview encodes. FPS below 1 is clamped to 1.
    pub fn interval(&self) -> Duration {
        let fps = if self.max_fps.is_finite() {
            self.max_fps.max(1.0)
        } else {
            default_max_fps()
        };
        Duration::from_secs_f64(1.0 / f64::from(fps))
    }
}

fn default_max_fps() -> f32 {
    15.0
}
fn default_jpeg_quality() -> u8 {
    70
}
fn default_stream_interval_ms() -> u64 {
    80
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EventsConfig {
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

fn default_event_capacity() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ControlConfig {
    /// Actions accepted by the test-injection request.
    #[serde(default = "default_test_actions")]
    pub test_actions: Vec<String>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            test_actions: default_test_actions(),
        }
    }
}

fn default_test_actions() -> Vec<String> {
    vec![
        "playpause".to_string(),
        "nexttrack".to_string(),
        "prevtrack".to_string(),
    ]
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct ServerConfig {
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
}

impl ServerConfig {
    pub fn socket_path(&self) -> PathBuf {
        self.socket_path.clone().unwrap_or_else(shared::socket_path)
    }
}

fn check_unit(section: &'static str, field: &str, value: f32) -> Result<(), RunnerError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(RunnerError::config(
            section,
            format!("{field} must be within [0, 1], got {value}"),
        ))
    }
}

/// Load the config from `path`, or from the default location when `None`.
/// A missing file yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => get_config_path()?,
    };

    if !config_path.exists() {
        tracing::info!("Config file not found at {:?}, using defaults", config_path);
        return Ok(Config::default());
    }

    tracing::info!("Loading config from {:?}", config_path);
    let config_str = std::fs::read_to_string(&config_path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

    let config: Config = toml::from_str(&config_str)
        .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;

    tracing::info!("Config loaded successfully");
    Ok(config)
}

fn get_config_path() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Failed to get config directory"))?;
    Ok(dir.join("handcue").join("config.toml"))
}
