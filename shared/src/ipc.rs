use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// File name of the control socket inside the runtime directory.
pub const SOCKET_NAME: &str = "handcued.sock";

/// Resolve the control socket path.
/// Uses the XDG runtime directory if available, falls back to /tmp/handcued.sock
pub fn socket_path() -> PathBuf {
    match dirs::runtime_dir() {
        Some(runtime_dir) => runtime_dir.join(SOCKET_NAME),
        None => PathBuf::from("/tmp").join(SOCKET_NAME),
    }
}

/// One control request. Sent as a single JSON line.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Request {
    Start,
    Stop,
    State,
    OutputState,
    SetOutput(String),
    KwsState,
    KwsEnable,
    KwsDisable,
    OverlayState,
    OverlayEnable,
    OverlayDisable,
    Frame,
    PreviewStream,
    Subscribe,
    TestCommand(String),
}

impl Request {
    /// Streaming requests keep the connection open and produce many responses.
    pub fn is_stream(&self) -> bool {
        matches!(self, Request::Subscribe | Request::PreviewStream)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Response {
    Started,
    AlreadyRunning,
    Stopped,
    NotRunning,
    Status(RunnerStatus),
    Output(OutputStatus),
    Rejected { reason: String, output: OutputStatus },
    Toggle(ToggleStatus),
    Failed(String),
    Frame(PreviewImage),
    NoFrame,
    Queued { action: String },
    InvalidAction(String),
    Event(Event),
    Error(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunnerStatus {
    pub running: bool,
    pub lifecycle: String,
    pub gesture_enabled: bool,
    pub kws_enabled: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Auto,
    Serial,
    Local,
}

impl OutputMode {
    pub const ALL: [OutputMode; 3] = [OutputMode::Auto, OutputMode::Serial, OutputMode::Local];

    pub fn as_str(self) -> &'static str {
        match self {
            OutputMode::Auto => "auto",
            OutputMode::Serial => "serial",
            OutputMode::Local => "local",
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown output mode '{0}' (expected auto, serial or local)")]
pub struct UnknownOutputMode(pub String);

impl FromStr for OutputMode {
    type Err = UnknownOutputMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        OutputMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
            .ok_or_else(|| UnknownOutputMode(s.to_string()))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputStatus {
    pub mode: OutputMode,
    pub serial_available: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleStatus {
    pub enabled: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PreviewImage {
    /// Unix seconds.
    pub captured_at: f64,
    pub jpeg: Vec<u8>,
}

/// Where a command came from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Video,
    Audio,
    Injected,
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventSource::Video => "video",
            EventSource::Audio => "audio",
            EventSource::Injected => "injected",
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A filter confirmed a command; it may still be dropped by cooldown.
    Recognized,
    /// The command was written to an output sink.
    Dispatched,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub source: EventSource,
    pub label: Option<String>,
    pub confidence: f32,
    pub action: String,
    /// Sink that received the command, `serial` or `local`. Dispatched events only.
    pub sink: Option<String>,
    /// Unix seconds.
    pub timestamp: f64,
}

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection refused: is handcued running?")]
    ConnectionRefused,

    #[error("Connection timeout")]
    Timeout,

    #[error("Connection closed before a response arrived")]
    Closed,
}
