use shared::{Event, EventKind};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

pub use shared::EventSource as Source;

/// One classifier output for one processing tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationSample {
    pub source: Source,
    pub label: Option<String>,
    pub confidence: f32,
    pub timestamp: SystemTime,
}

impl ClassificationSample {
    pub fn new(source: Source, label: Option<String>, confidence: f32) -> Self {
        Self {
            source,
            label,
            confidence,
            timestamp: SystemTime::now(),
        }
    }
}

/// A confirmed command waiting for the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub source: Source,
    pub action: String,
    /// Classifier label that produced the command. `None` for injected commands.
    pub source_label: Option<String>,
    pub confidence: f32,
    pub enqueued_at: SystemTime,
}

impl Command {
    /// Synthetic command from the control plane.
    pub fn injected(action: impl Into<String>) -> Self {
        Self {
            source: Source::Injected,
            action: action.into(),
            source_label: None,
            confidence: 0.0,
            enqueued_at: SystemTime::now(),
        }
    }

    /// Observer-facing view of this command, stamped now.
    pub fn event(&self, kind: EventKind, sink: Option<&str>) -> Event {
        Event {
            kind,
            source: self.source,
            label: self.source_label.clone(),
            confidence: self.confidence,
            action: self.action.clone(),
            sink: sink.map(str::to_string),
            timestamp: unix_seconds(SystemTime::now()),
        }
    }
}

/// Producers never block: the queue is unbounded.
pub type CommandSender = mpsc::UnboundedSender<Command>;
pub type CommandReceiver = mpsc::UnboundedReceiver<Command>;

pub fn command_queue() -> (CommandSender, CommandReceiver) {
    mpsc::unbounded_channel()
}

/// Seconds since the Unix epoch, as sent to observers.
pub fn unix_seconds(at: SystemTime) -> f64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
