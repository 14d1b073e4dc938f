use thiserror::Error;

/// Failure taxonomy of the runner. None of these is fatal to the process:
/// each one disables a subsystem, drops a tick, or loses a single command.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Missing or invalid configuration for a subsystem.
    #[error("configuration error in [{section}]: {message}")]
    Configuration {
        section: &'static str,
        message: String,
    },

    /// Camera, serial port, or audio device failed to open.
    #[error("{device} unavailable: {message}")]
    DeviceUnavailable {
        device: &'static str,
        message: String,
    },

    /// An external classifier failed for one tick.
    #[error("classification failed: {0}")]
    Classification(String),

    /// A sink write failed. The command is lost.
    #[error("dispatch to {sink} failed: {message}")]
    Dispatch { sink: &'static str, message: String },

    #[error(transparent)]
    InvalidOutputMode(#[from] shared::UnknownOutputMode),

    #[error("action '{0}' is not accepted for injection")]
    InvalidAction(String),

    #[error("runner is not running")]
    NotRunning,
}

impl RunnerError {
    pub fn config(section: &'static str, message: impl Into<String>) -> Self {
        RunnerError::Configuration {
            section,
            message: message.into(),
        }
    }

    pub fn device(device: &'static str, message: impl Into<String>) -> Self {
        RunnerError::DeviceUnavailable {
            device,
            message: message.into(),
        }
    }
}
