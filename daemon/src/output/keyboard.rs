use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::error::RunnerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKey {
    PlayPause,
    NextTrack,
    PrevTrack,
}

impl FromStr for MediaKey {
    type Err = InjectError;

    fn from_str(action: &str) -> Result<Self, Self::Err> {
        match action.trim().to_ascii_lowercase().as_str() {
            "playpause" => Ok(MediaKey::PlayPause),
            "nexttrack" => Ok(MediaKey::NextTrack),
            "prevtrack" => Ok(MediaKey::PrevTrack),
            _ => Err(InjectError::UnknownKey(action.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum InjectError {
    #[error("no media key for action '{0}'")]
    UnknownKey(String),

    #[error("cannot initialise key injection: {0}")]
    Backend(String),

    #[error("cannot simulate key press: {0}")]
    KeySimulation(String),
}

/// OS-level media key injection.
pub trait KeyInjector: Send + Sync {
    fn press(&self, key: MediaKey) -> Result<(), InjectError>;
}

/// Injector backed by `enigo`. A fresh `Enigo` is created per press because
/// the handle is not `Send`.
#[derive(Debug, Default)]
pub struct EnigoInjector;

impl KeyInjector for EnigoInjector {
    fn press(&self, key: MediaKey) -> Result<(), InjectError> {
        let mut enigo =
            Enigo::new(&Settings::default()).map_err(|e| InjectError::Backend(e.to_string()))?;

        let key = match key {
            MediaKey::PlayPause => Key::MediaPlayPause,
            MediaKey::NextTrack => Key::MediaNextTrack,
            MediaKey::PrevTrack => Key::MediaPrevTrack,
        };

        enigo
            .key(key, Direction::Click)
            .map_err(|e| InjectError::KeySimulation(e.to_string()))
    }
}

/// Local output: presses the media key named by the action. Always available.
#[derive(Clone)]
pub struct LocalKeySink {
    injector: Arc<dyn KeyInjector>,
}

impl LocalKeySink {
    pub fn new(injector: Arc<dyn KeyInjector>) -> Self {
        Self { injector }
    }

    pub fn send(&self, action: &str) -> Result<(), RunnerError> {
        let to_dispatch = |e: InjectError| RunnerError::Dispatch {
            sink: "local",
            message: e.to_string(),
        };

        let key = action.parse::<MediaKey>().map_err(to_dispatch)?;
        self.injector.press(key).map_err(to_dispatch)?;

        info!("Pressed media key {:?}", key);
        Ok(())
    }
}

impl Default for LocalKeySink {
    fn default() -> Self {
        Self::new(Arc::new(EnigoInjector))
    }
}
