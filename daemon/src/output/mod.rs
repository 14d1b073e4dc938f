pub mod keyboard;
pub mod serial;

use std::sync::{Arc, Mutex, RwLock};

pub use keyboard::{EnigoInjector, InjectError, KeyInjector, LocalKeySink, MediaKey};
pub use serial::SerialSink;
pub use shared::OutputMode;
use shared::OutputStatus;

use crate::error::RunnerError;

/// Where a command actually went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Serial,
    Local,
}

impl SinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkKind::Serial => "serial",
            SinkKind::Local => "local",
        }
    }
}

impl std::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide output mode. Readers see either the old or the new value.
#[derive(Debug, Clone, Default)]
pub struct OutputModeState {
    mode: Arc<RwLock<OutputMode>>,
}

impl OutputModeState {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode: Arc::new(RwLock::new(mode)),
        }
    }

    pub fn get(&self) -> OutputMode {
        *self.mode.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set(&self, mode: OutputMode) {
        *self.mode.write().unwrap_or_else(|e| e.into_inner()) = mode;
    }
}

/// Chooses the sink for each command from the current mode and serial availability.
///
/// `auto` and `serial` both prefer the serial link and fall back to local key
/// injection when no link is open. `local` always injects.
#[derive(Clone)]
pub struct OutputRouter {
    mode: OutputModeState,
    serial: Arc<Mutex<Option<SerialSink>>>,
    local: LocalKeySink,
}

impl OutputRouter {
    pub fn new(local: LocalKeySink) -> Self {
        Self {
            mode: OutputModeState::default(),
            serial: Arc::new(Mutex::new(None)),
            local,
        }
    }

    pub fn attach_serial(&self, sink: SerialSink) {
        tracing::info!("Serial output attached on {}", sink.port());
        *self.serial_slot() = Some(sink);
    }

    /// Close the serial link if open. Returns whether one was open.
    pub fn detach_serial(&self) -> bool {
        self.serial_slot().take().is_some()
    }

    pub fn serial_available(&self) -> bool {
        self.serial_slot().is_some()
    }

    pub fn mode(&self) -> OutputMode {
        self.mode.get()
    }

    pub fn set_mode(&self, mode: OutputMode) {
        self.mode.set(mode);
    }

    /// Parse and apply a mode name. An unknown name changes nothing.
    pub fn select_mode(&self, name: &str) -> Result<OutputStatus, RunnerError> {
        let mode: OutputMode = name.parse()?;
        self.mode.set(mode);
        tracing::info!("Output mode set to {}", mode);
        Ok(self.status())
    }

    pub fn status(&self) -> OutputStatus {
        OutputStatus {
            mode: self.mode(),
            serial_available: self.serial_available(),
        }
    }

    pub fn resolve(&self) -> SinkKind {
        match self.mode() {
            OutputMode::Local => SinkKind::Local,
            OutputMode::Auto | OutputMode::Serial => {
                if self.serial_available() {
                    SinkKind::Serial
                } else {
                    SinkKind::Local
                }
            }
        }
    }

    /// Deliver `action` to the resolved sink. Blocking: call off the async runtime.
    pub fn send(&self, action: &str) -> (SinkKind, Result<(), RunnerError>) {
        if self.resolve() == SinkKind::Serial {
            let mut slot = self.serial_slot();
            if let Some(sink) = slot.as_mut() {
                return (SinkKind::Serial, sink.send(action));
            }
        }
        (SinkKind::Local, self.local.send(action))
    }

    fn serial_slot(&self) -> std::sync::MutexGuard<'_, Option<SerialSink>> {
        self.serial.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};

    #[derive(Clone, Default)]
    struct SharedWriter(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingInjector {
        pressed: Mutex<Vec<MediaKey>>,
    }

    impl KeyInjector for RecordingInjector {
        fn press(&self, key: MediaKey) -> Result<(), InjectError> {
            self.pressed.lock().unwrap().push(key);
            Ok(())
        }
    }

    fn router() -> (OutputRouter, Arc<RecordingInjector>) {
        let injector = Arc::new(RecordingInjector::default());
        (OutputRouter::new(LocalKeySink::new(injector.clone())), injector)
    }

    #[test]
    fn test_auto_without_serial_goes_local() {
        let (router, injector) = router();
        assert_eq!(router.mode(), OutputMode::Auto);

        let (sink, result) = router.send("playpause");
        assert_eq!(sink, SinkKind::Local);
        assert!(result.is_ok());
        assert_eq!(*injector.pressed.lock().unwrap(), vec![MediaKey::PlayPause]);
    }

    #[test]
    fn test_auto_with_serial_goes_serial() {
        let (router, injector) = router();
        let wire = SharedWriter::default();
        router.attach_serial(SerialSink::from_writer("test", Box::new(wire.clone())));

        let (sink, result) = router.send("nexttrack");
        assert_eq!(sink, SinkKind::Serial);
        assert!(result.is_ok());
        assert_eq!(wire.0.lock().unwrap().as_slice(), b"nexttrack\n");
        assert!(injector.pressed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_serial_mode_falls_back_when_link_absent() {
        let (router, _) = router();
        router.set_mode(OutputMode::Serial);
        assert_eq!(router.resolve(), SinkKind::Local);
    }

    #[test]
    fn test_local_mode_ignores_serial() {
        let (router, injector) = router();
        let wire = SharedWriter::default();
        router.attach_serial(SerialSink::from_writer("test", Box::new(wire.clone())));
        router.set_mode(OutputMode::Local);

        let (sink, _) = router.send("prevtrack");
        assert_eq!(sink, SinkKind::Local);
        assert!(wire.0.lock().unwrap().is_empty());
        assert_eq!(injector.pressed.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_select_mode_rejects_unknown_without_change() {
        let (router, _) = router();
        router.set_mode(OutputMode::Local);

        let err = router.select_mode("bogus").unwrap_err();
        assert!(matches!(err, RunnerError::InvalidOutputMode(_)));
        assert_eq!(router.mode(), OutputMode::Local);

        let status = router.select_mode(" Serial ").unwrap();
        assert_eq!(status.mode, OutputMode::Serial);
        assert!(!status.serial_available);
    }

    #[test]
    fn test_detach_serial() {
        let (router, _) = router();
        assert!(!router.detach_serial());

        router.attach_serial(SerialSink::from_writer("test", Box::new(SharedWriter::default())));
        assert!(router.serial_available());
        assert!(router.detach_serial());
        assert!(!router.serial_available());
        assert_eq!(router.resolve(), SinkKind::Local);
    }

    #[test]
    fn test_sink_kind_names() {
        assert_eq!(SinkKind::Serial.to_string(), "serial");
        assert_eq!(SinkKind::Local.as_str(), "local");
    }
}
