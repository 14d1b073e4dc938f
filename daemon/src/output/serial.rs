use std::io::Write;
use std::time::Duration;
use tracing::info;

use crate::config::SerialConfig;
use crate::error::RunnerError;

/// Line-oriented, fire-and-forget serial link: one `"<action>\n"` per command.
pub struct SerialSink {
    port: String,
    writer: Box<dyn Write + Send>,
}

impl SerialSink {
    pub fn open(config: &SerialConfig) -> Result<Self, RunnerError> {
        info!(
            "Opening serial port {} at {} baud",
            config.port, config.baud_rate
        );

        let port = serialport::new(config.port.as_str(), config.baud_rate)
            .timeout(Duration::from_millis(config.timeout_ms))
            .open()
            .map_err(|e| RunnerError::device("serial", format!("{}: {}", config.port, e)))?;

        info!("Connected to serial port {}", config.port);
        Ok(Self::from_writer(config.port.clone(), Box::new(port)))
    }

    pub fn from_writer(port: impl Into<String>, writer: Box<dyn Write + Send>) -> Self {
        Self {
            port: port.into(),
            writer,
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn send(&mut self, action: &str) -> Result<(), RunnerError> {
        let line = format!("{action}\n");
        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(|e| RunnerError::Dispatch {
                sink: "serial",
                message: format!("{}: {}", self.port, e),
            })
    }
}

impl Drop for SerialSink {
    fn drop(&mut self) {
        info!("Serial port {} closed", self.port);
    }
}
