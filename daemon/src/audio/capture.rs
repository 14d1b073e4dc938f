use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::mpsc;
use std::thread::JoinHandle;

use crate::audio::buffer::AudioBuffer;
use crate::config::AudioConfig;
use crate::error::RunnerError;

/// An open microphone stream feeding an [`AudioBuffer`].
pub trait AudioStream: Send {
    /// Stop the driver callback and release the device.
    fn close(self: Box<Self>);
}

/// cpal input stream. The `Stream` is not `Send`, so it lives on a dedicated
/// thread for its whole life; this handle only carries the stop channel.
pub struct CpalAudioInput {
    device_name: String,
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalAudioInput {
    pub fn open(
        config: &AudioConfig,
        sample_rate: u32,
        buffer: AudioBuffer,
    ) -> Result<Self, RunnerError> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<String, RunnerError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let config = config.clone();

        let thread = std::thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                let stream = match build_stream(&config, sample_rate, buffer) {
                    Ok((name, stream)) => {
                        let _ = ready_tx.send(Ok(name));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Either an explicit stop or the handle being dropped.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| RunnerError::device("audio", e.to_string()))?;

        let device_name = match ready_rx.recv() {
            Ok(Ok(name)) => name,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(RunnerError::device("audio", "capture thread exited"));
            }
        };

        tracing::info!("Audio capture started on {}", device_name);
        Ok(Self {
            device_name,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    fn shutdown(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("Audio capture thread panicked");
            }
            tracing::info!("Audio capture stopped on {}", self.device_name);
        }
    }
}

impl AudioStream for CpalAudioInput {
    fn close(mut self: Box<Self>) {
        self.shutdown();
    }
}

impl Drop for CpalAudioInput {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn find_device(name: &str) -> Result<Device, RunnerError> {
    let host = cpal::default_host();

    if name.is_empty() || name == "default" {
        return host
            .default_input_device()
            .ok_or_else(|| RunnerError::device("audio", "no default input device found"));
    }

    let devices = host
        .input_devices()
        .map_err(|e| RunnerError::device("audio", e.to_string()))?;
    for device in devices {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(device);
        }
    }
    Err(RunnerError::device(
        "audio",
        format!("input device '{}' not found", name),
    ))
}

/// Prefer the configured channel count at `sample_rate`; otherwise take any
/// layout that supports the rate and downmix.
fn find_config(
    device: &Device,
    channels: u16,
    sample_rate: u32,
) -> Result<(StreamConfig, SampleFormat), RunnerError> {
    let supported: Vec<_> = device
        .supported_input_configs()
        .map_err(|e| RunnerError::device("audio", e.to_string()))?
        .collect();

    let supports_rate = |range: &cpal::SupportedStreamConfigRange| {
        range.min_sample_rate().0 <= sample_rate && range.max_sample_rate().0 >= sample_rate
    };

    let chosen = supported
        .iter()
        .find(|range| range.channels() == channels && supports_rate(range))
        .or_else(|| supported.iter().find(|range| supports_rate(range)))
        .ok_or_else(|| {
            RunnerError::device(
                "audio",
                format!("no input configuration supports {} Hz", sample_rate),
            )
        })?;

    tracing::debug!("Selected audio config: {:?}", chosen);
    let format = chosen.sample_format();
    let config = chosen
        .clone()
        .with_sample_rate(cpal::SampleRate(sample_rate))
        .into();
    Ok((config, format))
}

fn build_stream(
    config: &AudioConfig,
    sample_rate: u32,
    buffer: AudioBuffer,
) -> Result<(String, Stream), RunnerError> {
    let device = find_device(&config.device)?;
    let name = device.name().unwrap_or_else(|_| config.device.clone());
    let (stream_config, format) = find_config(&device, config.channels, sample_rate)?;

    tracing::info!(
        "Configuring audio stream: {}Hz, {} channel(s), {:?}",
        sample_rate,
        stream_config.channels,
        format
    );

    let stream = match format {
        SampleFormat::F32 => input_stream::<f32, _>(&device, &stream_config, buffer, |s| s),
        SampleFormat::I16 => input_stream::<i16, _>(&device, &stream_config, buffer, |s| {
            s as f32 / i16::MAX as f32
        }),
        SampleFormat::U16 => input_stream::<u16, _>(&device, &stream_config, buffer, |s| {
            (s as f32 - 32768.0) / 32768.0
        }),
        other => {
            return Err(RunnerError::device(
                "audio",
                format!("unsupported sample format: {:?}", other),
            ))
        }
    }?;

    stream
        .play()
        .map_err(|e| RunnerError::device("audio", e.to_string()))?;
    Ok((name, stream))
}

fn input_stream<T, F>(
    device: &Device,
    config: &StreamConfig,
    buffer: AudioBuffer,
    convert: F,
) -> Result<Stream, RunnerError>
where
    T: SizedSample + Copy,
    F: Fn(T) -> f32 + Send + 'static,
{
    let channels = usize::from(config.channels);
    let mut mono = Vec::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                mono.clear();
                append_downmixed(&mut mono, data, channels, &convert);
                buffer.append(&mono);
            },
            |err| tracing::error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| RunnerError::device("audio", e.to_string()))
}

/// Average interleaved frames down to mono. A trailing partial frame is
/// averaged over the samples present.
pub fn append_downmixed<T, F>(out: &mut Vec<f32>, data: &[T], channels: usize, convert: F)
where
    T: Copy,
    F: Fn(T) -> f32,
{
    if channels <= 1 {
        out.extend(data.iter().copied().map(convert));
        return;
    }

    for frame in data.chunks(channels) {
        let sum: f32 = frame.iter().copied().map(&convert).sum();
        out.push(sum / frame.len() as f32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mono_passthrough() {
        let mut out = Vec::new();
        append_downmixed(&mut out, &[0.1f32, -0.2, 0.3], 1, |s| s);
        assert_eq!(out, vec![0.1, -0.2, 0.3]);
    }

    #[test]
    fn test_stereo_average() {
        let mut out = Vec::new();
        append_downmixed(&mut out, &[1.0f32, 3.0, -1.0, 1.0], 2, |s| s);
        assert_eq!(out, vec![2.0, 0.0]);
    }

    #[test]
    fn test_partial_trailing_frame() {
        let mut out = Vec::new();
        append_downmixed(&mut out, &[2.0f32, 4.0, 6.0, 8.0, 10.0], 3, |s| s);
        assert_eq!(out, vec![4.0, 9.0]);
    }

    #[test]
    fn test_integer_conversion() {
        let mut out = Vec::new();
        append_downmixed(&mut out, &[i16::MAX, 0], 1, |s| s as f32 / i16::MAX as f32);
        assert_eq!(out, vec![1.0, 0.0]);
    }

    #[test]
    #[ignore = "Requires a microphone"]
    fn test_open_default_device() {
        let buffer = AudioBuffer::new(16000);
        let input = CpalAudioInput::open(&AudioConfig::default(), 16000, buffer.clone()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(500));
        Box::new(input).close();
        assert!(!buffer.is_empty());
    }

    #[test]
    fn test_unknown_device_is_unavailable() {
        let config = AudioConfig {
            device: "no-such-microphone-4242".to_string(),
            ..AudioConfig::default()
        };
        match CpalAudioInput::open(&config, 16000, AudioBuffer::new(16)) {
            Err(RunnerError::DeviceUnavailable { device: "audio", .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("device should not exist"),
        }
    }
}
