use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, ErrorKind, Read};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::time::Duration;

use crate::config::CameraConfig;
use crate::error::RunnerError;
use crate::video::frame::{Frame, FrameRead, FrameSource};

/// Longest single wait for camera bytes before `read_frame` returns `Pending`.
const READ_WAIT: Duration = Duration::from_millis(100);

/// Byte stream a raw camera reads from.
pub trait FrameInput: Read + Send {
    /// Wait up to `timeout` for bytes (or end of stream) to be readable.
    /// Inputs that never block keep the default.
    fn wait_readable(&self, _timeout: Duration) -> io::Result<bool> {
        Ok(true)
    }
}

impl FrameInput for File {
    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        let mut fd = libc::pollfd {
            fd: self.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

        // SAFETY: `fd` is a single valid pollfd that outlives the call.
        match unsafe { libc::poll(&mut fd, 1, millis) } {
            -1 => {
                let err = io::Error::last_os_error();
                if err.kind() == ErrorKind::Interrupted {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
            0 => Ok(false),
            _ => Ok(true),
        }
    }
}

impl<T: AsRef<[u8]> + Send> FrameInput for Cursor<T> {}

/// Camera fed by a raw RGB24 byte stream of fixed-size frames, e.g.
/// `ffmpeg -f v4l2 -i /dev/video0 -pix_fmt rgb24 -f rawvideo <fifo>`.
///
/// A FIFO is opened non-blocking: until a writer connects, and whenever the
/// writer stalls, reads come back `Pending` instead of holding the loop.
pub struct RawVideoSource<R> {
    reader: R,
    width: usize,
    height: usize,
    /// Bytes of the frame being assembled.
    partial: Vec<u8>,
    filled: usize,
    frames_read: u64,
}

impl RawVideoSource<File> {
    pub fn open(config: &CameraConfig) -> Result<Self, RunnerError> {
        let path = config.source.as_ref().ok_or_else(|| {
            RunnerError::device("camera", format!("no frame source for camera {}", config.index))
        })?;

        tracing::info!(
            "Opening camera {} from {:?} ({}x{} @ {} fps)",
            config.index,
            path,
            config.width,
            config.height,
            config.fps
        );

        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(|e| RunnerError::device("camera", format!("{}: {}", path.display(), e)))?;
        Self::new(file, config.width as usize, config.height as usize)
    }
}

impl<R: FrameInput> RawVideoSource<R> {
    pub fn new(reader: R, width: usize, height: usize) -> Result<Self, RunnerError> {
        if width == 0 || height == 0 {
            return Err(RunnerError::config("camera", "width and height must be positive"));
        }
        Ok(Self {
            reader,
            width,
            height,
            partial: vec![0u8; width * height * 3],
            filled: 0,
            frames_read: 0,
        })
    }

    fn take_frame(&mut self) -> Result<Frame, RunnerError> {
        let pixels = std::mem::replace(&mut self.partial, vec![0u8; self.width * self.height * 3]);
        self.filled = 0;
        self.frames_read += 1;
        Frame::new(self.width, self.height, pixels)
    }
}

impl<R: FrameInput> FrameSource for RawVideoSource<R> {
    fn read_frame(&mut self) -> Result<FrameRead, RunnerError> {
        let camera_error = |e: io::Error| RunnerError::device("camera", e.to_string());

        while self.filled < self.partial.len() {
            if !self.reader.wait_readable(READ_WAIT).map_err(camera_error)? {
                return Ok(FrameRead::Pending);
            }

            match self.reader.read(&mut self.partial[self.filled..]) {
                Ok(0) => {
                    if self.filled > 0 {
                        tracing::warn!("Discarding truncated final frame ({} bytes)", self.filled);
                    }
                    return Ok(FrameRead::EndOfStream);
                }
                Ok(n) => self.filled += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(FrameRead::Pending),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(camera_error(e)),
            }
        }

        self.take_frame().map(FrameRead::Frame)
    }

    fn close(&mut self) {
        tracing::info!("Camera closed after {} frames", self.frames_read);
    }
}
