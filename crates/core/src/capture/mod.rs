//! Live capture collaborator.
//!
//! Devices are best-effort: a device that cannot be opened or stops
//! delivering frames simply yields `None`, and the
//! [`FrameSource`](crate::FrameSource) falls back to synthetic output.

use std::{
    io::Read,
    path::{Path, PathBuf},
    process::{Child, ChildStdout, Command, Stdio},
};

use crate::{Frame, PreviewError, Result};

#[cfg(feature = "v4l")]
mod v4l2;

#[cfg(feature = "v4l")]
pub use v4l2::V4lCapture;

/// Size and rate asked of a capture device. Devices may ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// An opened capture device. Dropping it releases the hardware.
pub trait CaptureDevice: Send {
    /// Reads one decoded frame, or `None` when no frame is available.
    fn read(&mut self) -> Option<Frame>;
}

/// Opens capture devices by index.
pub trait CaptureBackend {
    fn open(&self, index: u32, request: &CaptureRequest) -> Result<Box<dyn CaptureDevice>>;
}

/// Reads V4L2 devices through an `ffmpeg` child process emitting raw RGB.
///
/// `open` only succeeds once the device node exists and ffmpeg has
/// delivered a first complete frame.
#[derive(Debug, Clone)]
pub struct FfmpegCapture {
    ffmpeg_path: PathBuf,
    device_dir: PathBuf,
}

impl FfmpegCapture {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            device_dir: PathBuf::from("/dev"),
        }
    }

    /// Looks for `videoN` nodes in `dir` instead of `/dev`.
    pub fn with_device_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.device_dir = dir.into();
        self
    }

    pub fn device_path(&self, index: u32) -> PathBuf {
        self.device_dir.join(format!("video{index}"))
    }

    fn spawn(&self, device: &Path, request: &CaptureRequest) -> Result<Child> {
        let child = Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-loglevel", "error", "-f", "v4l2"])
            .arg("-framerate")
            .arg(request.fps.to_string())
            .arg("-video_size")
            .arg(format!("{}x{}", request.width, request.height))
            .arg("-i")
            .arg(device)
            .arg("-vf")
            .arg(format!("scale={}:{}", request.width, request.height))
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        Ok(child)
    }
}

impl Default for FfmpegCapture {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl CaptureBackend for FfmpegCapture {
    fn open(&self, index: u32, request: &CaptureRequest) -> Result<Box<dyn CaptureDevice>> {
        let device = self.device_path(index);
        if !device.exists() {
            return Err(format!("{} does not exist", device.display()).into());
        }

        let mut child = self.spawn(&device, request)?;
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(PreviewError::from("failed to capture ffmpeg stdout"));
        };

        let mut capture = FfmpegCaptureDevice {
            child,
            stdout,
            width: request.width,
            height: request.height,
            pending: None,
            exhausted: false,
        };
        // The first frame confirms ffmpeg could open and decode the device.
        capture.pending = capture.read_frame();
        if capture.pending.is_none() {
            return Err(format!("{} delivered no frames", device.display()).into());
        }

        tracing::info!(
            device = %device.display(),
            width = request.width,
            height = request.height,
            "capture device opened"
        );
        Ok(Box::new(capture))
    }
}

struct FfmpegCaptureDevice {
    child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
    pending: Option<Frame>,
    exhausted: bool,
}

impl FfmpegCaptureDevice {
    fn read_frame(&mut self) -> Option<Frame> {
        if self.exhausted {
            return None;
        }
        let mut buffer = vec![0; self.width as usize * self.height as usize * 3];
        if let Err(err) = self.stdout.read_exact(&mut buffer) {
            tracing::debug!(error = %err, "capture stream ended");
            self.exhausted = true;
            return None;
        }
        Frame::from_raw(self.width, self.height, buffer)
    }
}

impl CaptureDevice for FfmpegCaptureDevice {
    fn read(&mut self) -> Option<Frame> {
        self.pending.take().or_else(|| self.read_frame())
    }
}

impl Drop for FfmpegCaptureDevice {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
