//! Core library for the Stereo Preview operator console.
//!
//! A [`FrameSource`] produces one image per scheduler tick, either from a
//! live capture device or from a deterministic synthetic pattern. A
//! [`FrameSink`] persists those frames, while armed, to an MP4 file with a
//! sibling timestamp log. [`PreviewPipeline`] wires the two together for
//! one tick at a time and [`Scheduler`] paces the ticks.

pub mod capture;
pub mod config;
pub mod encoder;
pub mod error;
#[cfg(all(test, unix))]
mod fake_ffmpeg;
pub mod frame;
pub mod health;
pub mod pacing;
pub mod pipeline;
pub mod record;
pub mod render;
pub mod source;

#[cfg(feature = "v4l")]
pub use capture::V4lCapture;
pub use capture::{CaptureBackend, CaptureDevice, CaptureRequest, FfmpegCapture};
pub use config::{AppConfig, PreviewSettings, RecordingSettings, SharedViewConfig, ViewConfig};
pub use encoder::{try_open_in_order, EncoderBackend, FfmpegBackend, VideoStream};
pub use error::{PreviewError, Result};
pub use frame::Frame;
pub use health::SystemStats;
pub use pacing::{FpsMeter, Scheduler, TickKind, Ticker};
pub use pipeline::{DisplaySurface, NullDisplay, PreviewPipeline};
pub use record::{FrameSink, RecordConfig, RecordSession, RecordingSummary};
pub use source::{synthetic_frame, FrameSource};
