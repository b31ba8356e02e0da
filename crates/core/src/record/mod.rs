use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

use crate::{
    config::RecordingSettings,
    encoder::{try_open_in_order, EncoderBackend, FfmpegBackend, VideoStream},
    Frame, PreviewError, Result,
};

pub const VIDEO_FILE_NAME: &str = "recording.mp4";
pub const TIMESTAMP_FILE_NAME: &str = "timestamps.csv";
pub const TIMESTAMP_HEADER: &str = "frame_idx,unix_time";

/// Parameters for a single recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordConfig {
    pub output_directory: PathBuf,
    pub fps: u32,
    pub codecs: Vec<String>,
}

impl RecordConfig {
    pub fn new(output_directory: impl Into<PathBuf>, settings: &RecordingSettings) -> Self {
        Self {
            output_directory: output_directory.into(),
            fps: settings.fps,
            codecs: settings.codecs.clone(),
        }
    }
}

/// What a closed session produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingSummary {
    pub output_directory: PathBuf,
    pub codec: String,
    pub frames_written: u64,
    pub duration: Duration,
}

/// Append-only `frame_idx,unix_time` log.
struct TimestampLog {
    writer: BufWriter<File>,
    last_unix: f64,
}

impl TimestampLog {
    fn create(path: &Path) -> Result<Self> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "{TIMESTAMP_HEADER}")?;
        writer.flush()?;
        Ok(Self {
            writer,
            last_unix: 0.0,
        })
    }

    /// Wall-clock seconds, never earlier than the previous row.
    fn append(&mut self, frame_index: u64) -> std::io::Result<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        let unix = now.max(self.last_unix);
        self.last_unix = unix;
        writeln!(self.writer, "{frame_index},{unix:.6}")
    }

    fn close(mut self) -> std::io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }
}

/// An armed recording. Dropping the session closes the encoder and the
/// timestamp log.
pub struct RecordSession {
    output_directory: PathBuf,
    declared_fps: u32,
    frame_size: (u32, u32),
    codec: String,
    encoder: Option<Box<dyn VideoStream>>,
    timestamps: Option<TimestampLog>,
    started_at: SystemTime,
    started: Instant,
    frames_written: u64,
    write_failed: bool,
    size_mismatch_reported: bool,
}

impl RecordSession {
    fn open(
        backend: &dyn EncoderBackend,
        config: &RecordConfig,
        frame_size: (u32, u32),
    ) -> Result<Self> {
        if frame_size.0 == 0 || frame_size.1 == 0 {
            return Err(PreviewError::InvalidConfig(format!(
                "frame size {}x{} must be positive",
                frame_size.0, frame_size.1
            )));
        }
        if config.fps == 0 {
            return Err(PreviewError::InvalidConfig("record fps must be positive".into()));
        }

        fs::create_dir_all(&config.output_directory)?;
        let video_path = config.output_directory.join(VIDEO_FILE_NAME);
        let (encoder, codec) =
            try_open_in_order(backend, &video_path, &config.codecs, config.fps, frame_size)?;
        let log_path = config.output_directory.join(TIMESTAMP_FILE_NAME);
        let timestamps = match TimestampLog::create(&log_path) {
            Ok(timestamps) => timestamps,
            Err(err) => {
                // A failed start leaves neither output behind.
                if let Err(finish_err) = encoder.finish() {
                    tracing::debug!(error = %finish_err, "abandoned encoder failed to finish");
                }
                if let Err(remove_err) = fs::remove_file(&video_path) {
                    tracing::debug!(error = %remove_err, "could not remove abandoned video");
                }
                return Err(err);
            }
        };

        Ok(Self {
            output_directory: config.output_directory.clone(),
            declared_fps: config.fps,
            frame_size,
            codec,
            encoder: Some(encoder),
            timestamps: Some(timestamps),
            started_at: SystemTime::now(),
            started: Instant::now(),
            frames_written: 0,
            write_failed: false,
            size_mismatch_reported: false,
        })
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    pub fn declared_fps(&self) -> u32 {
        self.declared_fps
    }

    pub fn frame_size(&self) -> (u32, u32) {
        self.frame_size
    }

    /// Codec chosen from the preference list.
    pub fn codec(&self) -> &str {
        &self.codec
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn write(&mut self, frame: &Frame, frame_index: u64) {
        if frame.size() != self.frame_size {
            // Warn once per session; a layout change repeats this every tick.
            if self.size_mismatch_reported {
                tracing::debug!(frame_index, size = ?frame.size(), "dropping mismatched frame");
            } else {
                tracing::warn!(
                    frame_index,
                    size = ?frame.size(),
                    expected = ?self.frame_size,
                    "dropping frames with mismatched size"
                );
                self.size_mismatch_reported = true;
            }
            return;
        }
        let (Some(encoder), Some(timestamps)) = (self.encoder.as_mut(), self.timestamps.as_mut())
        else {
            return;
        };

        if let Err(err) = encoder.write_frame(frame) {
            Self::report_failure(&mut self.write_failed, frame_index, "encoder", &err.to_string());
            return;
        }
        if let Err(err) = timestamps.append(frame_index) {
            let error = err.to_string();
            Self::report_failure(&mut self.write_failed, frame_index, "timestamp log", &error);
        }
        self.frames_written += 1;
    }

    /// Warns on the first failure of a session, then drops to debug.
    fn report_failure(already_failed: &mut bool, frame_index: u64, output: &str, error: &str) {
        if *already_failed {
            tracing::debug!(frame_index, output, error, "recording write failed");
        } else {
            tracing::warn!(frame_index, output, error, "recording write failed");
            *already_failed = true;
        }
    }

    /// Closes the encoder, then the log. Safe to call more than once.
    fn release(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            if let Err(err) = encoder.finish() {
                tracing::warn!(error = %err, "failed to finalize video");
            }
        }
        if let Some(timestamps) = self.timestamps.take() {
            if let Err(err) = timestamps.close() {
                tracing::warn!(error = %err, "failed to close timestamp log");
            }
        }
    }

    fn close(mut self) -> RecordingSummary {
        self.release();
        RecordingSummary {
            output_directory: self.output_directory.clone(),
            codec: self.codec.clone(),
            frames_written: self.frames_written,
            duration: self.started.elapsed(),
        }
    }
}

impl Drop for RecordSession {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for RecordSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordSession")
            .field("output_directory", &self.output_directory)
            .field("declared_fps", &self.declared_fps)
            .field("frame_size", &self.frame_size)
            .field("codec", &self.codec)
            .field("frames_written", &self.frames_written)
            .finish()
    }
}

/// Persists preview frames while armed.
///
/// The sink is either idle or holds exactly one [`RecordSession`]. Writes
/// to an idle sink are ignored.
pub struct FrameSink {
    backend: Box<dyn EncoderBackend>,
    session: Option<RecordSession>,
}

impl FrameSink {
    pub fn new(backend: Box<dyn EncoderBackend>) -> Self {
        Self {
            backend,
            session: None,
        }
    }

    pub fn ffmpeg(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self::new(Box::new(FfmpegBackend::new(ffmpeg_path)))
    }

    pub fn is_armed(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&RecordSession> {
        self.session.as_ref()
    }

    /// Arms the sink. On error the sink stays idle.
    pub fn start(&mut self, config: &RecordConfig, frame_size: (u32, u32)) -> Result<()> {
        if self.session.is_some() {
            return Err(PreviewError::AlreadyRecording);
        }
        let session = RecordSession::open(self.backend.as_ref(), config, frame_size)?;
        tracing::info!(
            directory = %session.output_directory.display(),
            codec = %session.codec,
            fps = session.declared_fps,
            width = frame_size.0,
            height = frame_size.1,
            "recording started"
        );
        self.session = Some(session);
        Ok(())
    }

    pub fn write(&mut self, frame: &Frame, frame_index: u64) {
        if let Some(session) = self.session.as_mut() {
            session.write(frame, frame_index);
        }
    }

    /// Disarms the sink and returns what the session produced, or `None` if
    /// it was already idle.
    pub fn stop(&mut self) -> Option<RecordingSummary> {
        let summary = self.session.take()?.close();
        tracing::info!(
            directory = %summary.output_directory.display(),
            frames = summary.frames_written,
            seconds = summary.duration.as_secs_f64(),
            "recording stopped"
        );
        Some(summary)
    }
}

impl std::fmt::Debug for FrameSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSink")
            .field("session", &self.session)
            .finish()
    }
}
