use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use serde::{Deserialize, Serialize};

use crate::{PreviewError, Result};

/// Lowest preview rate the console accepts.
pub const MIN_TARGET_FPS: u32 = 5;
/// Highest preview rate the console accepts.
pub const MAX_TARGET_FPS: u32 = 120;

/// Resolutions offered to the operator.
pub const RESOLUTION_PRESETS: [(u32, u32); 4] = [(640, 480), (848, 480), (960, 540), (1280, 720)];

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub view: ViewConfig,
    pub preview: PreviewSettings,
    pub record: RecordingSettings,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing fields fall back to defaults
    /// and the preview rate is clamped to the supported range.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&raw)?;
        let requested = config.preview.target_fps;
        config.preview.set_target_fps(requested);
        if config.preview.target_fps != requested {
            tracing::warn!(
                requested,
                target_fps = config.preview.target_fps,
                "target_fps clamped"
            );
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.view.width == 0 || self.view.height == 0 {
            return Err(PreviewError::InvalidConfig(format!(
                "resolution {}x{} must be positive",
                self.view.width, self.view.height
            )));
        }
        if !(MIN_TARGET_FPS..=MAX_TARGET_FPS).contains(&self.preview.target_fps) {
            return Err(PreviewError::InvalidConfig(format!(
                "target_fps {} is outside {MIN_TARGET_FPS}..={MAX_TARGET_FPS}",
                self.preview.target_fps
            )));
        }
        if self.record.fps == 0 {
            return Err(PreviewError::InvalidConfig("record fps must be positive".into()));
        }
        if self.record.codecs.is_empty() {
            return Err(PreviewError::InvalidConfig("codec list is empty".into()));
        }
        Ok(())
    }
}

/// Panel layout and size of the preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub show_secondary: bool,
    pub show_difference: bool,
    pub width: u32,
    pub height: u32,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            show_secondary: true,
            show_difference: true,
            width: 848,
            height: 480,
        }
    }
}

/// Settings of the tick loop and of the frame source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewSettings {
    pub target_fps: u32,
    /// Index of the capture device; synthetic frames when unset.
    pub capture_device: Option<u32>,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            target_fps: 30,
            capture_device: None,
        }
    }
}

impl PreviewSettings {
    /// Sets the preview rate, clamped to the supported range.
    pub fn set_target_fps(&mut self, fps: u32) {
        self.target_fps = fps.clamp(MIN_TARGET_FPS, MAX_TARGET_FPS);
    }
}

/// Configuration options for the recording subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    pub fps: u32,
    /// Encoder names in order of preference.
    pub codecs: Vec<String>,
    pub ffmpeg_path: PathBuf,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            fps: 30,
            codecs: default_codecs(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

/// Efficient H.264 encoders first, then the universally available MPEG-4 part 2.
pub fn default_codecs() -> Vec<String> {
    ["libx264", "libopenh264", "mpeg4"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Parses `WIDTHxHEIGHT` (also accepts `W X H` with spaces around the separator).
pub fn parse_resolution(value: &str) -> Result<(u32, u32)> {
    let lower = value.to_ascii_lowercase();
    let (w, h) = lower
        .split_once('x')
        .ok_or_else(|| PreviewError::InvalidConfig(format!("`{value}` is not WIDTHxHEIGHT")))?;
    let parse = |part: &str| {
        part.trim()
            .parse::<u32>()
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| PreviewError::InvalidConfig(format!("`{value}` is not WIDTHxHEIGHT")))
    };
    Ok((parse(w)?, parse(h)?))
}

/// Process-wide view settings shared between the control surface and the
/// frame source.
#[derive(Debug, Clone, Default)]
pub struct SharedViewConfig {
    inner: Arc<RwLock<ViewConfig>>,
}

impl SharedViewConfig {
    pub fn new(view: ViewConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(view)),
        }
    }

    /// Copies the current settings. Dimensions are never reported below one.
    pub fn snapshot(&self) -> ViewConfig {
        let mut view = match self.inner.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        };
        view.width = view.width.max(1);
        view.height = view.height.max(1);
        view
    }

    pub fn update(&self, apply: impl FnOnce(&mut ViewConfig)) {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        apply(&mut *guard);
    }

    pub fn set_flags(&self, show_secondary: bool, show_difference: bool) {
        self.update(|view| {
            view.show_secondary = show_secondary;
            view.show_difference = show_difference;
        });
    }

    pub fn set_resolution(&self, width: u32, height: u32) {
        self.update(|view| {
            view.width = width;
            view.height = height;
        });
    }
}
