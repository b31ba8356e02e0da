use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use clap::{Args, Parser, Subcommand};
use stereo_preview_core::{
    config::{parse_resolution, RESOLUTION_PRESETS},
    AppConfig, CaptureBackend, DisplaySurface, Frame, FrameSink, FrameSource, PreviewPipeline,
    RecordConfig, Scheduler, SharedViewConfig, SystemStats, TickKind,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_RECORD_SECONDS: f64 = 10.0;

fn main() -> stereo_preview_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = match cli.config.as_deref() {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Preview { view, limits } => {
            view.apply(&mut config)?;
            run(&config, None, limits)
        }
        Commands::Record {
            out,
            record_fps,
            codec,
            view,
            mut limits,
        } => {
            view.apply(&mut config)?;
            if let Some(fps) = record_fps {
                config.record.fps = fps;
            }
            if !codec.is_empty() {
                config.record.codecs = codec;
            }
            config.validate()?;
            if limits.duration.is_none() && limits.frames.is_none() {
                limits.duration = Some(DEFAULT_RECORD_SECONDS);
            }
            run(&config, Some(out), limits)
        }
        Commands::Stats { path } => {
            println!("{}", SystemStats::collect(&path));
            Ok(())
        }
    }
}

fn run(
    config: &AppConfig,
    out: Option<PathBuf>,
    limits: Limits,
) -> stereo_preview_core::Result<()> {
    let view = SharedViewConfig::new(config.view);
    let source = match config.preview.capture_device {
        Some(index) => FrameSource::open(
            view,
            capture_backend(config).as_ref(),
            index,
            config.preview.target_fps,
        ),
        None => FrameSource::synthetic(view),
    };
    let sink = FrameSink::ffmpeg(&config.record.ffmpeg_path);
    let mut pipeline = PreviewPipeline::new(source, sink);
    let mut scheduler = Scheduler::new(config.preview.target_fps);
    let mut display = StatusDisplay::default();

    tracing::info!(
        fps = config.preview.target_fps,
        interval_ms = scheduler.preview_interval().as_millis() as u64,
        live = pipeline.source().is_live(),
        "preview started"
    );

    if let Some(out) = out.as_ref() {
        let record = RecordConfig::new(out, &config.record);
        if let Err(err) = pipeline.start_recording(&record) {
            tracing::error!(error = %err, "could not start recording");
            pipeline.shutdown();
            return Err(err);
        }
    }

    let disk_path = out.clone().unwrap_or_else(|| PathBuf::from("/"));
    let started = Instant::now();
    loop {
        match scheduler.wait_next() {
            TickKind::Preview => {
                pipeline.tick(&mut display);
                if limits.reached(started.elapsed(), pipeline.frame_index()) {
                    break;
                }
            }
            TickKind::Stats => log_stats(pipeline.fps(), &disk_path),
        }
    }

    if let Some(summary) = pipeline.shutdown() {
        println!(
            "wrote {} frames with {} to {}",
            summary.frames_written,
            summary.codec,
            summary.output_directory.display()
        );
    }
    let frames = display.frames;
    tracing::info!(frames, "preview stopped");
    Ok(())
}

#[cfg(feature = "v4l")]
fn capture_backend(_config: &AppConfig) -> Box<dyn CaptureBackend> {
    Box::new(stereo_preview_core::V4lCapture)
}

#[cfg(not(feature = "v4l"))]
fn capture_backend(config: &AppConfig) -> Box<dyn CaptureBackend> {
    Box::new(stereo_preview_core::FfmpegCapture::new(&config.record.ffmpeg_path))
}

fn log_stats(fps: f64, disk_path: &Path) {
    let stats = SystemStats::collect(disk_path);
    tracing::info!(
        fps = format_args!("{fps:.1}"),
        cpu_temp_c = stats.cpu_temp_c,
        disk_free_gb = stats.disk_free_gb,
        "{stats}"
    );
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

/// Headless display: tracks what would have been shown.
#[derive(Debug, Default)]
struct StatusDisplay {
    frames: u64,
    last_size: Option<(u32, u32)>,
}

impl DisplaySurface for StatusDisplay {
    fn present(&mut self, frame: &Frame) {
        if self.last_size != Some(frame.size()) {
            tracing::debug!(width = frame.width(), height = frame.height(), "display size changed");
            self.last_size = Some(frame.size());
        }
        self.frames += 1;
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Stereo preview operator console", long_about = None)]
struct Cli {
    /// JSON configuration file; flags override its values.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the preview loop without recording.
    Preview {
        #[command(flatten)]
        view: ViewArgs,
        #[command(flatten)]
        limits: Limits,
    },
    /// Run the preview loop and record every tick to a directory.
    Record {
        /// Directory receiving recording.mp4 and timestamps.csv.
        #[arg(short, long)]
        out: PathBuf,
        /// Frame rate declared in the video container.
        #[arg(long)]
        record_fps: Option<u32>,
        /// Encoder to try, in order of preference. Repeat to build a list.
        #[arg(long)]
        codec: Vec<String>,
        #[command(flatten)]
        view: ViewArgs,
        #[command(flatten)]
        limits: Limits,
    },
    /// Print one host health reading.
    Stats {
        /// Path whose filesystem free space is reported.
        #[arg(default_value = "/")]
        path: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ViewArgs {
    /// Preview rate; clamped to 5..=120.
    #[arg(long)]
    fps: Option<u32>,
    /// Panel size as WIDTHxHEIGHT.
    #[arg(long)]
    resolution: Option<String>,
    /// Hide the shifted secondary panel.
    #[arg(long)]
    no_secondary: bool,
    /// Hide the difference panel.
    #[arg(long)]
    no_difference: bool,
    /// Capture device index; synthetic frames when omitted.
    #[arg(long)]
    device: Option<u32>,
    /// ffmpeg binary used for capture and encoding.
    #[arg(long)]
    ffmpeg: Option<PathBuf>,
}

impl ViewArgs {
    fn apply(self, config: &mut AppConfig) -> stereo_preview_core::Result<()> {
        if let Some(fps) = self.fps {
            config.preview.set_target_fps(fps);
        }
        if let Some(resolution) = self.resolution.as_deref() {
            let (width, height) = parse_resolution(resolution)?;
            if !RESOLUTION_PRESETS.contains(&(width, height)) {
                tracing::info!(width, height, "using a non-preset resolution");
            }
            config.view.width = width;
            config.view.height = height;
        }
        if self.no_secondary {
            config.view.show_secondary = false;
        }
        if self.no_difference {
            config.view.show_difference = false;
        }
        if self.device.is_some() {
            config.preview.capture_device = self.device;
        }
        if let Some(ffmpeg) = self.ffmpeg {
            config.record.ffmpeg_path = ffmpeg;
        }
        config.validate()
    }
}

#[derive(Args, Debug)]
struct Limits {
    /// Stop after this many seconds.
    #[arg(long)]
    duration: Option<f64>,
    /// Stop after this many ticks.
    #[arg(long)]
    frames: Option<u64>,
}

impl Limits {
    fn reached(&self, elapsed: Duration, frames: u64) -> bool {
        self.duration.is_some_and(|secs| elapsed.as_secs_f64() >= secs)
            || self.frames.is_some_and(|limit| frames >= limit)
    }
}
