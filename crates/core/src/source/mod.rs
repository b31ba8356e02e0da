use std::time::Instant;

use image::{Rgb, RgbImage};

use crate::{
    capture::{CaptureBackend, CaptureDevice, CaptureRequest},
    config::{SharedViewConfig, ViewConfig},
    render, Frame,
};

/// Horizontal offset of the secondary view relative to the base view.
pub const SECONDARY_SHIFT: i64 = 18;
pub const CIRCLE_RADIUS: i32 = 35;
pub const CAPTION: &str = "UI Preview (replace FrameProvider with pipeline output)";

const TEXT_SCALE: u32 = 2;
const CIRCLE_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const TEXT_MARGIN: i32 = 20;
const CAPTION_BASELINE: i32 = 40;

/// The two views every synthetic frame is derived from.
#[derive(Debug, Clone)]
pub struct SyntheticPanels {
    pub base: RgbImage,
    pub secondary: RgbImage,
}

/// Renders the base test pattern at time `t` (seconds) and the shifted
/// secondary view derived from it.
pub fn synthetic_panels(view: &ViewConfig, t: f64) -> SyntheticPanels {
    let (w, h) = (f64::from(view.width), f64::from(view.height));
    let mut base = RgbImage::new(view.width, view.height);

    let cx = (w * 0.5 + w * 0.25 * t.sin()) as i32;
    let cy = (h * 0.5 + h * 0.15 * (t * 0.7).cos()) as i32;
    render::fill_circle(&mut base, cx, cy, CIRCLE_RADIUS, CIRCLE_COLOR);
    render::draw_text(&mut base, CAPTION, TEXT_MARGIN, CAPTION_BASELINE, TEXT_SCALE, TEXT_COLOR);

    let secondary = render::roll_horizontal(&base, SECONDARY_SHIFT);
    SyntheticPanels { base, secondary }
}

/// Concatenates base, optional secondary and optional difference panels.
///
/// The secondary view always feeds the difference panel, even when it is not
/// shown itself.
pub fn compose(view: &ViewConfig, panels: &SyntheticPanels) -> RgbImage {
    let difference = view.show_difference.then(|| {
        let diff = render::abs_diff(&panels.base, &panels.secondary);
        render::apply_turbo(&render::luminance(&diff))
    });

    let mut parts = vec![&panels.base];
    if view.show_secondary {
        parts.push(&panels.secondary);
    }
    if let Some(difference) = difference.as_ref() {
        parts.push(difference);
    }
    render::hstack(&parts)
}

/// Fully composed and stamped synthetic frame at time `t`.
pub fn synthetic_frame(view: &ViewConfig, t: f64) -> Frame {
    let mut image = compose(view, &synthetic_panels(view, t));
    stamp_resolution(&mut image);
    Frame::from_image(image)
}

pub fn resolution_label(width: u32, height: u32) -> String {
    format!("{width}x{height}")
}

/// Burns the image's own dimensions into its bottom-left corner.
pub fn stamp_resolution(image: &mut RgbImage) {
    let label = resolution_label(image.width(), image.height());
    let baseline = image.height() as i32 - TEXT_MARGIN;
    render::draw_text(image, &label, TEXT_MARGIN, baseline, TEXT_SCALE, TEXT_COLOR);
}

/// Produces one preview frame per tick, from a live device when one is
/// attached and otherwise from the synthetic pattern.
pub struct FrameSource {
    view: SharedViewConfig,
    capture: Option<Box<dyn CaptureDevice>>,
    capture_healthy: bool,
    started: Instant,
}

impl FrameSource {
    pub fn synthetic(view: SharedViewConfig) -> Self {
        Self {
            view,
            capture: None,
            capture_healthy: false,
            started: Instant::now(),
        }
    }

    pub fn with_capture(view: SharedViewConfig, device: Box<dyn CaptureDevice>) -> Self {
        Self {
            capture: Some(device),
            capture_healthy: true,
            ..Self::synthetic(view)
        }
    }

    /// Opens capture device `index`, requesting the configured resolution.
    /// An open failure leaves the source in synthetic mode.
    pub fn open(
        view: SharedViewConfig,
        backend: &dyn CaptureBackend,
        index: u32,
        fps: u32,
    ) -> Self {
        let snapshot = view.snapshot();
        let request = CaptureRequest {
            width: snapshot.width,
            height: snapshot.height,
            fps,
        };
        match backend.open(index, &request) {
            Ok(device) => Self::with_capture(view, device),
            Err(err) => {
                tracing::warn!(
                    index,
                    error = %err,
                    "capture device unavailable, using synthetic frames"
                );
                Self::synthetic(view)
            }
        }
    }

    pub fn view(&self) -> &SharedViewConfig {
        &self.view
    }

    pub fn is_live(&self) -> bool {
        self.capture.is_some()
    }

    /// Seconds since the source was constructed.
    pub fn elapsed(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub fn next_frame(&mut self) -> Frame {
        if let Some(frame) = self.read_capture() {
            let mut image = frame.into_image();
            stamp_resolution(&mut image);
            return Frame::from_image(image);
        }

        let view = self.view.snapshot();
        synthetic_frame(&view, self.elapsed())
    }

    /// Releases the capture device, if any. Later frames are synthetic.
    pub fn close(&mut self) {
        if self.capture.take().is_some() {
            tracing::info!("capture device released");
        }
    }

    fn read_capture(&mut self) -> Option<Frame> {
        let device = self.capture.as_mut()?;
        match device.read() {
            Some(frame) => {
                if !self.capture_healthy {
                    tracing::info!("capture device recovered");
                }
                self.capture_healthy = true;
                Some(frame)
            }
            None => {
                if self.capture_healthy {
                    tracing::warn!("capture read failed, falling back to synthetic frames");
                } else {
                    tracing::debug!("capture read failed");
                }
                self.capture_healthy = false;
                None
            }
        }
    }
}

impl std::fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSource")
            .field("view", &self.view.snapshot())
            .field("live", &self.is_live())
            .field("capture_healthy", &self.capture_healthy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;
    use crate::{PreviewError, Result};

    fn view(width: u32, height: u32, show_secondary: bool, show_difference: bool) -> ViewConfig {
        ViewConfig {
            show_secondary,
            show_difference,
            width,
            height,
        }
    }

    #[test]
    fn composed_width_follows_view_flags() {
        let cases = [
            (false, false, 1),
            (true, false, 2),
            (true, true, 3),
            (false, true, 2),
        ];
        for (secondary, difference, panels) in cases {
            let frame = synthetic_frame(&view(120, 90, secondary, difference), 1.25);
            assert_eq!(frame.size(), (120 * panels, 90), "{secondary} {difference}");
        }
    }

    #[test]
    fn secondary_is_base_shifted_by_eighteen_pixels() {
        let config = view(97, 60, true, true);
        for t in [0.0, 0.4, 2.5, 11.0, 123.456] {
            let panels = synthetic_panels(&config, t);
            let w = config.width as i64;
            for y in 0..config.height {
                for x in 0..config.width {
                    let src = (x as i64 - SECONDARY_SHIFT).rem_euclid(w) as u32;
                    assert_eq!(panels.secondary.get_pixel(x, y), panels.base.get_pixel(src, y));
                }
            }
        }
    }

    #[test]
    fn synthetic_frames_are_reproducible() {
        let config = view(160, 120, true, true);
        assert_eq!(synthetic_frame(&config, 3.0), synthetic_frame(&config, 3.0));
        assert_ne!(synthetic_frame(&config, 3.0), synthetic_frame(&config, 4.0));
    }

    #[test]
    fn overlay_reports_composed_dimensions() {
        let config = view(200, 80, true, true);
        let t = 0.75;
        let mut expected = compose(&config, &synthetic_panels(&config, t));
        render::draw_text(&mut expected, "600x80", TEXT_MARGIN, 60, TEXT_SCALE, TEXT_COLOR);

        let frame = synthetic_frame(&config, t);
        assert_eq!(frame.image(), &expected);
        assert_eq!(resolution_label(frame.width(), frame.height()), "600x80");
    }

    #[test]
    fn difference_panel_is_empty_where_views_agree() {
        let config = view(100, 120, false, true);
        let panels = synthetic_panels(&config, 0.0);
        let composed = compose(&config, &panels);

        // Bottom row has neither circle nor text, so base == secondary there.
        let black = render::apply_turbo(&image::GrayImage::new(1, 1));
        assert_eq!(composed.get_pixel(150, 119), black.get_pixel(0, 0));
    }

    #[test]
    fn next_frame_is_stable_over_many_calls() {
        let mut source = FrameSource::synthetic(SharedViewConfig::new(view(100, 50, false, false)));
        for _ in 0..2_000 {
            assert_eq!(source.next_frame().size(), (100, 50));
        }
    }

    #[test]
    fn picks_up_view_changes_between_frames() {
        let shared = SharedViewConfig::new(view(64, 48, false, false));
        let mut source = FrameSource::synthetic(shared.clone());
        assert_eq!(source.next_frame().width(), 64);

        shared.set_flags(true, true);
        assert_eq!(source.next_frame().width(), 192);
        shared.set_resolution(32, 16);
        assert_eq!(source.next_frame().size(), (96, 16));
    }

    struct ScriptedDevice {
        frames: usize,
        reads: Arc<AtomicUsize>,
    }

    impl CaptureDevice for ScriptedDevice {
        fn read(&mut self) -> Option<Frame> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            (n < self.frames)
                .then(|| Frame::from_image(RgbImage::from_pixel(40, 30, Rgb([9, 9, 9]))))
        }
    }

    #[test]
    fn live_frames_are_stamped_and_failures_fall_back() {
        let reads = Arc::new(AtomicUsize::new(0));
        let device = ScriptedDevice {
            frames: 1,
            reads: reads.clone(),
        };
        let shared = SharedViewConfig::new(view(100, 50, true, false));
        let mut source = FrameSource::with_capture(shared, Box::new(device));

        let live = source.next_frame();
        assert_eq!(live.size(), (40, 30));
        assert_eq!(live.pixel(0, 0), [9, 9, 9]);

        let fallback = source.next_frame();
        assert_eq!(fallback.size(), (200, 50));
        assert_eq!(reads.load(Ordering::SeqCst), 2);

        source.close();
        assert!(!source.is_live());
        source.next_frame();
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    struct MissingBackend;

    impl CaptureBackend for MissingBackend {
        fn open(&self, index: u32, _request: &CaptureRequest) -> Result<Box<dyn CaptureDevice>> {
            Err(PreviewError::msg(format!("no device {index}")))
        }
    }

    #[test]
    fn open_failure_degrades_to_synthetic() {
        let shared = SharedViewConfig::new(view(100, 50, false, false));
        let mut source = FrameSource::open(shared, &MissingBackend, 0, 30);
        assert!(!source.is_live());
        assert_eq!(source.next_frame().size(), (100, 50));
    }
}
