//! Direct V4L2 capture through the `v4l` crate.

use image::{imageops, imageops::FilterType, RgbImage};
use v4l::{
    buffer::Type,
    io::{mmap::Stream, traits::CaptureStream},
    video::{capture::Parameters, Capture},
    Device, FourCC,
};

use super::{CaptureBackend, CaptureDevice, CaptureRequest};
use crate::{Frame, PreviewError, Result};

const RGB3: [u8; 4] = *b"RGB3";
const YUYV: [u8; 4] = *b"YUYV";
const BUFFER_COUNT: u32 = 4;

/// Opens `/dev/videoN` with memory-mapped streaming. Asks the driver for
/// packed RGB and accepts YUYV when that is all it offers.
#[derive(Debug, Clone, Copy, Default)]
pub struct V4lCapture;

impl CaptureBackend for V4lCapture {
    fn open(&self, index: u32, request: &CaptureRequest) -> Result<Box<dyn CaptureDevice>> {
        let device = Device::new(index as usize)?;

        let mut format = device.format()?;
        format.width = request.width;
        format.height = request.height;
        format.fourcc = FourCC::new(&RGB3);
        let format = device.set_format(&format)?;
        let layout = match format.fourcc.repr {
            RGB3 => PixelLayout::Rgb24,
            YUYV => PixelLayout::Yuyv,
            other => {
                return Err(PreviewError::msg(format!(
                    "/dev/video{index} only offers {}",
                    String::from_utf8_lossy(&other)
                )))
            }
        };
        if let Err(err) = device.set_params(&Parameters::with_fps(request.fps)) {
            tracing::debug!(index, error = %err, "driver kept its own frame rate");
        }

        let stream = Stream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)?;
        tracing::info!(
            index,
            width = format.width,
            height = format.height,
            fourcc = %format.fourcc,
            "capture device opened"
        );
        Ok(Box::new(V4lDevice {
            _device: device,
            stream,
            layout,
            width: format.width,
            height: format.height,
            stride: format.stride,
            target: (request.width, request.height),
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelLayout {
    Rgb24,
    Yuyv,
}

struct V4lDevice {
    _device: Device,
    stream: Stream<'static>,
    layout: PixelLayout,
    width: u32,
    height: u32,
    stride: u32,
    target: (u32, u32),
}

impl CaptureDevice for V4lDevice {
    fn read(&mut self) -> Option<Frame> {
        let (data, meta) = match self.stream.next() {
            Ok(buffer) => buffer,
            Err(err) => {
                tracing::debug!(error = %err, "capture dequeue failed");
                return None;
            }
        };
        let used = (meta.bytesused as usize).min(data.len());
        let image = decode(&data[..used], self.layout, self.width, self.height, self.stride)?;
        let image = if image.dimensions() == self.target {
            image
        } else {
            imageops::resize(&image, self.target.0, self.target.1, FilterType::Triangle)
        };
        Some(Frame::from_image(image))
    }
}

/// Unpacks one driver buffer. Returns `None` for truncated buffers.
fn decode(
    data: &[u8],
    layout: PixelLayout,
    width: u32,
    height: u32,
    stride: u32,
) -> Option<RgbImage> {
    let bytes_per_pixel = match layout {
        PixelLayout::Rgb24 => 3,
        PixelLayout::Yuyv => 2,
    };
    let row_bytes = width as usize * bytes_per_pixel;
    let stride = (stride as usize).max(row_bytes);
    if height == 0 || data.len() < stride * (height as usize - 1) + row_bytes {
        return None;
    }

    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for row in data.chunks(stride).take(height as usize) {
        let row = &row[..row_bytes];
        match layout {
            PixelLayout::Rgb24 => rgb.extend_from_slice(row),
            PixelLayout::Yuyv => {
                for pair in row.chunks_exact(4) {
                    let (y0, u, y1, v) = (pair[0], pair[1], pair[2], pair[3]);
                    rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
                    rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
                }
            }
        }
    }
    RgbImage::from_raw(width, height, rgb)
}

/// BT.601 limited-range conversion in 8-bit fixed point.
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = (i32::from(y) - 16).max(0) * 298;
    let d = i32::from(u) - 128;
    let e = i32::from(v) - 128;
    let clamp = |value: i32| ((value + 128) >> 8).clamp(0, 255) as u8;
    [
        clamp(c + 409 * e),
        clamp(c - 100 * d - 208 * e),
        clamp(c + 516 * d),
    ]
}
