use image::{Rgb, RgbImage};

/// A single preview image: 8-bit RGB, row-major, contiguous.
///
/// Frames are produced fresh on every tick and are not modified after they
/// leave the [`FrameSource`](crate::FrameSource).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    pub fn from_image(image: RgbImage) -> Self {
        Self { image }
    }

    /// Wraps a tightly packed RGB buffer. Returns `None` when the buffer
    /// length does not match the dimensions or a dimension is zero.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        RgbImage::from_raw(width, height, data).map(Self::from_image)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// `(width, height)` of the frame.
    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.image.get_pixel(x, y).0
    }

    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Copies the pixels with the channel order swapped, for display
    /// surfaces that expect BGR.
    pub fn to_bgr_bytes(&self) -> Vec<u8> {
        self.image
            .pixels()
            .flat_map(|Rgb([r, g, b])| [*b, *g, *r])
            .collect()
    }
}
