//! Raster primitives used to build synthetic preview panels.

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{GrayImage, Luma, Rgb, RgbImage};
use once_cell::sync::Lazy;

/// Edge length of one unscaled glyph.
pub const GLYPH_SIZE: u32 = 8;

static TURBO: Lazy<[Rgb<u8>; 256]> = Lazy::new(|| {
    let mut table = [Rgb([0, 0, 0]); 256];
    for (index, entry) in table.iter_mut().enumerate() {
        *entry = turbo_color(index as f64 / 255.0);
    }
    table
});

/// Polynomial fit of the Turbo colormap per channel, lowest order first.
const TURBO_COEFFICIENTS: [[f64; 6]; 3] = [
    [0.135_721_38, 4.615_392_6, -42.660_322_58, 132.131_082_34, -152.942_393_96, 59.286_379_43],
    [0.091_402_61, 2.194_188_39, 4.842_966_58, -14.185_033_33, 4.277_298_57, 2.829_566_04],
    [0.106_673_3, 12.641_946_08, -60.582_048_36, 110.362_767_71, -89.903_109_12, 27.348_249_73],
];

fn turbo_color(x: f64) -> Rgb<u8> {
    let channel = |coefficients: &[f64; 6]| {
        let v = coefficients.iter().rev().fold(0.0, |acc, k| acc * x + k);
        (v.clamp(0.0, 1.0) * 255.0).round() as u8
    };
    let [r, g, b] = &TURBO_COEFFICIENTS;
    Rgb([channel(r), channel(g), channel(b)])
}

/// Fills every pixel whose centre lies within `radius` of `(cx, cy)`.
pub fn fill_circle(image: &mut RgbImage, cx: i32, cy: i32, radius: i32, color: Rgb<u8>) {
    let (width, height) = (image.width() as i32, image.height() as i32);
    let r2 = i64::from(radius) * i64::from(radius);
    for y in (cy - radius).max(0)..=(cy + radius).min(height - 1) {
        let dy = i64::from(y - cy);
        for x in (cx - radius).max(0)..=(cx + radius).min(width - 1) {
            let dx = i64::from(x - cx);
            if dx * dx + dy * dy <= r2 {
                image.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

/// Draws `text` with the 8x8 bitmap font, each glyph pixel blown up to a
/// `scale` x `scale` block. `baseline` is the bottom edge of the glyph cells.
/// Anything outside the image is clipped; unknown characters are skipped.
pub fn draw_text(
    image: &mut RgbImage,
    text: &str,
    x: i32,
    baseline: i32,
    scale: u32,
    color: Rgb<u8>,
) {
    let scale = scale.max(1) as i32;
    let cell = GLYPH_SIZE as i32 * scale;
    let top = baseline - cell;
    let (width, height) = (image.width() as i32, image.height() as i32);

    for (index, ch) in text.chars().enumerate() {
        let origin_x = x + index as i32 * cell;
        if origin_x >= width {
            break;
        }
        let Some(glyph) = BASIC_FONTS.get(ch) else {
            continue;
        };
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_SIZE as i32 {
                if (*bits >> col) & 1 == 0 {
                    continue;
                }
                for sy in 0..scale {
                    let py = top + row as i32 * scale + sy;
                    if py < 0 || py >= height {
                        continue;
                    }
                    for sx in 0..scale {
                        let px = origin_x + col * scale + sx;
                        if px >= 0 && px < width {
                            image.put_pixel(px as u32, py as u32, color);
                        }
                    }
                }
            }
        }
    }
}

/// Circular shift along the horizontal axis: `out[y][x] = in[y][(x - shift) mod w]`.
pub fn roll_horizontal(image: &RgbImage, shift: i64) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut out = RgbImage::new(width, height);
    if width == 0 {
        return out;
    }
    let shift = shift.rem_euclid(i64::from(width)) as u32;
    for y in 0..height {
        for x in 0..width {
            let src = (x + width - shift) % width;
            out.put_pixel(x, y, *image.get_pixel(src, y));
        }
    }
    out
}

/// Per-channel absolute difference of two equally sized images.
pub fn abs_diff(a: &RgbImage, b: &RgbImage) -> RgbImage {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    let data = a
        .as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(x, y)| x.abs_diff(*y))
        .collect();
    RgbImage::from_raw(a.width(), a.height(), data)
        .unwrap_or_else(|| RgbImage::new(a.width(), a.height()))
}

/// Rec. 601 luma in 14-bit fixed point.
pub fn luminance(image: &RgbImage) -> GrayImage {
    let mut out = GrayImage::new(image.width(), image.height());
    for (x, y, Rgb([r, g, b])) in image.enumerate_pixels() {
        let weighted = u32::from(*r) * 4899 + u32::from(*g) * 9617 + u32::from(*b) * 1868;
        let value = (weighted + 8192) >> 14;
        out.put_pixel(x, y, Luma([value as u8]));
    }
    out
}

/// Maps intensities through the Turbo color table.
pub fn apply_turbo(gray: &GrayImage) -> RgbImage {
    let mut out = RgbImage::new(gray.width(), gray.height());
    for (x, y, Luma([value])) in gray.enumerate_pixels() {
        out.put_pixel(x, y, TURBO[*value as usize]);
    }
    out
}

/// Concatenates panels left to right. Panels must share a height.
pub fn hstack(panels: &[&RgbImage]) -> RgbImage {
    let height = panels.first().map(|p| p.height()).unwrap_or(0);
    let width = panels.iter().map(|p| p.width()).sum();
    let mut out = RgbImage::new(width, height);
    let mut offset = 0;
    for panel in panels {
        debug_assert_eq!(panel.height(), height);
        for (x, y, pixel) in panel.enumerate_pixels() {
            out.put_pixel(offset + x, y, *pixel);
        }
        offset += panel.width();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

    #[test]
    fn circle_is_clipped_to_the_image() {
        let mut image = RgbImage::new(10, 10);
        fill_circle(&mut image, 0, 0, 3, WHITE);

        assert_eq!(*image.get_pixel(0, 0), WHITE);
        assert_eq!(*image.get_pixel(3, 0), WHITE);
        assert_eq!(*image.get_pixel(3, 3), Rgb([0, 0, 0]));
    }

    #[test]
    fn roll_wraps_around() {
        let mut image = RgbImage::new(4, 1);
        image.put_pixel(3, 0, WHITE);
        let rolled = roll_horizontal(&image, 2);
        assert_eq!(*rolled.get_pixel(1, 0), WHITE);

        let back = roll_horizontal(&rolled, -2);
        assert_eq!(back, image);
    }

    #[test]
    fn text_stays_inside_the_image() {
        let mut image = RgbImage::new(12, 12);
        draw_text(&mut image, "88", -4, 14, 2, WHITE);
        assert!(image.pixels().any(|p| *p == WHITE));

        let mut untouched = RgbImage::new(12, 12);
        draw_text(&mut untouched, "8", 40, 10, 1, WHITE);
        assert!(untouched.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn luminance_uses_rec601_weights() {
        let image = RgbImage::from_raw(2, 1, vec![255, 255, 255, 255, 0, 0]).unwrap();
        let gray = luminance(&image);
        assert_eq!(gray.get_pixel(0, 0).0, [255]);
        assert_eq!(gray.get_pixel(1, 0).0, [76]);
    }

    #[test]
    fn turbo_runs_blue_to_red() {
        let low = TURBO[25].0;
        let high = TURBO[255].0;
        assert!(low[2] > low[0]);
        assert!(high[0] > high[2]);
    }

    #[test]
    fn hstack_places_panels_side_by_side() {
        let left = RgbImage::from_pixel(2, 2, WHITE);
        let right = RgbImage::new(3, 2);
        let stacked = hstack(&[&left, &right]);

        assert_eq!(stacked.dimensions(), (5, 2));
        assert_eq!(*stacked.get_pixel(1, 1), WHITE);
        assert_eq!(*stacked.get_pixel(2, 1), Rgb([0, 0, 0]));
    }
}
