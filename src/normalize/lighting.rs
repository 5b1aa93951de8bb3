use image::{GrayImage, Rgb, RgbImage};
use imageproc::contrast::equalize_histogram;

/// Luminance of an RGB pixel using Rec. 601 weights, rounded to u8.
pub fn luma(pixel: &Rgb<u8>) -> u8 {
    let [r, g, b] = pixel.0;
    let value = 0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b);
    value.round().clamp(0.0, 255.0) as u8
}

pub fn to_luma(img: &RgbImage) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        image::Luma([luma(img.get_pixel(x, y))])
    })
}

/// Histogram-equalizes luminance and rescales each channel by the same gain so
/// hue is preserved. Returns `None` when the frame has a single luminance level.
pub fn equalize(img: &RgbImage) -> Option<RgbImage> {
    let gray = to_luma(img);
    if !has_contrast(&gray) {
        return None;
    }

    let equalized = equalize_histogram(&gray);
    let mut out = RgbImage::new(img.width(), img.height());

    for (x, y, pixel) in img.enumerate_pixels() {
        let original = f32::from(gray.get_pixel(x, y).0[0]);
        let target = f32::from(equalized.get_pixel(x, y).0[0]);

        let adjusted = if original < 1.0 {
            let v = target.round() as u8;
            Rgb([v, v, v])
        } else {
            let gain = target / original;
            let [r, g, b] = pixel.0;
            Rgb([scale(r, gain), scale(g, gain), scale(b, gain)])
        };
        out.put_pixel(x, y, adjusted);
    }

    Some(out)
}

fn scale(channel: u8, gain: f32) -> u8 {
    (f32::from(channel) * gain).round().clamp(0.0, 255.0) as u8
}

fn has_contrast(gray: &GrayImage) -> bool {
    let mut pixels = gray.pixels();
    let Some(first) = pixels.next() else {
        return false;
    };
    pixels.any(|p| p.0[0] != first.0[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_frame_is_left_alone() {
        let img = RgbImage::from_pixel(8, 8, Rgb([90, 90, 90]));
        assert!(equalize(&img).is_none());
    }

    #[test]
    fn equalization_stretches_a_dim_frame() {
        let img = RgbImage::from_fn(16, 16, |x, _| {
            let v = 40 + (x as u8) * 2;
            Rgb([v, v, v])
        });
        let out = equalize(&img).unwrap();
        let max = out.pixels().map(|p| p.0[0]).max().unwrap();
        assert!(max > 200, "brightest pixel only reached {max}");
        assert_eq!(out.dimensions(), img.dimensions());
    }
}
