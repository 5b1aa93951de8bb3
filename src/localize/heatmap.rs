use std::io::Cursor;

use anyhow::{Context, Result};
use image::{ImageFormat, Rgb, RgbImage};

use crate::models::DamageRegion;

const IMAGE_WEIGHT: f32 = 0.7;
const OVERLAY_WEIGHT: f32 = 0.3;
const OVERLAY_COLOUR: [u8; 3] = [255, 0, 0];

/// Blends `base` with filled red boxes over each region. Pixels outside every
/// box are darkened by the same blend, which keeps the boxes legible.
pub fn render_overlay(base: &RgbImage, regions: &[DamageRegion]) -> RgbImage {
    let (width, height) = base.dimensions();
    let mut inside = vec![false; (width as usize) * (height as usize)];

    for region in regions {
        let x_end = (region.x + region.width).min(width);
        let y_end = (region.y + region.height).min(height);
        for y in region.y..y_end {
            for x in region.x..x_end {
                inside[(y * width + x) as usize] = true;
            }
        }
    }

    RgbImage::from_fn(width, height, |x, y| {
        let src = base.get_pixel(x, y).0;
        let overlay = if inside[(y * width + x) as usize] {
            OVERLAY_COLOUR
        } else {
            [0, 0, 0]
        };
        let mut out = [0u8; 3];
        for c in 0..3 {
            let v = IMAGE_WEIGHT * f32::from(src[c]) + OVERLAY_WEIGHT * f32::from(overlay[c]);
            out[c] = v.round().clamp(0.0, 255.0) as u8;
        }
        Rgb(out)
    })
}

pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .context("failed to encode overlay as PNG")?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boxes_are_tinted_red() {
        let base = RgbImage::from_pixel(20, 20, Rgb([100, 100, 100]));
        let region = DamageRegion {
            x: 5,
            y: 5,
            width: 4,
            height: 4,
            area: 16,
            mean_difference: 60.0,
        };

        let out = render_overlay(&base, &[region]);
        assert_eq!(out.get_pixel(6, 6), &Rgb([147, 70, 70]));
        assert_eq!(out.get_pixel(0, 0), &Rgb([70, 70, 70]));

        let png = encode_png(&out).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
}
