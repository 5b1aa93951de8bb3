use anyhow::{bail, Result};
use image::{GrayImage, Luma, RgbImage};
use imageproc::{distance_transform::Norm, morphology::dilate};

use crate::config::NormalizerConfig;

/// Pixels whose brightest channel reaches `brightness`, grown by `dilation`.
pub fn specular_mask(img: &RgbImage, brightness: u8, dilation: u8) -> GrayImage {
    let raw = GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let peak = img.get_pixel(x, y).0.into_iter().max().unwrap_or(0);
        if peak >= brightness {
            Luma([255])
        } else {
            Luma([0])
        }
    });

    if dilation == 0 {
        raw
    } else {
        dilate(&raw, Norm::LInf, dilation)
    }
}

/// Replaces specular highlights with colour diffused inward from the mask
/// boundary. Returns `Ok(None)` when there is nothing to remove.
pub fn remove_reflections(img: &RgbImage, config: &NormalizerConfig) -> Result<Option<RgbImage>> {
    let mask = specular_mask(img, config.reflection_brightness, config.reflection_dilation);
    let masked = mask.pixels().filter(|p| p.0[0] > 0).count();
    if masked == 0 {
        return Ok(None);
    }

    let total = (img.width() as usize) * (img.height() as usize);
    let coverage = masked as f64 / total as f64;
    if coverage > config.max_reflection_coverage {
        bail!(
            "reflection mask covers {:.1}% of the frame",
            coverage * 100.0
        );
    }

    Ok(Some(diffuse_fill(img, &mask)))
}

/// Onion-peel fill: each pass sets masked pixels that touch known pixels to the
/// mean of their known 4-neighbours, then marks them known.
fn diffuse_fill(img: &RgbImage, mask: &GrayImage) -> RgbImage {
    let (width, height) = img.dimensions();
    let mut out = img.clone();
    let mut known: Vec<bool> = mask.pixels().map(|p| p.0[0] == 0).collect();
    let idx = |x: u32, y: u32| (y * width + x) as usize;

    loop {
        let mut frontier: Vec<(u32, u32, [u8; 3])> = Vec::new();

        for y in 0..height {
            for x in 0..width {
                if known[idx(x, y)] {
                    continue;
                }

                let mut sum = [0u32; 3];
                let mut n = 0u32;
                for (nx, ny) in neighbours(x, y, width, height) {
                    if known[idx(nx, ny)] {
                        let p = out.get_pixel(nx, ny).0;
                        for c in 0..3 {
                            sum[c] += u32::from(p[c]);
                        }
                        n += 1;
                    }
                }

                if n > 0 {
                    frontier.push((x, y, sum.map(|s| ((s + n / 2) / n) as u8)));
                }
            }
        }

        if frontier.is_empty() {
            break;
        }
        for (x, y, rgb) in frontier {
            out.put_pixel(x, y, image::Rgb(rgb));
            known[idx(x, y)] = true;
        }
    }

    out
}

fn neighbours(x: u32, y: u32, width: u32, height: u32) -> impl Iterator<Item = (u32, u32)> {
    let candidates = [
        (x.checked_sub(1), Some(y)),
        (x.checked_add(1).filter(|v| *v < width), Some(y)),
        (Some(x), y.checked_sub(1)),
        (Some(x), y.checked_add(1).filter(|v| *v < height)),
    ];
    candidates
        .into_iter()
        .filter_map(|(nx, ny)| Some((nx?, ny?)))
}
