use image::GrayImage;

use crate::{
    models::SignalKind,
    normalize::{lighting::to_luma, ImagePair},
};

use super::{ScoreOutcome, SignalReading, SignalScorer};

const WINDOW: u32 = 7;
const C1: f64 = (0.01 * 255.0) * (0.01 * 255.0);
const C2: f64 = (0.03 * 255.0) * (0.03 * 255.0);

/// Mean SSIM on luminance over every 7x7 window that fits in the frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralScorer;

impl SignalScorer for StructuralScorer {
    fn kind(&self) -> SignalKind {
        SignalKind::Structural
    }

    fn score(&self, pair: &ImagePair) -> ScoreOutcome {
        if !pair.same_dimensions() {
            return ScoreOutcome::unavailable("frames differ in size");
        }
        let before = to_luma(&pair.before);
        let after = to_luma(&pair.after);

        match mean_ssim(&before, &after) {
            Some(value) => ScoreOutcome::Available(SignalReading::Similarity(value.clamp(0.0, 1.0))),
            None => ScoreOutcome::unavailable("frame smaller than the SSIM window"),
        }
    }
}

/// Summed-area tables for the first and second moments of both frames.
struct Moments {
    width: usize,
    a: Vec<f64>,
    b: Vec<f64>,
    aa: Vec<f64>,
    bb: Vec<f64>,
    ab: Vec<f64>,
}

impl Moments {
    fn build(a: &GrayImage, b: &GrayImage) -> Self {
        let (w, h) = (a.width() as usize, a.height() as usize);
        let stride = w + 1;
        let size = stride * (h + 1);
        let mut m = Self {
            width: stride,
            a: vec![0.0; size],
            b: vec![0.0; size],
            aa: vec![0.0; size],
            bb: vec![0.0; size],
            ab: vec![0.0; size],
        };

        for y in 0..h {
            for x in 0..w {
                let va = f64::from(a.get_pixel(x as u32, y as u32).0[0]);
                let vb = f64::from(b.get_pixel(x as u32, y as u32).0[0]);
                let i = (y + 1) * stride + (x + 1);
                let up = y * stride + (x + 1);
                let left = (y + 1) * stride + x;
                let diag = y * stride + x;
                for (table, v) in [
                    (&mut m.a, va),
                    (&mut m.b, vb),
                    (&mut m.aa, va * va),
                    (&mut m.bb, vb * vb),
                    (&mut m.ab, va * vb),
                ] {
                    table[i] = v + table[up] + table[left] - table[diag];
                }
            }
        }
        m
    }

    fn window_sum(&self, table: &[f64], x: usize, y: usize, size: usize) -> f64 {
        let s = self.width;
        table[(y + size) * s + (x + size)] - table[y * s + (x + size)] - table[(y + size) * s + x]
            + table[y * s + x]
    }
}

pub fn mean_ssim(before: &GrayImage, after: &GrayImage) -> Option<f64> {
    let (w, h) = before.dimensions();
    if w < WINDOW || h < WINDOW || before.dimensions() != after.dimensions() {
        return None;
    }

    let moments = Moments::build(before, after);
    let n = f64::from(WINDOW * WINDOW);
    let size = WINDOW as usize;
    // Sample covariance over the window.
    let cov_norm = n / (n - 1.0);

    let mut total = 0.0;
    let mut windows = 0u64;
    for y in 0..=(h - WINDOW) as usize {
        for x in 0..=(w - WINDOW) as usize {
            let mu_a = moments.window_sum(&moments.a, x, y, size) / n;
            let mu_b = moments.window_sum(&moments.b, x, y, size) / n;
            let var_a = cov_norm * (moments.window_sum(&moments.aa, x, y, size) / n - mu_a * mu_a);
            let var_b = cov_norm * (moments.window_sum(&moments.bb, x, y, size) / n - mu_b * mu_b);
            let cov = cov_norm * (moments.window_sum(&moments.ab, x, y, size) / n - mu_a * mu_b);

            let numerator = (2.0 * mu_a * mu_b + C1) * (2.0 * cov + C2);
            let denominator = (mu_a * mu_a + mu_b * mu_b + C1) * (var_a + var_b + C2);
            total += numerator / denominator;
            windows += 1;
        }
    }

    Some(total / windows as f64)
}
