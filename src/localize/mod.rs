pub mod classify;
pub mod heatmap;

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::{
    config::LocalizerConfig,
    models::DamageRegion,
    normalize::{lighting::luma, ImagePair},
};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

pub use classify::{classify_region, estimate_repair_cost};
pub use heatmap::render_overlay;

/// Localizer output for one normalized pair.
#[derive(Debug, Clone)]
pub struct Localization {
    /// Kept regions ordered by the scan position of their first pixel.
    pub regions: Vec<DamageRegion>,
    pub damage_ratio: f64,
    /// Per-pixel absolute luminance difference.
    pub difference: GrayImage,
}

impl Localization {
    fn empty(width: u32, height: u32) -> Self {
        Self {
            regions: Vec::new(),
            damage_ratio: 0.0,
            difference: GrayImage::new(width, height),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Localizer {
    config: LocalizerConfig,
}

#[derive(Clone, Copy)]
struct Accumulator {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    count: u32,
    diff_sum: u64,
    /// Scan index of the first pixel seen, used for ordering.
    first: u64,
}

impl Accumulator {
    fn new(x: u32, y: u32, width: u32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            count: 0,
            diff_sum: 0,
            first: u64::from(y) * u64::from(width) + u64::from(x),
        }
    }

    fn add(&mut self, x: u32, y: u32, diff: u8) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.count += 1;
        self.diff_sum += u64::from(diff);
    }

    fn into_region(self) -> DamageRegion {
        DamageRegion {
            x: self.min_x,
            y: self.min_y,
            width: self.max_x - self.min_x + 1,
            height: self.max_y - self.min_y + 1,
            area: self.count,
            mean_difference: self.diff_sum as f64 / f64::from(self.count.max(1)),
        }
    }
}

impl Localizer {
    pub fn new(config: LocalizerConfig) -> Self {
        Self { config }
    }

    pub fn localize(&self, pair: &ImagePair) -> Localization {
        let (width, height) = pair.before.dimensions();
        if !pair.same_dimensions() {
            log_warn!(
                "localizer received mismatched frames {:?} vs {:?}, reporting no regions",
                pair.before.dimensions(),
                pair.after.dimensions()
            );
            return Localization::empty(width, height);
        }

        let difference = luminance_difference(pair);
        let mask = change_mask(&difference, self.config.diff_threshold);
        let labels = connected_components(&mask, Connectivity::Eight, Luma([0u8]));

        let mut components: Vec<Option<Accumulator>> = Vec::new();
        for (x, y, label) in labels.enumerate_pixels() {
            let label = label.0[0] as usize;
            if label == 0 {
                continue;
            }
            if components.len() <= label {
                components.resize(label + 1, None);
            }
            let diff = difference.get_pixel(x, y).0[0];
            components[label]
                .get_or_insert_with(|| Accumulator::new(x, y, width))
                .add(x, y, diff);
        }

        let mut kept: Vec<Accumulator> = components
            .into_iter()
            .flatten()
            .filter(|acc| acc.count >= self.config.min_region_area)
            .collect();
        kept.sort_by_key(|acc| acc.first);
        let regions: Vec<DamageRegion> = kept.into_iter().map(Accumulator::into_region).collect();

        let kept_area: u64 = regions.iter().map(|r| u64::from(r.area)).sum();
        let total = f64::from(width) * f64::from(height);
        let damage_ratio = if total > 0.0 {
            kept_area as f64 / total
        } else {
            0.0
        };

        Localization {
            regions,
            damage_ratio,
            difference,
        }
    }
}

pub fn luminance_difference(pair: &ImagePair) -> GrayImage {
    let (width, height) = pair.before.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let a = luma(pair.before.get_pixel(x, y));
        let b = luma(pair.after.get_pixel(x, y));
        Luma([a.abs_diff(b)])
    })
}

fn change_mask(difference: &GrayImage, threshold: u8) -> GrayImage {
    GrayImage::from_fn(difference.width(), difference.height(), |x, y| {
        if difference.get_pixel(x, y).0[0] > threshold {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}
