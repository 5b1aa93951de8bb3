use image::GrayImage;

use crate::models::{DamageRegion, DamageType, RegionAssessment, Severity};

/// Classifies a region from the mean and spread of the difference image inside
/// its bounding box.
pub fn classify_region(region: &DamageRegion, difference: &GrayImage) -> RegionAssessment {
    let (mean, std) = box_statistics(region, difference);

    let damage_type = if mean > 50.0 && std > 30.0 {
        DamageType::Scratch
    } else if mean > 30.0 && std < 20.0 {
        DamageType::Dent
    } else if mean > 80.0 {
        DamageType::PaintDamage
    } else {
        DamageType::Unknown
    };

    RegionAssessment {
        region: *region,
        damage_type,
        confidence: (mean / 100.0).min(0.95),
    }
}

fn box_statistics(region: &DamageRegion, difference: &GrayImage) -> (f64, f64) {
    let x_end = (region.x + region.width).min(difference.width());
    let y_end = (region.y + region.height).min(difference.height());

    let mut n = 0u64;
    let mut sum = 0f64;
    let mut sum_sq = 0f64;
    for y in region.y..y_end {
        for x in region.x..x_end {
            let v = f64::from(difference.get_pixel(x, y).0[0]);
            sum += v;
            sum_sq += v * v;
            n += 1;
        }
    }

    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / n as f64;
    let variance = (sum_sq / n as f64 - mean * mean).max(0.0);
    (mean, variance.sqrt())
}

/// Base cost by severity, plus 50 per region and 0.1 per changed pixel, rounded
/// to the nearest 10 (halves to even).
pub fn estimate_repair_cost(regions: &[DamageRegion], severity: Severity) -> f64 {
    let base = match severity {
        Severity::None => 0.0,
        Severity::Low => 100.0,
        Severity::Medium => 300.0,
        Severity::High => 600.0,
    };
    let per_region = 50.0 * regions.len() as f64;
    let size = 0.1 * regions.iter().map(|r| f64::from(r.area)).sum::<f64>();

    ((base + per_region + size) / 10.0).round_ties_even() * 10.0
}
