//! Translation-only registration of the after frame onto the before frame.
//!
//! FAST corners are detected in both frames, each before-corner is matched to
//! the after-corner with the most similar surrounding patch inside the search
//! radius, and the displacement most matches agree on (within one pixel) wins.

use std::collections::HashMap;

use image::{GrayImage, RgbImage};
use imageproc::corners::{corners_fast9, Corner};

use crate::config::NormalizerConfig;

const PATCH_RADIUS: i64 = 3;
/// Mean absolute patch difference above which a pairing is not a match.
const MAX_MEAN_PATCH_DIFF: f64 = 18.0;
/// Best match must be this much better than the runner-up.
const RATIO_TEST: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translation {
    pub dx: i64,
    pub dy: i64,
    pub matches: usize,
}

pub fn estimate_translation(
    before: &GrayImage,
    after: &GrayImage,
    config: &NormalizerConfig,
) -> Option<Translation> {
    let before_corners = strongest_corners(before, config);
    let after_corners = strongest_corners(after, config);
    if before_corners.len() < config.min_keypoint_matches
        || after_corners.len() < config.min_keypoint_matches
    {
        return None;
    }

    let radius = i64::from(config.search_radius);
    let displacements: Vec<(i64, i64)> = before_corners
        .iter()
        .filter_map(|corner| best_match(before, corner, after, &after_corners, radius))
        .collect();

    if displacements.len() < config.min_keypoint_matches {
        return None;
    }

    let (dx, dy, support) = consensus(&displacements);
    if support < config.min_keypoint_matches {
        return None;
    }

    Some(Translation {
        dx,
        dy,
        matches: support,
    })
}

/// Samples `after` at `(x + dx, y + dy)`; pixels shifted in from outside the
/// frame are taken from `before` so borders do not register as change.
pub fn shift_into_frame(before: &RgbImage, after: &RgbImage, t: Translation) -> RgbImage {
    let (width, height) = after.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let sx = i64::from(x) + t.dx;
        let sy = i64::from(y) + t.dy;
        if sx >= 0 && sy >= 0 && sx < i64::from(width) && sy < i64::from(height) {
            *after.get_pixel(sx as u32, sy as u32)
        } else {
            *before.get_pixel(x, y)
        }
    })
}

fn strongest_corners(img: &GrayImage, config: &NormalizerConfig) -> Vec<Corner> {
    let (width, height) = img.dimensions();
    let mut corners: Vec<Corner> = corners_fast9(img, config.corner_threshold)
        .into_iter()
        .filter(|c| {
            let (x, y) = (i64::from(c.x), i64::from(c.y));
            x >= PATCH_RADIUS
                && y >= PATCH_RADIUS
                && x + PATCH_RADIUS < i64::from(width)
                && y + PATCH_RADIUS < i64::from(height)
        })
        .collect();

    corners.sort_by(|a, b| b.score.total_cmp(&a.score));
    corners.truncate(config.max_keypoints);
    corners
}

fn best_match(
    before: &GrayImage,
    corner: &Corner,
    after: &GrayImage,
    candidates: &[Corner],
    radius: i64,
) -> Option<(i64, i64)> {
    let mut best: Option<(u64, &Corner)> = None;
    let mut runner_up = u64::MAX;

    for candidate in candidates {
        let dx = i64::from(candidate.x) - i64::from(corner.x);
        let dy = i64::from(candidate.y) - i64::from(corner.y);
        if dx.abs() > radius || dy.abs() > radius {
            continue;
        }

        let cost = patch_sad(before, corner, after, candidate);
        match best {
            Some((best_cost, _)) if cost >= best_cost => runner_up = runner_up.min(cost),
            Some((best_cost, _)) => {
                runner_up = best_cost;
                best = Some((cost, candidate));
            }
            None => best = Some((cost, candidate)),
        }
    }

    let (cost, matched) = best?;
    let patch_pixels = ((2 * PATCH_RADIUS + 1) * (2 * PATCH_RADIUS + 1)) as f64;
    if cost as f64 / patch_pixels > MAX_MEAN_PATCH_DIFF {
        return None;
    }
    // Ties, including two perfect matches, are ambiguous.
    if runner_up != u64::MAX && cost as f64 >= RATIO_TEST * runner_up as f64 {
        return None;
    }

    Some((
        i64::from(matched.x) - i64::from(corner.x),
        i64::from(matched.y) - i64::from(corner.y),
    ))
}

fn patch_sad(before: &GrayImage, a: &Corner, after: &GrayImage, b: &Corner) -> u64 {
    let mut total = 0u64;
    for oy in -PATCH_RADIUS..=PATCH_RADIUS {
        for ox in -PATCH_RADIUS..=PATCH_RADIUS {
            let pa = before.get_pixel((i64::from(a.x) + ox) as u32, (i64::from(a.y) + oy) as u32);
            let pb = after.get_pixel((i64::from(b.x) + ox) as u32, (i64::from(b.y) + oy) as u32);
            total += u64::from(pa.0[0].abs_diff(pb.0[0]));
        }
    }
    total
}

/// Picks the displacement with the most supporting matches within one pixel,
/// then the most exact matches, then the smallest displacement.
fn consensus(displacements: &[(i64, i64)]) -> (i64, i64, usize) {
    let mut counts: HashMap<(i64, i64), usize> = HashMap::new();
    for d in displacements {
        *counts.entry(*d).or_default() += 1;
    }

    let mut candidates: Vec<(i64, i64)> = counts.keys().copied().collect();
    candidates.sort_by_key(|(dx, dy)| (dx.abs() + dy.abs(), *dx, *dy));

    let mut best = (0, 0, 0, 0);
    for (cx, cy) in candidates {
        let support: usize = counts
            .iter()
            .filter(|((dx, dy), _)| (dx - cx).abs() <= 1 && (dy - cy).abs() <= 1)
            .map(|(_, n)| *n)
            .sum();
        let exact = counts.get(&(cx, cy)).copied().unwrap_or(0);
        if (support, exact) > (best.2, best.3) {
            best = (cx, cy, support, exact);
        }
    }
    (best.0, best.1, best.2)
}
