use super::config::ReviewPolicy;

const CONFIDENCE_CEILING: f64 = 0.95;
const CONFIDENCE_FLOOR: f64 = 0.05;
const UNAVAILABLE_PENALTY: f64 = 0.1;

/// Confidence in the verdict from localizer evidence: large or numerous changed
/// regions make a damage call more certain and a no-damage call less certain.
/// Each missing signal costs a further 0.1.
pub fn confidence(
    damage_detected: bool,
    damage_ratio: f64,
    region_count: usize,
    unavailable_signals: usize,
) -> f64 {
    let evidence = 2.0 * damage_ratio + 0.1 * region_count as f64;
    let base = if damage_detected {
        (0.5 + evidence).min(CONFIDENCE_CEILING)
    } else {
        (CONFIDENCE_CEILING - evidence).clamp(CONFIDENCE_FLOOR, CONFIDENCE_CEILING)
    };

    (base - UNAVAILABLE_PENALTY * unavailable_signals as f64).max(CONFIDENCE_FLOOR)
}

/// Gap between the structural and perceptual contributions, when both exist.
pub fn disagreement(structural: Option<f64>, perceptual: Option<f64>) -> Option<f64> {
    Some((structural? - perceptual?).abs())
}

pub fn uncertainty(confidence: f64, disagreement: Option<f64>) -> f64 {
    (1.0 - confidence)
        .max(disagreement.unwrap_or(0.0))
        .clamp(0.0, 1.0)
}

pub fn needs_review(confidence: f64, disagreement: Option<f64>, policy: &ReviewPolicy) -> bool {
    let low = confidence < policy.low_confidence;
    let in_band = confidence >= policy.band_low && confidence <= policy.band_high;
    let conflicted = disagreement.is_some_and(|gap| gap > policy.disagreement);
    low || in_band || conflicted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn damage_confidence_grows_with_evidence() {
        assert_eq!(confidence(true, 0.0, 0, 0), 0.5);
        assert!((confidence(true, 0.05, 2, 0) - 0.8).abs() < 1e-12);
        assert_eq!(confidence(true, 0.5, 10, 0), 0.95);
    }

    #[test]
    fn clean_pair_is_confidently_undamaged() {
        assert_eq!(confidence(false, 0.0, 0, 0), 0.95);
        assert_eq!(confidence(false, 0.6, 5, 0), 0.05);
    }

    #[test]
    fn missing_signals_cost_confidence() {
        assert!((confidence(false, 0.0, 0, 1) - 0.85).abs() < 1e-12);
        assert!((confidence(true, 0.0, 0, 3) - 0.2).abs() < 1e-12);
        assert_eq!(confidence(false, 0.6, 5, 2), 0.05);
    }

    #[test]
    fn any_review_condition_is_sufficient() {
        let policy = ReviewPolicy::default();
        assert!(needs_review(0.55, None, &policy));
        assert!(needs_review(0.65, None, &policy));
        assert!(needs_review(0.9, Some(0.35), &policy));
        assert!(!needs_review(0.9, Some(0.1), &policy));
        assert!(!needs_review(0.75, None, &policy));
    }

    #[test]
    fn uncertainty_takes_the_larger_signal() {
        assert!((uncertainty(0.9, Some(0.4)) - 0.4).abs() < 1e-12);
        assert!((uncertainty(0.3, Some(0.1)) - 0.7).abs() < 1e-12);
        assert!((uncertainty(0.95, None) - 0.05).abs() < 1e-12);
    }
}
