use crate::{
    error::EnsembleError,
    models::{Detection, EnsembleVerdict, Severity, SignalKind, SignalScores},
};

use super::{
    config::ThresholdState,
    uncertainty::{confidence, disagreement, needs_review, uncertainty},
};

/// Localizer evidence that feeds confidence, not the ensemble score.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LocalEvidence {
    pub damage_ratio: f64,
    pub region_count: usize,
}

/// Per-signal damage contribution in [0,1]; `None` for unavailable signals.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Contributions {
    pub structural: Option<f64>,
    pub perceptual: Option<f64>,
    pub detector: Option<f64>,
}

impl Contributions {
    fn iter(&self) -> impl Iterator<Item = (SignalKind, f64)> + '_ {
        [
            (SignalKind::Structural, self.structural),
            (SignalKind::Perceptual, self.perceptual),
            (SignalKind::Detector, self.detector),
        ]
        .into_iter()
        .filter_map(|(kind, value)| value.map(|v| (kind, v)))
    }
}

pub fn contributions(
    scores: &SignalScores,
    state: &ThresholdState,
) -> Result<Contributions, EnsembleError> {
    let structural = scores
        .structural
        .map(|s| check_unit("structural", s).map(|s| 1.0 - s))
        .transpose()?;

    let perceptual = scores
        .perceptual
        .map(|p| check_distance(p).map(|p| p.min(1.0)))
        .transpose()?;

    let detector = scores
        .detections
        .as_ref()
        .map(|found| detector_contribution(&found.after, state))
        .transpose()?;

    Ok(Contributions {
        structural,
        perceptual,
        detector,
    })
}

/// Zero unless at least two findings clear the low floor (max confidence wins)
/// or a single finding clears the high floor (its confidence). A lone weak
/// finding never counts.
fn detector_contribution(
    detections: &[Detection],
    state: &ThresholdState,
) -> Result<f64, EnsembleError> {
    for d in detections {
        check_unit("detector", d.confidence)?;
    }

    let strong: Vec<f64> = detections
        .iter()
        .map(|d| d.confidence)
        .filter(|c| *c > state.detector_low_floor)
        .collect();

    let contribution = match strong.as_slice() {
        [] => 0.0,
        [single] if *single > state.detector_high_floor => *single,
        [_] => 0.0,
        many => many.iter().copied().fold(0.0, f64::max),
    };
    Ok(contribution)
}

fn check_unit(signal: &'static str, value: f64) -> Result<f64, EnsembleError> {
    if !value.is_finite() {
        return Err(EnsembleError::InvalidSignal {
            signal,
            value,
            reason: "not a finite number",
        });
    }
    if !(0.0..=1.0).contains(&value) {
        return Err(EnsembleError::InvalidSignal {
            signal,
            value,
            reason: "outside [0, 1]",
        });
    }
    Ok(value)
}

fn check_distance(value: f64) -> Result<f64, EnsembleError> {
    if !value.is_finite() {
        return Err(EnsembleError::InvalidSignal {
            signal: "perceptual",
            value,
            reason: "not a finite number",
        });
    }
    if value < 0.0 {
        return Err(EnsembleError::InvalidSignal {
            signal: "perceptual",
            value,
            reason: "negative distance",
        });
    }
    Ok(value)
}

/// Weighted mean over available signals, weights renormalized to sum to 1.
pub fn ensemble_score(c: &Contributions, state: &ThresholdState) -> f64 {
    let weight = |kind: SignalKind| match kind {
        SignalKind::Structural => state.weights.structural,
        SignalKind::Perceptual => state.weights.perceptual,
        SignalKind::Detector => state.weights.detector,
    };

    let (weighted, total) = c
        .iter()
        .fold((0.0, 0.0), |(sum, total), (kind, value)| {
            (sum + weight(kind) * value, total + weight(kind))
        });

    if total > 0.0 {
        weighted / total
    } else {
        0.0
    }
}

pub fn agreement_count(c: &Contributions, state: &ThresholdState) -> u8 {
    let cutoff = |kind: SignalKind| match kind {
        SignalKind::Structural => state.agreement.structural,
        SignalKind::Perceptual => state.agreement.perceptual,
        SignalKind::Detector => state.agreement.detector,
    };
    c.iter().filter(|(kind, value)| *value > cutoff(*kind)).count() as u8
}

/// Severity for a score that already passed the damage gate.
pub fn severity_for(score: f64, state: &ThresholdState) -> Severity {
    if score > state.high_threshold {
        Severity::High
    } else if score > state.damage_threshold * state.medium_multiplier {
        Severity::Medium
    } else if score > state.damage_threshold {
        Severity::Low
    } else {
        Severity::None
    }
}

/// Fuses the signals into a verdict. Pure in `scores`, `evidence` and `state`.
pub fn decide(
    scores: &SignalScores,
    evidence: &LocalEvidence,
    state: &ThresholdState,
) -> Result<EnsembleVerdict, EnsembleError> {
    check_unit("damage_ratio", evidence.damage_ratio)?;
    let c = contributions(scores, state)?;

    let score = ensemble_score(&c, state);
    let agreement = agreement_count(&c, state);

    let passes_gate = score > state.damage_threshold && agreement >= state.required_agreement;
    let (damage_detected, severity) = if passes_gate {
        match severity_for(score, state) {
            Severity::None => (false, Severity::None),
            tier => (true, tier),
        }
    } else {
        (false, Severity::None)
    };

    let signals_used: Vec<SignalKind> = c.iter().map(|(kind, _)| kind).collect();
    let unavailable = SignalKind::ALL.len() - signals_used.len();

    let conf = confidence(
        damage_detected,
        evidence.damage_ratio,
        evidence.region_count,
        unavailable,
    );
    let gap = disagreement(c.structural, c.perceptual);

    Ok(EnsembleVerdict {
        damage_detected,
        severity,
        ensemble_score: score,
        model_agreement_count: agreement,
        uncertainty_score: uncertainty(conf, gap),
        confidence: conf,
        needs_review: needs_review(conf, gap, &state.review),
        signals_used,
        threshold_version: state.version,
    })
}
