use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalWeights {
    pub structural: f64,
    pub perceptual: f64,
    pub detector: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            structural: 0.3,
            perceptual: 0.4,
            detector: 0.3,
        }
    }
}

/// Per-signal contribution a signal must exceed to count toward agreement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgreementThresholds {
    pub structural: f64,
    pub perceptual: f64,
    pub detector: f64,
}

impl Default for AgreementThresholds {
    fn default() -> Self {
        Self {
            structural: 0.3,
            perceptual: 0.2,
            detector: 0.5,
        }
    }
}

/// When a verdict goes to a human.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewPolicy {
    pub low_confidence: f64,
    pub band_low: f64,
    pub band_high: f64,
    /// Structural vs perceptual contribution gap that counts as conflict.
    pub disagreement: f64,
}

impl Default for ReviewPolicy {
    fn default() -> Self {
        Self {
            low_confidence: 0.6,
            band_low: 0.4,
            band_high: 0.7,
            disagreement: 0.3,
        }
    }
}

/// Live operating parameters of the decision engine. Versioned; a new version
/// replaces the old one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdState {
    pub version: u64,
    pub weights: SignalWeights,
    pub damage_threshold: f64,
    pub high_threshold: f64,
    /// Medium severity starts at `damage_threshold * medium_multiplier`.
    pub medium_multiplier: f64,
    pub agreement: AgreementThresholds,
    pub required_agreement: u8,
    pub detector_low_floor: f64,
    pub detector_high_floor: f64,
    pub review: ReviewPolicy,
}

impl Default for ThresholdState {
    fn default() -> Self {
        Self {
            version: 1,
            weights: SignalWeights::default(),
            damage_threshold: 0.4,
            high_threshold: 0.75,
            medium_multiplier: 1.3,
            agreement: AgreementThresholds::default(),
            required_agreement: 2,
            detector_low_floor: 0.5,
            detector_high_floor: 0.8,
            review: ReviewPolicy::default(),
        }
    }
}

impl ThresholdState {
    /// Next version with a different damage threshold.
    pub fn with_damage_threshold(&self, damage_threshold: f64) -> Self {
        Self {
            version: self.version + 1,
            damage_threshold,
            ..self.clone()
        }
    }
}
