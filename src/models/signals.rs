use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Structural,
    Perceptual,
    Detector,
}

impl SignalKind {
    pub const ALL: [SignalKind; 3] = [
        SignalKind::Structural,
        SignalKind::Perceptual,
        SignalKind::Detector,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Structural => "structural",
            SignalKind::Perceptual => "perceptual",
            SignalKind::Detector => "detector",
        }
    }
}

/// Axis-aligned box in pixel coordinates, corners inclusive of `x1,y1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub class: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

/// Detector output for both frames. Only `after` drives the damage contribution;
/// `before` is kept for audit and overlays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorFindings {
    pub before: Vec<Detection>,
    pub after: Vec<Detection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnavailableSignal {
    pub kind: SignalKind,
    pub reason: String,
}

/// Raw scorer output for one image pair. `None` means the scorer was unavailable;
/// the reason is recorded in `unavailable`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalScores {
    /// Similarity in [0,1], 1 = identical.
    pub structural: Option<f64>,
    /// Distance in [0,inf), 0 = identical.
    pub perceptual: Option<f64>,
    pub detections: Option<DetectorFindings>,
    pub unavailable: Vec<UnavailableSignal>,
}

impl SignalScores {
    pub fn is_available(&self, kind: SignalKind) -> bool {
        match kind {
            SignalKind::Structural => self.structural.is_some(),
            SignalKind::Perceptual => self.perceptual.is_some(),
            SignalKind::Detector => self.detections.is_some(),
        }
    }

    pub fn available_count(&self) -> usize {
        SignalKind::ALL
            .iter()
            .filter(|kind| self.is_available(**kind))
            .count()
    }
}
