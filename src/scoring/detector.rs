use std::sync::Arc;

use anyhow::Result;
use image::RgbImage;

use crate::{
    models::{Detection, DetectorFindings, SignalKind},
    normalize::ImagePair,
};

use super::{ScoreOutcome, SignalReading, SignalScorer};

/// An object/segmentation detector treated as a black box.
pub trait DetectionModel: Send + Sync {
    fn name(&self) -> &str;
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>>;
}

/// Runs the installed model on both frames and reports every finding. The
/// confidence floors belong to the live threshold state, not the scorer. With
/// no model installed the signal is unavailable.
pub struct DetectorScorer {
    model: Option<Arc<dyn DetectionModel>>,
}

impl DetectorScorer {
    pub fn new(model: Option<Arc<dyn DetectionModel>>) -> Self {
        Self { model }
    }
}

/// First finding whose confidence is not a finite value in [0, 1].
fn invalid_confidence(detections: &[Detection]) -> Option<f64> {
    detections
        .iter()
        .map(|d| d.confidence)
        .find(|c| !c.is_finite() || !(0.0..=1.0).contains(c))
}

impl SignalScorer for DetectorScorer {
    fn kind(&self) -> SignalKind {
        SignalKind::Detector
    }

    fn score(&self, pair: &ImagePair) -> ScoreOutcome {
        let Some(model) = &self.model else {
            return ScoreOutcome::unavailable("no detection model installed");
        };

        let before = match model.detect(&pair.before) {
            Ok(found) => found,
            Err(err) => {
                return ScoreOutcome::unavailable(format!("{} failed on before image: {err:#}", model.name()))
            }
        };
        let after = match model.detect(&pair.after) {
            Ok(found) => found,
            Err(err) => {
                return ScoreOutcome::unavailable(format!("{} failed on after image: {err:#}", model.name()))
            }
        };

        if let Some(bad) = invalid_confidence(&before).or_else(|| invalid_confidence(&after)) {
            return ScoreOutcome::unavailable(format!(
                "{} returned confidence {bad} outside [0, 1]",
                model.name()
            ));
        }

        ScoreOutcome::Available(SignalReading::Detections(DetectorFindings { before, after }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundingBox;
    use anyhow::bail;
    use image::Rgb;

    struct Fixed(Vec<f64>);

    impl DetectionModel for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn detect(&self, _image: &RgbImage) -> Result<Vec<Detection>> {
            Ok(self
                .0
                .iter()
                .map(|c| Detection {
                    class: "dent".into(),
                    confidence: *c,
                    bbox: BoundingBox {
                        x1: 0.0,
                        y1: 0.0,
                        x2: 4.0,
                        y2: 4.0,
                    },
                })
                .collect())
        }
    }

    struct Broken;

    impl DetectionModel for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn detect(&self, _image: &RgbImage) -> Result<Vec<Detection>> {
            bail!("weights missing")
        }
    }

    fn pair() -> ImagePair {
        let img = RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]));
        ImagePair::new(img.clone(), img).unwrap()
    }

    #[test]
    fn findings_pass_through_unfiltered() {
        let scorer = DetectorScorer::new(Some(Arc::new(Fixed(vec![0.3, 0.5, 0.7]))));
        match scorer.score(&pair()) {
            ScoreOutcome::Available(SignalReading::Detections(found)) => {
                let after: Vec<f64> = found.after.iter().map(|d| d.confidence).collect();
                assert_eq!(after, vec![0.3, 0.5, 0.7]);
                assert_eq!(found.before.len(), 3);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn out_of_range_confidence_is_unavailable() {
        for bad in [1.0000001, -0.01, f64::NAN, f64::INFINITY] {
            let scorer = DetectorScorer::new(Some(Arc::new(Fixed(vec![0.6, bad]))));
            match scorer.score(&pair()) {
                ScoreOutcome::Unavailable { reason } => {
                    assert!(reason.contains("outside [0, 1]"), "{reason}")
                }
                other => panic!("confidence {bad} gave {other:?}"),
            }
        }
    }

    #[test]
    fn missing_model_is_unavailable() {
        let scorer = DetectorScorer::new(None);
        assert!(matches!(scorer.score(&pair()), ScoreOutcome::Unavailable { .. }));
    }

    #[test]
    fn model_errors_are_unavailable() {
        let scorer = DetectorScorer::new(Some(Arc::new(Broken)));
        match scorer.score(&pair()) {
            ScoreOutcome::Unavailable { reason } => assert!(reason.contains("weights missing")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
