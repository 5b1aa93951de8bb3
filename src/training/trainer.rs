use anyhow::{bail, Result};

use crate::models::{EvaluationMetrics, TrainingConfig, TrainingSample};

/// What a finished training run hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOutcome {
    pub metrics: EvaluationMetrics,
    /// Damage threshold the run recommends, if it produced one.
    pub calibrated_threshold: Option<f64>,
}

/// Opaque training routine. Runs on a blocking thread; may take minutes.
pub trait ModelTrainer: Send + Sync {
    fn train(&self, samples: &[TrainingSample], config: &TrainingConfig)
        -> Result<TrainingOutcome>;
}

/// Replays the labeled corpus against the ensemble scores the pipeline
/// recorded and searches for the damage threshold with the best F1.
///
/// Training hyperparameters are accepted for interface parity but unused:
/// there are no weights to fit, only an operating point.
#[derive(Debug, Clone)]
pub struct LabelReplayTrainer {
    min_threshold: f64,
    max_threshold: f64,
    step: f64,
}

impl LabelReplayTrainer {
    pub fn new(min_threshold: f64, max_threshold: f64) -> Self {
        Self {
            min_threshold,
            max_threshold,
            step: 0.01,
        }
    }
}

impl Default for LabelReplayTrainer {
    fn default() -> Self {
        Self::new(0.1, 0.7)
    }
}

impl ModelTrainer for LabelReplayTrainer {
    fn train(
        &self,
        samples: &[TrainingSample],
        _config: &TrainingConfig,
    ) -> Result<TrainingOutcome> {
        if samples.is_empty() {
            bail!("no labeled samples to train on");
        }
        if !(self.step > 0.0) || self.max_threshold < self.min_threshold {
            bail!(
                "invalid threshold search range [{}, {}]",
                self.min_threshold,
                self.max_threshold
            );
        }

        let steps = ((self.max_threshold - self.min_threshold) / self.step).round() as usize;
        let mut best: Option<(f64, EvaluationMetrics)> = None;

        for i in 0..=steps {
            let threshold = self.min_threshold + i as f64 * self.step;
            let metrics = evaluate(samples, |s| s.ensemble_score > threshold);

            let better = match &best {
                None => true,
                Some((_, current)) => {
                    (metrics.f1_score, metrics.accuracy) > (current.f1_score, current.accuracy)
                }
            };
            if better {
                best = Some((threshold, metrics));
            }
        }

        let Some((threshold, metrics)) = best else {
            bail!("threshold search produced no candidates");
        };

        Ok(TrainingOutcome {
            metrics,
            calibrated_threshold: Some(threshold),
        })
    }
}

/// Accuracy, precision, recall and F1 of `predict` against the labels.
/// Precision and recall are 0 when their denominator is empty.
pub fn evaluate<F>(samples: &[TrainingSample], predict: F) -> EvaluationMetrics
where
    F: Fn(&TrainingSample) -> bool,
{
    let (mut tp, mut fp, mut tn, mut fn_) = (0u64, 0u64, 0u64, 0u64);
    for sample in samples {
        match (predict(sample), sample.labeled_damage) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, false) => tn += 1,
            (false, true) => fn_ += 1,
        }
    }

    let ratio = |num: u64, den: u64| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1_score = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    EvaluationMetrics {
        accuracy: ratio(tp + tn, tp + fp + tn + fn_),
        precision,
        recall,
        f1_score,
        map_score: None,
    }
}
