//! Independent damage signals over a normalized image pair.
//!
//! Every scorer implements [`SignalScorer`]. A scorer that cannot produce a
//! value (missing model, failure, undersized frame) reports
//! [`ScoreOutcome::Unavailable`] instead of erroring, and the decision engine
//! drops that signal's weight.

pub mod detector;
pub mod perceptual;
pub mod structural;

use std::{sync::Arc, time::Duration};

use tokio::time::Instant;

use crate::{
    config::ScorerConfig,
    models::{DetectorFindings, SignalKind, SignalScores, UnavailableSignal},
    normalize::ImagePair,
};

pub use detector::{DetectionModel, DetectorScorer};
pub use perceptual::PerceptualScorer;
pub use structural::StructuralScorer;

const ENABLE_LOGS: bool = true;

use crate::log_warn;

#[derive(Debug, Clone, PartialEq)]
pub enum SignalReading {
    /// 1 = identical.
    Similarity(f64),
    /// 0 = identical.
    Distance(f64),
    Detections(DetectorFindings),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutcome {
    Available(SignalReading),
    Unavailable { reason: String },
}

impl ScoreOutcome {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        ScoreOutcome::Unavailable {
            reason: reason.into(),
        }
    }
}

pub trait SignalScorer: Send + Sync {
    fn kind(&self) -> SignalKind;
    fn score(&self, pair: &ImagePair) -> ScoreOutcome;
}

/// The installed scorers, run concurrently on blocking threads under a shared
/// deadline.
#[derive(Clone)]
pub struct ScorerSet {
    scorers: Vec<Arc<dyn SignalScorer>>,
    timeout: Duration,
}

impl ScorerSet {
    pub fn new(timeout: Duration) -> Self {
        Self {
            scorers: Vec::new(),
            timeout,
        }
    }

    /// Structural, perceptual and detector scorers with the given model.
    pub fn standard(config: &ScorerConfig, model: Option<Arc<dyn DetectionModel>>) -> Self {
        Self::new(Duration::from_millis(config.timeout_ms))
            .with_scorer(Arc::new(StructuralScorer))
            .with_scorer(Arc::new(PerceptualScorer::new(config.perceptual_hash_size)))
            .with_scorer(Arc::new(DetectorScorer::new(model)))
    }

    /// Installs a scorer, replacing any existing scorer of the same kind.
    pub fn with_scorer(mut self, scorer: Arc<dyn SignalScorer>) -> Self {
        let kind = scorer.kind();
        self.scorers.retain(|s| s.kind() != kind);
        self.scorers.push(scorer);
        self
    }

    pub async fn score_all(&self, pair: Arc<ImagePair>) -> SignalScores {
        let deadline = Instant::now() + self.timeout;

        let handles: Vec<_> = self
            .scorers
            .iter()
            .map(|scorer| {
                let scorer = Arc::clone(scorer);
                let pair = Arc::clone(&pair);
                let kind = scorer.kind();
                (kind, tokio::task::spawn_blocking(move || scorer.score(&pair)))
            })
            .collect();

        let mut scores = SignalScores::default();
        for (kind, handle) in handles {
            let outcome = match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(join_err)) => ScoreOutcome::unavailable(format!("scorer task failed: {join_err}")),
                Err(_) => ScoreOutcome::unavailable(format!(
                    "timed out after {}ms",
                    self.timeout.as_millis()
                )),
            };
            record(&mut scores, kind, outcome);
        }

        for kind in SignalKind::ALL {
            if !self.scorers.iter().any(|s| s.kind() == kind) {
                record(&mut scores, kind, ScoreOutcome::unavailable("no scorer installed"));
            }
        }

        scores
    }
}

fn record(scores: &mut SignalScores, kind: SignalKind, outcome: ScoreOutcome) {
    let reading = match outcome {
        ScoreOutcome::Available(reading) => reading,
        ScoreOutcome::Unavailable { reason } => {
            log_warn!("{} signal unavailable: {reason}", kind.as_str());
            scores.unavailable.push(UnavailableSignal { kind, reason });
            return;
        }
    };

    match (kind, reading) {
        (SignalKind::Structural, SignalReading::Similarity(value)) => scores.structural = Some(value),
        (SignalKind::Perceptual, SignalReading::Distance(value)) => scores.perceptual = Some(value),
        (SignalKind::Detector, SignalReading::Detections(found)) => scores.detections = Some(found),
        (kind, other) => {
            let reason = format!("scorer returned an unexpected reading {other:?}");
            log_warn!("{} signal unavailable: {reason}", kind.as_str());
            scores.unavailable.push(UnavailableSignal { kind, reason });
        }
    }
}
