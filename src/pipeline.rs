//! One before/after comparison, end to end.

use std::{collections::BTreeMap, sync::Arc, time::Instant};

use anyhow::Context;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    collaborators::{ArtifactStore, Notification, Notifier},
    db::Database,
    ensemble::{decide, LocalEvidence},
    error::DetectError,
    localize::{classify_region, estimate_repair_cost, heatmap::encode_png, render_overlay, Localizer},
    metrics::{DetectionMetrics, MetricsCollector, StageTimings},
    models::{DamageRegion, DetectionRecord, DetectionStatus, RegionAssessment},
    normalize::{ImagePair, Normalizer},
    review::{pending_item, ReviewRouter},
    scoring::ScorerSet,
    thresholds::ThresholdStore,
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub const OVERLAY_ARTIFACT: &str = "overlay";

pub struct DamagePipeline {
    normalizer: Arc<Normalizer>,
    localizer: Arc<Localizer>,
    scorers: ScorerSet,
    thresholds: Arc<ThresholdStore>,
    db: Database,
    artifacts: Arc<dyn ArtifactStore>,
    review: Arc<ReviewRouter>,
    notifier: Arc<dyn Notifier>,
    metrics: MetricsCollector,
    model_version: String,
}

impl DamagePipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        normalizer: Normalizer,
        localizer: Localizer,
        scorers: ScorerSet,
        thresholds: Arc<ThresholdStore>,
        db: Database,
        artifacts: Arc<dyn ArtifactStore>,
        review: Arc<ReviewRouter>,
        notifier: Arc<dyn Notifier>,
        metrics: MetricsCollector,
        model_version: String,
    ) -> Self {
        Self {
            normalizer: Arc::new(normalizer),
            localizer: Arc::new(localizer),
            scorers,
            thresholds,
            db,
            artifacts,
            review,
            notifier,
            metrics,
            model_version,
        }
    }

    /// Decodes, normalizes, localizes, scores and decides one pair, then
    /// persists the record and routes it to review when the verdict is
    /// uncertain. Image work runs on blocking threads.
    pub async fn detect(&self, before: &[u8], after: &[u8]) -> Result<DetectionRecord, DetectError> {
        let started = Instant::now();
        let mut stages = StageTimings::default();
        let id = Uuid::new_v4().to_string();

        let stage = Instant::now();
        let normalizer = Arc::clone(&self.normalizer);
        let (before, after) = (before.to_vec(), after.to_vec());
        let pair = tokio::task::spawn_blocking(move || {
            ImagePair::from_bytes(&before, &after).map(|pair| normalizer.normalize(pair))
        })
        .await
        .context("normalizer task failed")??;
        let pair = Arc::new(pair);
        stages.normalize_ms = elapsed_ms(stage);

        let stage = Instant::now();
        let localizer = Arc::clone(&self.localizer);
        let for_localizer = Arc::clone(&pair);
        let localization = tokio::task::spawn_blocking(move || localizer.localize(&for_localizer))
            .await
            .context("localizer task failed")?;
        stages.localize_ms = elapsed_ms(stage);

        let stage = Instant::now();
        let scores = self.scorers.score_all(Arc::clone(&pair)).await;
        stages.scoring_ms = elapsed_ms(stage);

        let stage = Instant::now();
        let thresholds = self.thresholds.snapshot();
        let evidence = LocalEvidence {
            damage_ratio: localization.damage_ratio,
            region_count: localization.regions.len(),
        };
        let verdict = decide(&scores, &evidence, &thresholds)?;

        let assessments: Vec<RegionAssessment> = localization
            .regions
            .iter()
            .map(|region| classify_region(region, &localization.difference))
            .collect();
        let estimated_repair_cost = if verdict.damage_detected {
            estimate_repair_cost(&localization.regions, verdict.severity)
        } else {
            0.0
        };
        stages.decision_ms = elapsed_ms(stage);

        let stage = Instant::now();
        let mut artifacts = BTreeMap::new();
        if !localization.regions.is_empty() {
            match self.store_overlay(&id, &pair, &localization.regions).await {
                Ok(locator) => {
                    artifacts.insert(OVERLAY_ARTIFACT.to_string(), locator);
                }
                Err(err) => log_warn!("overlay for detection {id} not stored: {err:#}"),
            }
        }
        stages.artifacts_ms = elapsed_ms(stage);

        let record = DetectionRecord {
            id,
            status: if verdict.needs_review {
                DetectionStatus::PendingReview
            } else {
                DetectionStatus::Completed
            },
            verdict,
            scores,
            regions: localization.regions,
            assessments,
            damage_ratio: localization.damage_ratio,
            estimated_repair_cost,
            artifacts,
            model_version: self.model_version.clone(),
            processing_time_ms: elapsed_ms(started),
            created_at: Utc::now(),
        };

        let stage = Instant::now();
        let review_item = record
            .verdict
            .needs_review
            .then(|| pending_item(&record.id, record.verdict.uncertainty_score));
        self.db
            .insert_detection_with_review(&record, review_item.as_ref())
            .await?;
        stages.persist_ms = elapsed_ms(stage);

        if let Some(item) = &review_item {
            self.review.announce(item);
        }

        if record.verdict.damage_detected {
            self.notifier.notify(Notification::DamageDetected {
                detection_id: record.id.clone(),
                severity: record.verdict.severity,
                estimated_repair_cost: record.estimated_repair_cost,
            });
        }

        log_info!(
            "detection {}: damage={} severity={} score={:.3} agreement={} review={} ({}ms)",
            record.id,
            record.verdict.damage_detected,
            record.verdict.severity.as_str(),
            record.verdict.ensemble_score,
            record.verdict.model_agreement_count,
            record.verdict.needs_review,
            record.processing_time_ms
        );
        log_debug!("detection {} stage timings {stages:?}", record.id);

        let (cpu_percent, memory_mb) = self.metrics.sample_system_metrics().await;
        self.metrics
            .record_detection(DetectionMetrics {
                timestamp: record.created_at,
                detection_id: record.id.clone(),
                stages,
                total_ms: elapsed_ms(started),
                unavailable_signals: record.scores.unavailable.len(),
                damage_detected: record.verdict.damage_detected,
                needs_review: record.verdict.needs_review,
                cpu_percent,
                memory_mb,
            })
            .await;

        Ok(record)
    }

    async fn store_overlay(
        &self,
        id: &str,
        pair: &Arc<ImagePair>,
        regions: &[DamageRegion],
    ) -> anyhow::Result<String> {
        let pair = Arc::clone(pair);
        let regions = regions.to_vec();
        let artifacts = Arc::clone(&self.artifacts);
        let key = format!("{id}/{OVERLAY_ARTIFACT}.png");

        tokio::task::spawn_blocking(move || {
            let png = encode_png(&render_overlay(&pair.after, &regions))?;
            artifacts.put(&key, &png)
        })
        .await
        .context("overlay task failed")?
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}
