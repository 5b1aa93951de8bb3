use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::{
    db::{
        connection::Database,
        helpers::{
            bool_to_int, format_datetime, from_json, parse_datetime, parse_detection_status,
            parse_severity, to_i64, to_json, to_u64,
        },
    },
    models::{DetectionRecord, EnsembleVerdict, ReviewItem, TrainingSample},
};

use super::reviews::insert_review_row;

const DETECTION_COLUMNS: &str = "id, status, damage_detected, severity, ensemble_score,
    model_agreement_count, uncertainty_score, confidence, needs_review, signals_used,
    threshold_version, signal_scores, regions, assessments, damage_ratio,
    estimated_repair_cost, artifacts, model_version, processing_time_ms, created_at";

fn row_to_detection(row: &Row) -> Result<DetectionRecord> {
    let status: String = row.get("status")?;
    let severity: String = row.get("severity")?;
    let signals_used: String = row.get("signals_used")?;
    let signal_scores: String = row.get("signal_scores")?;
    let regions: String = row.get("regions")?;
    let assessments: String = row.get("assessments")?;
    let artifacts: String = row.get("artifacts")?;
    let created_at: String = row.get("created_at")?;
    let agreement: i64 = row.get("model_agreement_count")?;

    Ok(DetectionRecord {
        id: row.get("id")?,
        verdict: EnsembleVerdict {
            damage_detected: row.get::<_, i64>("damage_detected")? != 0,
            severity: parse_severity(&severity)?,
            ensemble_score: row.get("ensemble_score")?,
            model_agreement_count: u8::try_from(agreement)
                .context("model_agreement_count out of range")?,
            uncertainty_score: row.get("uncertainty_score")?,
            confidence: row.get("confidence")?,
            needs_review: row.get::<_, i64>("needs_review")? != 0,
            signals_used: from_json(&signals_used, "signals_used")?,
            threshold_version: to_u64(row.get("threshold_version")?, "threshold_version")?,
        },
        scores: from_json(&signal_scores, "signal_scores")?,
        regions: from_json(&regions, "regions")?,
        assessments: from_json(&assessments, "assessments")?,
        damage_ratio: row.get("damage_ratio")?,
        estimated_repair_cost: row.get("estimated_repair_cost")?,
        artifacts: from_json(&artifacts, "artifacts")?,
        model_version: row.get("model_version")?,
        processing_time_ms: to_u64(row.get("processing_time_ms")?, "processing_time_ms")?,
        status: parse_detection_status(&status)?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

/// Loads one detection on the worker thread. Shared with the label transaction.
pub(crate) fn query_detection(conn: &Connection, id: &str) -> Result<Option<DetectionRecord>> {
    let sql = format!("SELECT {DETECTION_COLUMNS} FROM detections WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_detection(row)?)),
        None => Ok(None),
    }
}

fn insert_detection_row(conn: &Connection, record: &DetectionRecord) -> Result<()> {
    let verdict = &record.verdict;
    conn.execute(
        "INSERT INTO detections (id, status, damage_detected, severity, ensemble_score,
            model_agreement_count, uncertainty_score, confidence, needs_review, signals_used,
            threshold_version, signal_scores, regions, assessments, damage_ratio,
            estimated_repair_cost, artifacts, model_version, processing_time_ms, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
        params![
            record.id,
            record.status.as_str(),
            bool_to_int(verdict.damage_detected),
            verdict.severity.as_str(),
            verdict.ensemble_score,
            i64::from(verdict.model_agreement_count),
            verdict.uncertainty_score,
            verdict.confidence,
            bool_to_int(verdict.needs_review),
            to_json(&verdict.signals_used, "signals_used")?,
            to_i64(verdict.threshold_version)?,
            to_json(&record.scores, "signal_scores")?,
            to_json(&record.regions, "regions")?,
            to_json(&record.assessments, "assessments")?,
            record.damage_ratio,
            record.estimated_repair_cost,
            to_json(&record.artifacts, "artifacts")?,
            record.model_version,
            to_i64(record.processing_time_ms)?,
            format_datetime(&record.created_at),
        ],
    )
    .context("failed to insert detection")?;
    Ok(())
}

impl Database {
    pub async fn insert_detection(&self, record: &DetectionRecord) -> Result<()> {
        let record = record.clone();
        self.execute(move |conn| insert_detection_row(conn, &record))
            .await
    }

    /// Stores a detection together with its review item, if any. Either both
    /// rows land or neither does.
    pub async fn insert_detection_with_review(
        &self,
        record: &DetectionRecord,
        review: Option<&ReviewItem>,
    ) -> Result<()> {
        let record = record.clone();
        let review = review.cloned();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            insert_detection_row(&tx, &record)?;
            if let Some(item) = &review {
                insert_review_row(&tx, item)?;
            }
            tx.commit().context("failed to commit detection")?;
            Ok(())
        })
        .await
    }

    pub async fn get_detection(&self, id: &str) -> Result<Option<DetectionRecord>> {
        let id = id.to_string();
        self.execute(move |conn| query_detection(conn, &id)).await
    }

    pub async fn list_recent_detections(&self, limit: usize) -> Result<Vec<DetectionRecord>> {
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {DETECTION_COLUMNS} FROM detections ORDER BY created_at DESC LIMIT ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![to_i64(limit as u64)?])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_detection(row)?);
            }
            Ok(records)
        })
        .await
    }

    /// Deletes detections created before `cutoff`. Review items and labels go
    /// with them through `ON DELETE CASCADE`.
    pub async fn delete_detections_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.execute(move |conn| {
            let removed = conn
                .execute(
                    "DELETE FROM detections WHERE created_at < ?1",
                    params![format_datetime(&cutoff)],
                )
                .context("failed to delete expired detections")?;
            Ok(removed)
        })
        .await
    }

    /// Reviewed detections paired with their human label, oldest label first.
    pub async fn labeled_corpus(&self) -> Result<Vec<TrainingSample>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT d.id, d.ensemble_score, d.damage_detected, l.is_damage
                 FROM detections d
                 JOIN human_labels l ON l.detection_id = d.id
                 WHERE d.status = 'reviewed'
                 ORDER BY l.created_at ASC",
            )?;
            let mut rows = stmt.query([])?;
            let mut samples = Vec::new();
            while let Some(row) = rows.next()? {
                samples.push(TrainingSample {
                    detection_id: row.get(0)?,
                    ensemble_score: row.get(1)?,
                    predicted_damage: row.get::<_, i64>(2)? != 0,
                    labeled_damage: row.get::<_, i64>(3)? != 0,
                });
            }
            Ok(samples)
        })
        .await
    }

    pub async fn count_detections(&self) -> Result<u64> {
        self.execute(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM detections", [], |row| row.get(0))?;
            to_u64(count, "detection count")
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::*;
    use crate::models::{DetectionStatus, ReviewStatus, Severity, SignalScores};

    fn record(id: &str) -> DetectionRecord {
        DetectionRecord {
            id: id.to_string(),
            verdict: EnsembleVerdict {
                damage_detected: false,
                severity: Severity::None,
                ensemble_score: 0.2,
                model_agreement_count: 0,
                uncertainty_score: 0.5,
                confidence: 0.5,
                needs_review: true,
                signals_used: Vec::new(),
                threshold_version: 1,
            },
            scores: SignalScores::default(),
            regions: Vec::new(),
            assessments: Vec::new(),
            damage_ratio: 0.0,
            estimated_repair_cost: 0.0,
            artifacts: BTreeMap::new(),
            model_version: "test".into(),
            processing_time_ms: 1,
            status: DetectionStatus::PendingReview,
            created_at: Utc::now(),
        }
    }

    fn item(id: &str, detection_id: &str) -> ReviewItem {
        let now = Utc::now();
        ReviewItem {
            id: id.to_string(),
            detection_id: detection_id.to_string(),
            uncertainty_score: 0.5,
            status: ReviewStatus::Pending,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }

    #[tokio::test]
    async fn detection_and_review_item_land_together() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("detections.db")).unwrap();

        db.insert_detection_with_review(&record("a"), Some(&item("r1", "a")))
            .await
            .unwrap();
        assert!(db.get_detection("a").await.unwrap().is_some());
        assert!(db.get_review_item_for_detection("a").await.unwrap().is_some());

        // A clashing review id rolls the detection back with it.
        let err = db
            .insert_detection_with_review(&record("b"), Some(&item("r1", "b")))
            .await;
        assert!(err.is_err());
        assert!(db.get_detection("b").await.unwrap().is_none());
        assert_eq!(db.count_detections().await.unwrap(), 1);
    }
}
