use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row, TransactionBehavior};

use crate::{
    db::{
        connection::Database,
        helpers::{
            bool_to_int, format_datetime, parse_datetime, parse_optional_datetime,
            parse_review_status, to_i64, to_json,
        },
    },
    models::{
        DetectionStatus, EnsembleVerdict, FeedbackKind, HumanLabel, LabelInput, ReviewItem,
        ReviewStatus,
    },
};

use super::detections::query_detection;

const REVIEW_COLUMNS: &str =
    "id, detection_id, uncertainty_score, status, created_at, updated_at, resolved_at";

/// Outcome of the label transaction. The rejections are expected, caller
/// correctable conditions rather than storage failures.
#[derive(Debug, Clone)]
pub enum LabelWrite {
    Stored {
        label: HumanLabel,
        verdict: EnsembleVerdict,
    },
    UnknownDetection,
    NoReviewItem,
    AlreadyResolved,
}

fn row_to_review_item(row: &Row) -> Result<ReviewItem> {
    let status: String = row.get("status")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let resolved_at: Option<String> = row.get("resolved_at")?;

    Ok(ReviewItem {
        id: row.get("id")?,
        detection_id: row.get("detection_id")?,
        uncertainty_score: row.get("uncertainty_score")?,
        status: parse_review_status(&status)?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
        resolved_at: parse_optional_datetime(resolved_at, "resolved_at")?,
    })
}

fn query_review_for_detection(conn: &Connection, detection_id: &str) -> Result<Option<ReviewItem>> {
    let sql = format!("SELECT {REVIEW_COLUMNS} FROM review_items WHERE detection_id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![detection_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_review_item(row)?)),
        None => Ok(None),
    }
}

fn collect_items(conn: &Connection, sql: &str, args: impl rusqlite::Params) -> Result<Vec<ReviewItem>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(args)?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(row_to_review_item(row)?);
    }
    Ok(items)
}

/// Shared with the detection insert so both rows can commit together.
pub(crate) fn insert_review_row(conn: &Connection, item: &ReviewItem) -> Result<()> {
    conn.execute(
        "INSERT INTO review_items (id, detection_id, uncertainty_score, status, created_at, updated_at, resolved_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            item.id,
            item.detection_id,
            item.uncertainty_score,
            item.status.as_str(),
            format_datetime(&item.created_at),
            format_datetime(&item.updated_at),
            item.resolved_at.as_ref().map(format_datetime),
        ],
    )
    .context("failed to insert review item")?;
    Ok(())
}

impl Database {
    pub async fn insert_review_item(&self, item: &ReviewItem) -> Result<()> {
        let item = item.clone();
        self.execute(move |conn| insert_review_row(conn, &item)).await
    }

    pub async fn get_review_item_for_detection(
        &self,
        detection_id: &str,
    ) -> Result<Option<ReviewItem>> {
        let detection_id = detection_id.to_string();
        self.execute(move |conn| query_review_for_detection(conn, &detection_id))
            .await
    }

    /// Unresolved items, most uncertain first.
    pub async fn list_open_review_items(&self, limit: usize) -> Result<Vec<ReviewItem>> {
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {REVIEW_COLUMNS} FROM review_items
                 WHERE status IN ('pending', 'in_review')
                 ORDER BY uncertainty_score DESC, created_at ASC
                 LIMIT ?1"
            );
            collect_items(conn, &sql, params![to_i64(limit as u64)?])
        })
        .await
    }

    /// Moves the `limit` most uncertain pending items at or above
    /// `min_uncertainty` to `in_review`, returning them in rank order.
    pub async fn promote_pending_review_items(
        &self,
        min_uncertainty: f64,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReviewItem>> {
        self.execute(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let sql = format!(
                "SELECT {REVIEW_COLUMNS} FROM review_items
                 WHERE status = 'pending' AND uncertainty_score >= ?1
                 ORDER BY uncertainty_score DESC, created_at ASC
                 LIMIT ?2"
            );
            let mut items = collect_items(&tx, &sql, params![min_uncertainty, to_i64(limit as u64)?])?;

            let stamp = format_datetime(&now);
            for item in &mut items {
                tx.execute(
                    "UPDATE review_items SET status = ?1, updated_at = ?2 WHERE id = ?3",
                    params![ReviewStatus::InReview.as_str(), stamp, item.id],
                )?;
                item.status = ReviewStatus::InReview;
                item.updated_at = now;
            }

            tx.commit().context("failed to commit review promotion")?;
            Ok(items)
        })
        .await
    }

    /// Stores a reviewer label and resolves everything it touches in one
    /// transaction: the label row, the review item and the detection.
    pub async fn record_label(
        &self,
        label_id: String,
        detection_id: String,
        input: LabelInput,
        now: DateTime<Utc>,
    ) -> Result<LabelWrite> {
        self.execute(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let Some(detection) = query_detection(&tx, &detection_id)? else {
                return Ok(LabelWrite::UnknownDetection);
            };
            let Some(item) = query_review_for_detection(&tx, &detection_id)? else {
                return Ok(LabelWrite::NoReviewItem);
            };
            if item.status == ReviewStatus::Resolved {
                return Ok(LabelWrite::AlreadyResolved);
            }

            let feedback = FeedbackKind::classify(&detection.verdict, &input);
            let label = HumanLabel {
                id: label_id,
                review_item_id: item.id.clone(),
                detection_id: detection_id.clone(),
                is_damage: input.is_damage,
                damage_type: input.damage_type,
                severity: input.severity,
                confidence: input.confidence,
                bounding_boxes: input.bounding_boxes,
                polygons: input.polygons,
                notes: input.notes,
                feedback,
                created_at: now,
            };

            let stamp = format_datetime(&now);
            tx.execute(
                "INSERT INTO human_labels (id, review_item_id, detection_id, is_damage, damage_type,
                    severity, confidence, bounding_boxes, polygons, notes, feedback, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    label.id,
                    label.review_item_id,
                    label.detection_id,
                    bool_to_int(label.is_damage),
                    label.damage_type.map(|t| t.as_str()),
                    label.severity.map(|s| s.as_str()),
                    label.confidence,
                    to_json(&label.bounding_boxes, "bounding_boxes")?,
                    to_json(&label.polygons, "polygons")?,
                    label.notes,
                    label.feedback.as_str(),
                    stamp,
                ],
            )
            .context("failed to insert human label")?;

            tx.execute(
                "UPDATE review_items SET status = ?1, updated_at = ?2, resolved_at = ?2 WHERE id = ?3",
                params![ReviewStatus::Resolved.as_str(), stamp, item.id],
            )
            .context("failed to resolve review item")?;

            tx.execute(
                "UPDATE detections SET needs_review = 0, status = ?1, reviewed_at = ?2 WHERE id = ?3",
                params![DetectionStatus::Reviewed.as_str(), stamp, detection_id],
            )
            .context("failed to mark detection reviewed")?;

            tx.commit().context("failed to commit label")?;

            Ok(LabelWrite::Stored {
                label,
                verdict: detection.verdict,
            })
        })
        .await
    }
}
