use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::{
    db::{
        connection::Database,
        helpers::{
            format_datetime, from_json, parse_damage_type, parse_datetime, parse_feedback,
            parse_severity, to_u64,
        },
    },
    models::HumanLabel,
};

fn row_to_label(row: &Row) -> Result<HumanLabel> {
    let damage_type: Option<String> = row.get("damage_type")?;
    let severity: Option<String> = row.get("severity")?;
    let bounding_boxes: String = row.get("bounding_boxes")?;
    let polygons: String = row.get("polygons")?;
    let feedback: String = row.get("feedback")?;
    let created_at: String = row.get("created_at")?;

    Ok(HumanLabel {
        id: row.get("id")?,
        review_item_id: row.get("review_item_id")?,
        detection_id: row.get("detection_id")?,
        is_damage: row.get::<_, i64>("is_damage")? != 0,
        damage_type: damage_type.as_deref().map(parse_damage_type).transpose()?,
        severity: severity.as_deref().map(parse_severity).transpose()?,
        confidence: row.get("confidence")?,
        bounding_boxes: from_json(&bounding_boxes, "bounding_boxes")?,
        polygons: from_json(&polygons, "polygons")?,
        notes: row.get("notes")?,
        feedback: parse_feedback(&feedback)?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

impl Database {
    pub async fn get_label_for_detection(&self, detection_id: &str) -> Result<Option<HumanLabel>> {
        let detection_id = detection_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, review_item_id, detection_id, is_damage, damage_type, severity,
                        confidence, bounding_boxes, polygons, notes, feedback, created_at
                 FROM human_labels
                 WHERE detection_id = ?1",
            )?;
            let mut rows = stmt.query(params![detection_id])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_label(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    /// Labels created strictly after `since`, or all labels when `since` is `None`.
    pub async fn count_labels_since(&self, since: Option<DateTime<Utc>>) -> Result<u64> {
        self.execute(move |conn| {
            let count: i64 = match since {
                Some(since) => conn.query_row(
                    "SELECT COUNT(*) FROM human_labels WHERE created_at > ?1",
                    params![format_datetime(&since)],
                    |row| row.get(0),
                )?,
                None => conn.query_row("SELECT COUNT(*) FROM human_labels", [], |row| row.get(0))?,
            };
            to_u64(count, "label count")
        })
        .await
    }
}
