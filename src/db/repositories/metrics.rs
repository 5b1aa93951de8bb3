use anyhow::{Context, Result};
use rusqlite::{params, Row};

use crate::{
    db::{
        connection::Database,
        helpers::{format_datetime, parse_datetime, to_i64, to_u64},
    },
    models::{EvaluationMetrics, ModelMetrics},
};

fn row_to_metrics(row: &Row) -> Result<ModelMetrics> {
    let evaluated_at: String = row.get("evaluated_at")?;
    Ok(ModelMetrics {
        id: row.get("id")?,
        model_version: row.get("model_version")?,
        metrics: EvaluationMetrics {
            accuracy: row.get("accuracy")?,
            precision: row.get("precision_score")?,
            recall: row.get("recall")?,
            f1_score: row.get("f1_score")?,
            map_score: row.get("map_score")?,
        },
        sample_size: to_u64(row.get("sample_size")?, "sample_size")?,
        evaluated_at: parse_datetime(&evaluated_at, "evaluated_at")?,
    })
}

impl Database {
    pub async fn insert_model_metrics(&self, entry: &ModelMetrics) -> Result<()> {
        let entry = entry.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO model_metrics (id, model_version, accuracy, precision_score, recall,
                    f1_score, map_score, sample_size, evaluated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    entry.id,
                    entry.model_version,
                    entry.metrics.accuracy,
                    entry.metrics.precision,
                    entry.metrics.recall,
                    entry.metrics.f1_score,
                    entry.metrics.map_score,
                    to_i64(entry.sample_size)?,
                    format_datetime(&entry.evaluated_at),
                ],
            )
            .context("failed to insert model metrics")?;
            Ok(())
        })
        .await
    }

    /// Most recent evaluations for a model version, newest first.
    pub async fn list_model_metrics(
        &self,
        model_version: &str,
        limit: usize,
    ) -> Result<Vec<ModelMetrics>> {
        let model_version = model_version.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, model_version, accuracy, precision_score, recall, f1_score, map_score,
                        sample_size, evaluated_at
                 FROM model_metrics
                 WHERE model_version = ?1
                 ORDER BY evaluated_at DESC
                 LIMIT ?2",
            )?;
            let mut rows = stmt.query(params![model_version, to_i64(limit as u64)?])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(row_to_metrics(row)?);
            }
            Ok(entries)
        })
        .await
    }

    pub async fn latest_model_metrics(&self, model_version: &str) -> Result<Option<ModelMetrics>> {
        Ok(self
            .list_model_metrics(model_version, 1)
            .await?
            .into_iter()
            .next())
    }
}
