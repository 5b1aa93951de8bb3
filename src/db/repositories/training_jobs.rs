use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row, TransactionBehavior};

use crate::{
    db::{
        connection::Database,
        helpers::{
            format_datetime, from_json, parse_datetime, parse_job_status, parse_job_type,
            parse_optional_datetime, to_i64, to_json, to_u64,
        },
    },
    models::{EvaluationMetrics, TrainingJob, TrainingJobStatus},
};

const JOB_COLUMNS: &str = "id, job_type, status, config, training_samples, new_labels,
    final_metrics, error_message, created_at, started_at, completed_at";

/// Result of trying to create a job while honouring the single active job rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobClaim {
    Created,
    Busy { existing_job_id: String },
}

fn row_to_job(row: &Row) -> Result<TrainingJob> {
    let job_type: String = row.get("job_type")?;
    let status: String = row.get("status")?;
    let config: String = row.get("config")?;
    let final_metrics: Option<String> = row.get("final_metrics")?;
    let created_at: String = row.get("created_at")?;

    Ok(TrainingJob {
        id: row.get("id")?,
        job_type: parse_job_type(&job_type)?,
        status: parse_job_status(&status)?,
        config: from_json(&config, "config")?,
        training_samples: to_u64(row.get("training_samples")?, "training_samples")?,
        new_labels: to_u64(row.get("new_labels")?, "new_labels")?,
        final_metrics: final_metrics
            .map(|raw| from_json::<EvaluationMetrics>(&raw, "final_metrics"))
            .transpose()?,
        error_message: row.get("error_message")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        started_at: parse_optional_datetime(row.get("started_at")?, "started_at")?,
        completed_at: parse_optional_datetime(row.get("completed_at")?, "completed_at")?,
    })
}

fn query_active_job(conn: &Connection) -> Result<Option<TrainingJob>> {
    let sql = format!(
        "SELECT {JOB_COLUMNS} FROM training_jobs
         WHERE status IN ('pending', 'running')
         ORDER BY created_at ASC
         LIMIT 1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_job(row)?)),
        None => Ok(None),
    }
}

impl Database {
    /// Inserts `job` unless another job is pending or running. The check and
    /// the insert share one immediate transaction.
    pub async fn create_training_job_if_idle(&self, job: &TrainingJob) -> Result<JobClaim> {
        let job = job.clone();
        self.execute(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if let Some(existing) = query_active_job(&tx)? {
                return Ok(JobClaim::Busy {
                    existing_job_id: existing.id,
                });
            }

            tx.execute(
                "INSERT INTO training_jobs (id, job_type, status, config, training_samples, new_labels,
                    final_metrics, error_message, created_at, started_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, NULL, ?7, NULL, NULL)",
                params![
                    job.id,
                    job.job_type.as_str(),
                    job.status.as_str(),
                    to_json(&job.config, "config")?,
                    to_i64(job.training_samples)?,
                    to_i64(job.new_labels)?,
                    format_datetime(&job.created_at),
                ],
            )
            .context("failed to insert training job")?;

            tx.commit().context("failed to commit training job")?;
            Ok(JobClaim::Created)
        })
        .await
    }

    pub async fn active_training_job(&self) -> Result<Option<TrainingJob>> {
        self.execute(|conn| query_active_job(conn)).await
    }

    pub async fn get_training_job(&self, id: &str) -> Result<Option<TrainingJob>> {
        let id = id.to_string();
        self.execute(move |conn| {
            let sql = format!("SELECT {JOB_COLUMNS} FROM training_jobs WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![id])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_job(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn list_training_jobs(&self, limit: usize) -> Result<Vec<TrainingJob>> {
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {JOB_COLUMNS} FROM training_jobs ORDER BY created_at DESC LIMIT ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![to_i64(limit as u64)?])?;
            let mut jobs = Vec::new();
            while let Some(row) = rows.next()? {
                jobs.push(row_to_job(row)?);
            }
            Ok(jobs)
        })
        .await
    }

    pub async fn mark_training_job_running(&self, id: &str, started_at: DateTime<Utc>) -> Result<()> {
        let id = id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE training_jobs SET status = ?1, started_at = ?2 WHERE id = ?3 AND status = 'pending'",
                params![
                    TrainingJobStatus::Running.as_str(),
                    format_datetime(&started_at),
                    id
                ],
            )
            .context("failed to mark training job running")?;
            Ok(())
        })
        .await
    }

    pub async fn complete_training_job(
        &self,
        id: &str,
        metrics: EvaluationMetrics,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        let id = id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE training_jobs SET status = ?1, final_metrics = ?2, completed_at = ?3 WHERE id = ?4",
                params![
                    TrainingJobStatus::Completed.as_str(),
                    to_json(&metrics, "final_metrics")?,
                    format_datetime(&completed_at),
                    id
                ],
            )
            .context("failed to complete training job")?;
            Ok(())
        })
        .await
    }

    /// Marks the job failed with `error` stored verbatim. Metrics are left empty.
    pub async fn fail_training_job(
        &self,
        id: &str,
        error: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        let id = id.to_string();
        let error = error.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE training_jobs SET status = ?1, error_message = ?2, final_metrics = NULL, completed_at = ?3
                 WHERE id = ?4",
                params![
                    TrainingJobStatus::Failed.as_str(),
                    error,
                    format_datetime(&completed_at),
                    id
                ],
            )
            .context("failed to mark training job failed")?;
            Ok(())
        })
        .await
    }

    pub async fn last_completed_training_at(&self) -> Result<Option<DateTime<Utc>>> {
        self.execute(|conn| {
            let latest: Option<String> = conn.query_row(
                "SELECT MAX(completed_at) FROM training_jobs WHERE status = 'completed'",
                [],
                |row| row.get(0),
            )?;
            parse_optional_datetime(latest, "completed_at")
        })
        .await
    }

    /// Removes completed and failed jobs created before `cutoff`. Active jobs
    /// are never touched.
    pub async fn delete_finished_training_jobs_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.execute(move |conn| {
            let removed = conn
                .execute(
                    "DELETE FROM training_jobs
                     WHERE created_at < ?1 AND status IN ('completed', 'failed')",
                    params![format_datetime(&cutoff)],
                )
                .context("failed to delete expired training jobs")?;
            Ok(removed)
        })
        .await
    }
}
