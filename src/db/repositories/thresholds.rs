use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::params;

use crate::{
    db::{
        connection::Database,
        helpers::{format_datetime, from_json, to_i64, to_json},
    },
    ensemble::ThresholdState,
};

impl Database {
    /// Appends a threshold version. Versions are primary keys, so writing the
    /// same version twice fails.
    pub async fn insert_threshold_state(&self, state: &ThresholdState) -> Result<()> {
        let state = state.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO threshold_states (version, state, created_at) VALUES (?1, ?2, ?3)",
                params![
                    to_i64(state.version)?,
                    to_json(&state, "threshold state")?,
                    format_datetime(&Utc::now()),
                ],
            )
            .with_context(|| format!("failed to persist threshold version {}", state.version))?;
            Ok(())
        })
        .await
    }

    pub async fn latest_threshold_state(&self) -> Result<Option<ThresholdState>> {
        self.execute(|conn| {
            let mut stmt =
                conn.prepare("SELECT state FROM threshold_states ORDER BY version DESC LIMIT 1")?;
            let mut rows = stmt.query([])?;
            match rows.next()? {
                Some(row) => {
                    let raw: String = row.get(0)?;
                    Ok(Some(from_json(&raw, "threshold state")?))
                }
                None => Ok(None),
            }
        })
        .await
    }
}
