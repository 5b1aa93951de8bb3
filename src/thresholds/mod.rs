//! Versioned operating thresholds with a single writer.
//!
//! Readers take an `Arc` snapshot and keep using it for a whole decision, so a
//! concurrent update never tears a verdict. Writers go through
//! [`AdaptiveThresholdController`], which serializes them, persists the new
//! version and only then publishes it.

use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;
use tokio::sync::Mutex;

use crate::{
    config::AdaptationConfig, db::Database, ensemble::ThresholdState, models::FeedbackKind,
};

const ENABLE_LOGS: bool = true;

use crate::log_info;

#[derive(Debug)]
pub struct ThresholdStore {
    current: RwLock<Arc<ThresholdState>>,
}

impl ThresholdStore {
    pub fn new(state: ThresholdState) -> Self {
        Self {
            current: RwLock::new(Arc::new(state)),
        }
    }

    /// Latest persisted state, or defaults for a fresh database.
    pub async fn load(db: &Database) -> Result<Self> {
        let state = db.latest_threshold_state().await?.unwrap_or_default();
        Ok(Self::new(state))
    }

    pub fn snapshot(&self) -> Arc<ThresholdState> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn publish(&self, state: Arc<ThresholdState>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

pub struct AdaptiveThresholdController {
    store: Arc<ThresholdStore>,
    db: Database,
    config: AdaptationConfig,
    writer: Mutex<()>,
}

impl AdaptiveThresholdController {
    pub fn new(store: Arc<ThresholdStore>, db: Database, config: AdaptationConfig) -> Self {
        Self {
            store,
            db,
            config,
            writer: Mutex::new(()),
        }
    }

    pub fn store(&self) -> Arc<ThresholdStore> {
        Arc::clone(&self.store)
    }

    /// Threshold change for one false positive or false negative.
    pub fn step(&self) -> f64 {
        self.config.learning_rate * 0.1
    }

    /// Raises the damage threshold on a false positive, lowers it on a false
    /// negative. Correct and incorrect labels leave it alone.
    pub async fn apply_feedback(&self, feedback: FeedbackKind) -> Result<Arc<ThresholdState>> {
        let delta = match feedback {
            FeedbackKind::FalsePositive => self.step(),
            FeedbackKind::FalseNegative => -self.step(),
            FeedbackKind::Correct | FeedbackKind::Incorrect => return Ok(self.store.snapshot()),
        };

        self.write(|current| current.damage_threshold + delta).await
    }

    /// Sets the damage threshold directly, e.g. from a training run.
    pub async fn calibrate(&self, damage_threshold: f64) -> Result<Arc<ThresholdState>> {
        self.write(|_| damage_threshold).await
    }

    async fn write<F>(&self, next_threshold: F) -> Result<Arc<ThresholdState>>
    where
        F: FnOnce(&ThresholdState) -> f64,
    {
        let _guard = self.writer.lock().await;
        let current = self.store.snapshot();

        let proposed = next_threshold(&current);
        let clamped = if proposed.is_finite() {
            proposed.clamp(
                self.config.min_damage_threshold,
                self.config.max_damage_threshold,
            )
        } else {
            current.damage_threshold
        };

        if clamped == current.damage_threshold {
            return Ok(current);
        }

        let next = current.with_damage_threshold(clamped);
        self.db.insert_threshold_state(&next).await?;

        log_info!(
            "damage threshold {:.4} -> {:.4} (version {})",
            current.damage_threshold,
            next.damage_threshold,
            next.version
        );

        let next = Arc::new(next);
        self.store.publish(Arc::clone(&next));
        Ok(next)
    }
}
