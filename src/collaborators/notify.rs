use serde::Serialize;
use tokio::sync::mpsc;

use crate::models::{Severity, TrainingJobStatus};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    ReviewRequired {
        detection_id: String,
        review_item_id: String,
        uncertainty: f64,
    },
    DamageDetected {
        detection_id: String,
        severity: Severity,
        estimated_repair_cost: f64,
    },
    TrainingFinished {
        job_id: String,
        status: TrainingJobStatus,
    },
    PerformanceRegression {
        model_version: String,
        accuracy: f64,
        baseline: f64,
    },
}

/// Out-of-band notification sink. Fire and forget: nothing is returned and
/// delivery failures never reach the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        match serde_json::to_string(&notification) {
            Ok(json) => log_info!("notification {json}"),
            Err(err) => log_warn!("failed to serialize notification {notification:?}: {err}"),
        }
    }
}

/// Forwards notifications into an unbounded channel for an external consumer.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            log_warn!("notification receiver dropped");
        }
    }
}
