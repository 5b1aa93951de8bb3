mod types;

pub use types::{DetectionMetrics, MetricsSnapshot, StageTimings, SystemMetrics};

use std::{collections::VecDeque, sync::Arc};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::Mutex;

const MAX_RECENT_DETECTIONS: usize = 50;

/// Rolling view of recent pipeline runs plus process CPU and memory.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

struct MetricsState {
    recent: VecDeque<DetectionMetrics>,
    detection_count: u64,
    damage_count: u64,
    review_count: u64,
    degraded_count: u64,
    system: System,
    pid: Pid,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        let pid = Pid::from_u32(std::process::id());

        // CPU usage is a delta between refreshes; take the baseline now.
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        Self {
            inner: Arc::new(Mutex::new(MetricsState {
                recent: VecDeque::with_capacity(MAX_RECENT_DETECTIONS),
                detection_count: 0,
                damage_count: 0,
                review_count: 0,
                degraded_count: 0,
                system,
                pid,
            })),
        }
    }

    /// Current process CPU percent and resident memory in MiB.
    pub async fn sample_system_metrics(&self) -> (f32, f64) {
        let mut state = self.inner.lock().await;
        let system = state.refresh();
        (system.cpu_percent, system.memory_mb)
    }

    pub async fn record_detection(&self, metrics: DetectionMetrics) {
        let mut state = self.inner.lock().await;

        state.detection_count += 1;
        if metrics.damage_detected {
            state.damage_count += 1;
        }
        if metrics.needs_review {
            state.review_count += 1;
        }
        if metrics.unavailable_signals > 0 {
            state.degraded_count += 1;
        }

        state.recent.push_back(metrics);
        while state.recent.len() > MAX_RECENT_DETECTIONS {
            state.recent.pop_front();
        }
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let mut state = self.inner.lock().await;
        let system = state.refresh();

        let mean_total_ms = (!state.recent.is_empty()).then(|| {
            state.recent.iter().map(|m| m.total_ms as f64).sum::<f64>() / state.recent.len() as f64
        });

        MetricsSnapshot {
            system,
            recent_detections: state.recent.iter().cloned().collect(),
            detection_count: state.detection_count,
            damage_count: state.damage_count,
            review_count: state.review_count,
            degraded_count: state.degraded_count,
            mean_total_ms,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsState {
    fn refresh(&mut self) -> SystemMetrics {
        let pid = self.pid;
        self.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        match self.system.process(pid) {
            Some(process) => SystemMetrics {
                cpu_percent: process.cpu_usage(),
                memory_mb: process.memory() as f64 / 1024.0 / 1024.0,
            },
            None => SystemMetrics {
                cpu_percent: 0.0,
                memory_mb: 0.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn run(id: usize, total_ms: u64, damage: bool, degraded: bool) -> DetectionMetrics {
        DetectionMetrics {
            timestamp: Utc::now(),
            detection_id: format!("d{id}"),
            stages: StageTimings::default(),
            total_ms,
            unavailable_signals: usize::from(degraded),
            damage_detected: damage,
            needs_review: false,
            cpu_percent: 0.0,
            memory_mb: 0.0,
        }
    }

    #[tokio::test]
    async fn keeps_a_bounded_window_and_running_counts() {
        let collector = MetricsCollector::new();
        for i in 0..60 {
            collector
                .record_detection(run(i, 100, i % 2 == 0, i % 10 == 0))
                .await;
        }

        let snapshot = collector.snapshot().await;
        assert_eq!(snapshot.detection_count, 60);
        assert_eq!(snapshot.damage_count, 30);
        assert_eq!(snapshot.degraded_count, 6);
        assert_eq!(snapshot.recent_detections.len(), MAX_RECENT_DETECTIONS);
        assert_eq!(snapshot.recent_detections[0].detection_id, "d10");
        assert_eq!(snapshot.mean_total_ms, Some(100.0));
    }
}
