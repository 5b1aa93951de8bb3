use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    pub target_width: u32,
    pub target_height: u32,
    pub equalize_lighting: bool,
    pub align: bool,
    pub min_keypoint_matches: usize,
    /// FAST corner intensity threshold.
    pub corner_threshold: u8,
    pub max_keypoints: usize,
    /// Largest translation (pixels) alignment will search for.
    pub search_radius: u32,
    pub remove_reflections: bool,
    pub reflection_brightness: u8,
    pub reflection_dilation: u8,
    /// Reflection removal is skipped when the mask covers more than this fraction.
    pub max_reflection_coverage: f64,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            target_width: 1024,
            target_height: 768,
            equalize_lighting: true,
            align: true,
            min_keypoint_matches: 10,
            corner_threshold: 20,
            max_keypoints: 400,
            search_radius: 32,
            remove_reflections: true,
            reflection_brightness: 200,
            reflection_dilation: 2,
            max_reflection_coverage: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizerConfig {
    pub diff_threshold: u8,
    pub min_region_area: u32,
}

impl Default for LocalizerConfig {
    fn default() -> Self {
        Self {
            diff_threshold: 30,
            min_region_area: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub timeout_ms: u64,
    pub perceptual_hash_size: u32,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            perceptual_hash_size: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptationConfig {
    pub learning_rate: f64,
    pub min_damage_threshold: f64,
    pub max_damage_threshold: f64,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            min_damage_threshold: 0.1,
            max_damage_threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub nightly_hour_utc: u32,
    pub min_new_labels: usize,
    pub triage_interval_hours: u32,
    pub triage_top_n: usize,
    pub triage_min_uncertainty: f64,
    pub audit_interval_hours: u32,
    pub accuracy_baseline: f64,
    pub retention_hour_utc: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            nightly_hour_utc: 2,
            min_new_labels: 10,
            triage_interval_hours: 4,
            triage_top_n: 20,
            triage_min_uncertainty: 0.6,
            audit_interval_hours: 6,
            accuracy_baseline: 0.85,
            retention_hour_utc: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub detection_days: i64,
    pub training_job_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            detection_days: 90,
            training_job_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub artifact_dir: PathBuf,
    pub model_version: String,
    pub pending_review_limit: usize,
    pub normalizer: NormalizerConfig,
    pub localizer: LocalizerConfig,
    pub scorers: ScorerConfig,
    pub adaptation: AdaptationConfig,
    pub scheduler: SchedulerConfig,
    pub retention: RetentionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("damagelens.db"),
            artifact_dir: PathBuf::from("artifacts"),
            model_version: "ensemble-v1.1".into(),
            pending_review_limit: 50,
            normalizer: NormalizerConfig::default(),
            localizer: LocalizerConfig::default(),
            scorers: ScorerConfig::default(),
            adaptation: AdaptationConfig::default(),
            scheduler: SchedulerConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

/// JSON-backed configuration. A missing file means defaults; a malformed file
/// is an error rather than a silent reset.
pub struct ConfigStore {
    path: PathBuf,
    data: RwLock<AppConfig>,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            read_config(&path)?
        } else {
            AppConfig::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> AppConfig {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update(&self, config: AppConfig) -> Result<()> {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        self.persist(&config)?;
        *guard = config;
        Ok(())
    }

    pub fn reload(&self) -> Result<()> {
        let data = read_config(&self.path)?;
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        *guard = data;
        Ok(())
    }

    fn persist(&self, data: &AppConfig) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write config to {}", self.path.display()))
    }
}

fn read_config(path: &Path) -> Result<AppConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse config at {}", path.display()))
}
