//! Configuration system for the churn pipelines.
//!
//! Uses `figment` for layered configuration: defaults -> user config -> workspace
//! `churn.toml` -> explicit file -> `CHURN_` environment variables.

use crate::error::ChurnError;
use crate::storage::StorageLocation;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the workspace-level configuration file.
pub const WORKSPACE_CONFIG_FILE: &str = "churn.toml";

/// Top-level configuration for both pipelines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChurnConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub preprocess: PreprocessConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub alarms: AlarmsConfig,
}

/// Which object store implementation backs bucket access.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Local,
    Memory,
}

/// Object storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Directory holding one sub-directory per bucket (local backend only).
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            root: default_storage_root(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from(".churn/buckets")
}

/// Where the preprocessing pipeline reads its raw records from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    /// The built-in five reference accounts.
    #[default]
    Synthetic,
    /// Partitioned parquet files under `preprocess.input`.
    ObjectStore,
}

/// Pipeline A configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    #[serde(default)]
    pub source: InputSource,
    #[serde(default = "default_raw_location")]
    pub input: StorageLocation,
    #[serde(default = "default_preprocessed_location")]
    pub output: StorageLocation,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            source: InputSource::Synthetic,
            input: default_raw_location(),
            output: default_preprocessed_location(),
        }
    }
}

fn default_raw_location() -> StorageLocation {
    StorageLocation::new("churn-data", "raw/accounts")
}

fn default_preprocessed_location() -> StorageLocation {
    StorageLocation::new("churn-data", "preprocessed/accounts")
}

/// Pipeline B configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_preprocessed_location")]
    pub dataset: StorageLocation,
    /// Fraction of rows held out for evaluation.
    #[serde(default = "default_test_size")]
    pub test_size: f64,
    /// Seed for the train/test split and stochastic models.
    #[serde(default = "default_random_state")]
    pub random_state: u64,
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,
    /// Upper bound on model fits running at the same time.
    #[serde(default = "default_max_parallel_fits")]
    pub max_parallel_fits: usize,
    /// Classifier families to train, in report order.
    #[serde(default = "default_families")]
    pub families: Vec<String>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            dataset: default_preprocessed_location(),
            test_size: default_test_size(),
            random_state: default_random_state(),
            cv_folds: default_cv_folds(),
            max_parallel_fits: default_max_parallel_fits(),
            families: default_families(),
        }
    }
}

fn default_test_size() -> f64 {
    0.2
}

fn default_random_state() -> u64 {
    42
}

fn default_cv_folds() -> usize {
    5
}

fn default_max_parallel_fits() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_families() -> Vec<String> {
    [
        "naive_bayes",
        "neural_network",
        "logistic_regression",
        "svm",
        "decision_tree",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Reporter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_roc_curve_path")]
    pub roc_curve_path: PathBuf,
    /// Write the ROC figure to `roc_curve_path`.
    #[serde(default = "default_true")]
    pub show_plot: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            roc_curve_path: default_roc_curve_path(),
            show_plot: true,
        }
    }
}

fn default_roc_curve_path() -> PathBuf {
    PathBuf::from("roc_curves.svg")
}

fn default_true() -> bool {
    true
}

/// Churn event notifier configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_events_bucket")]
    pub bucket: String,
    #[serde(default = "default_results_key")]
    pub results_key: String,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            bucket: default_events_bucket(),
            results_key: default_results_key(),
            webhook_url: None,
        }
    }
}

fn default_events_bucket() -> String {
    "churn-data".to_string()
}

fn default_results_key() -> String {
    "inference/results.json".to_string()
}

/// Operational alarm notifier configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmsConfig {
    /// Slack incoming webhook.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Shown in the footer of every message.
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for AlarmsConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            environment: default_environment(),
        }
    }
}

fn default_environment() -> String {
    "dev".to_string()
}

impl ChurnConfig {
    /// Reject values no pipeline can run with.
    pub fn validate(&self) -> Result<(), ChurnError> {
        for (name, location) in [
            ("preprocess.input", &self.preprocess.input),
            ("preprocess.output", &self.preprocess.output),
            ("training.dataset", &self.training.dataset),
        ] {
            if location.bucket.trim().is_empty() {
                return Err(ChurnError::config(format!("{name}.bucket must not be empty")));
            }
        }
        if !(self.training.test_size > 0.0 && self.training.test_size < 1.0) {
            return Err(ChurnError::config(format!(
                "training.test_size must be in (0, 1), got {}",
                self.training.test_size
            )));
        }
        if self.training.cv_folds < 2 {
            return Err(ChurnError::config(format!(
                "training.cv_folds must be at least 2, got {}",
                self.training.cv_folds
            )));
        }
        if self.training.max_parallel_fits == 0 {
            return Err(ChurnError::config("training.max_parallel_fits must be positive"));
        }
        if self.training.families.is_empty() {
            return Err(ChurnError::config("training.families must name at least one family"));
        }
        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ChurnError> {
        toml::to_string_pretty(self).map_err(|e| ChurnError::config(e.to_string()))
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `CHURN_`, `__` separates sections)
/// 2. Explicit config file (`--config`)
/// 3. Workspace-local config (`churn.toml`)
/// 4. User config (`~/.config/churn/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<ChurnConfig, ChurnError> {
    let mut figment = Figment::from(Serialized::defaults(ChurnConfig::default()));

    if let Some(dirs) = directories::ProjectDirs::from("dev", "churn", "churn") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(WORKSPACE_CONFIG_FILE);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ChurnError::config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        figment = figment.merge(Toml::file(path));
    }

    // CHURN_TRAINING__TEST_SIZE, CHURN_STORAGE__ROOT, etc.
    figment = figment.merge(Env::prefixed("CHURN_").split("__"));

    let config: ChurnConfig = figment
        .extract()
        .map_err(|e| ChurnError::config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}
