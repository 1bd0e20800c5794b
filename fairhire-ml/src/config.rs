//! Configuration for fairness evaluation and mitigation.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/fairhire/config.toml` and/or `.fairhire/config.toml`
//! in the workspace directory.

use crate::error::FairnessError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FairnessConfig {
    /// Bias verdict configuration.
    #[serde(default)]
    pub decision: DecisionConfig,
    /// Adversarial debiasing configuration.
    #[serde(default)]
    pub debias: DebiasConfig,
    /// Dataset handling configuration.
    #[serde(default)]
    pub data: DataConfig,
    /// Persisted artifact configuration.
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
}

/// Bias verdict configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Absolute mean difference above which bias is reported.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Age strictly above this value marks the `age_above_40` group.
    #[serde(default = "default_age_threshold")]
    pub age_threshold: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            age_threshold: default_age_threshold(),
        }
    }
}

fn default_threshold() -> f64 {
    0.8
}

fn default_age_threshold() -> f64 {
    40.0
}

/// Adversarial debiasing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebiasConfig {
    /// Trade-off coefficient between accuracy and fairness.
    #[serde(default = "default_adversary_loss_weight")]
    pub adversary_loss_weight: f64,
    /// Epoch budget.
    #[serde(default = "default_num_epochs")]
    pub num_epochs: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Hidden units of the predictor.
    #[serde(default = "default_hidden_units")]
    pub hidden_units: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Multiplicative learning rate decay applied every `lr_decay_steps`.
    #[serde(default = "default_lr_decay_rate")]
    pub lr_decay_rate: f64,
    #[serde(default = "default_lr_decay_steps")]
    pub lr_decay_steps: usize,
    /// Epochs without loss improvement before a convergence warning.
    #[serde(default = "default_patience")]
    pub patience: usize,
    /// Minimum loss decrease counted as an improvement.
    #[serde(default = "default_min_delta")]
    pub min_delta: f64,
    /// Seed for weight initialization and batch shuffling. Unseeded runs vary.
    #[serde(default)]
    pub seed: Option<u64>,
    /// When false, the predictor is trained without the adversary.
    #[serde(default = "default_true")]
    pub debias: bool,
    /// Stop at the first convergence warning instead of using the full epoch budget.
    #[serde(default)]
    pub early_stopping: bool,
}

impl Default for DebiasConfig {
    fn default() -> Self {
        Self {
            adversary_loss_weight: default_adversary_loss_weight(),
            num_epochs: default_num_epochs(),
            batch_size: default_batch_size(),
            hidden_units: default_hidden_units(),
            learning_rate: default_learning_rate(),
            lr_decay_rate: default_lr_decay_rate(),
            lr_decay_steps: default_lr_decay_steps(),
            patience: default_patience(),
            min_delta: default_min_delta(),
            seed: None,
            debias: true,
            early_stopping: false,
        }
    }
}

fn default_adversary_loss_weight() -> f64 {
    0.1
}

fn default_num_epochs() -> usize {
    50
}

fn default_batch_size() -> usize {
    128
}

fn default_hidden_units() -> usize {
    200
}

fn default_learning_rate() -> f64 {
    0.001
}

fn default_lr_decay_rate() -> f64 {
    0.96
}

fn default_lr_decay_steps() -> usize {
    1000
}

fn default_patience() -> usize {
    5
}

fn default_min_delta() -> f64 {
    1e-4
}

fn default_true() -> bool {
    true
}

/// Dataset handling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Fraction of rows held out for evaluation.
    #[serde(default = "default_test_size")]
    pub test_size: f64,
    /// Seed of the stratified train/test split.
    #[serde(default = "default_split_seed")]
    pub split_seed: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            test_size: default_test_size(),
            split_seed: default_split_seed(),
        }
    }
}

fn default_test_size() -> f64 {
    0.2
}

fn default_split_seed() -> u64 {
    42
}

/// Persisted artifact configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    /// Directory holding `scaler.json` and `classifier.json`.
    #[serde(default = "default_artifacts_dir")]
    pub dir: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: default_artifacts_dir(),
        }
    }
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from(".fairhire/artifacts")
}

impl FairnessConfig {
    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), FairnessError> {
        if !self.decision.threshold.is_finite() || self.decision.threshold < 0.0 {
            return Err(FairnessError::Config(format!(
                "decision.threshold must be a non-negative number, got {}",
                self.decision.threshold
            )));
        }
        if !(0.0..1.0).contains(&self.data.test_size) {
            return Err(FairnessError::Config(format!(
                "data.test_size must be in [0, 1), got {}",
                self.data.test_size
            )));
        }
        if self.debias.batch_size == 0 {
            return Err(FairnessError::Config("debias.batch_size must be > 0".into()));
        }
        if self.debias.hidden_units == 0 {
            return Err(FairnessError::Config(
                "debias.hidden_units must be > 0".into(),
            ));
        }
        if self.debias.learning_rate <= 0.0 {
            return Err(FairnessError::Config(
                "debias.learning_rate must be > 0".into(),
            ));
        }
        if self.debias.adversary_loss_weight < 0.0 {
            return Err(FairnessError::Config(
                "debias.adversary_loss_weight must be >= 0".into(),
            ));
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, FairnessError> {
        toml::to_string_pretty(self).map_err(|e| FairnessError::Config(e.to_string()))
    }
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".fairhire").join("config.toml")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `FAIRHIRE_`)
/// 3. Workspace-local config (`.fairhire/config.toml`)
/// 4. User config (`~/.config/fairhire/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&FairnessConfig>,
) -> Result<FairnessConfig, FairnessError> {
    let mut figment = Figment::from(Serialized::defaults(FairnessConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "fairhire", "fairhire") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // FAIRHIRE_DECISION__THRESHOLD, FAIRHIRE_DEBIAS__SEED, etc.
    figment = figment.merge(Env::prefixed("FAIRHIRE_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: FairnessConfig = figment
        .extract()
        .map_err(|e| FairnessError::Config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}
