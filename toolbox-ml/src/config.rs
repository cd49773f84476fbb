//! Configuration for datasets and the training loop.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment -> explicit overrides.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level toolbox configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolboxConfig {
    /// Dataset loading and splitting defaults.
    #[serde(default)]
    pub data: DataConfig,
    /// Training loop defaults.
    #[serde(default)]
    pub training: TrainLoopConfig,
}

/// Dataset loading and splitting defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Field delimiter for CSV files.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Seed used when shuffling before a split. Unseeded when absent.
    #[serde(default)]
    pub shuffle_seed: Option<u64>,
    /// File suffixes collected from folders. Empty means any extension.
    #[serde(default)]
    pub default_extensions: Vec<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            shuffle_seed: None,
            default_extensions: Vec::new(),
        }
    }
}

fn default_delimiter() -> char {
    ','
}

/// Settings for the optimiser built when a training loop is given none.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SgdSettings {
    #[serde(default = "default_lr")]
    pub lr: f64,
    #[serde(default = "default_momentum")]
    pub momentum: f64,
}

impl Default for SgdSettings {
    fn default() -> Self {
        Self {
            lr: default_lr(),
            momentum: default_momentum(),
        }
    }
}

fn default_lr() -> f64 {
    0.00005
}

fn default_momentum() -> f64 {
    0.9
}

/// Training loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainLoopConfig {
    /// Number of epochs to train for.
    #[serde(default = "default_epochs")]
    pub nr_of_epochs: usize,
    /// Defaults for the fallback optimiser.
    #[serde(default)]
    pub sgd: SgdSettings,
    /// Cancel the run on Ctrl-C.
    #[serde(default = "default_true")]
    pub handle_interrupt: bool,
    /// Log progress every N batches (0 disables).
    #[serde(default)]
    pub log_every: usize,
}

impl Default for TrainLoopConfig {
    fn default() -> Self {
        Self {
            nr_of_epochs: default_epochs(),
            sgd: SgdSettings::default(),
            handle_interrupt: true,
            log_every: 0,
        }
    }
}

fn default_epochs() -> usize {
    100
}

fn default_true() -> bool {
    true
}

/// Values set explicitly, e.g. from command-line flags. Unset fields leave
/// the lower layers alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub nr_of_epochs: Option<usize>,
    pub lr: Option<f64>,
    pub shuffle_seed: Option<u64>,
}

impl ConfigOverrides {
    fn merge_into(&self, mut figment: Figment) -> Figment {
        if let Some(epochs) = self.nr_of_epochs {
            figment = figment.merge(Serialized::default("training.nr_of_epochs", epochs));
        }
        if let Some(lr) = self.lr {
            figment = figment.merge(Serialized::default("training.sgd.lr", lr));
        }
        if let Some(seed) = self.shuffle_seed {
            figment = figment.merge(Serialized::default("data.shuffle_seed", seed));
        }
        figment
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `TOOLBOX_`)
/// 3. Workspace-local config (`.toolbox/config.toml`)
/// 4. User config (`~/.config/toolbox/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<ToolboxConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(ToolboxConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "toolbox", "toolbox") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".toolbox").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // TOOLBOX_TRAINING__NR_OF_EPOCHS, TOOLBOX_DATA__DELIMITER, ...
    figment = figment.merge(Env::prefixed("TOOLBOX_").split("__"));

    overrides.merge_into(figment).extract().map_err(Box::new)
}
