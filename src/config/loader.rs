use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

fn default_program() -> String {
    "claude".to_string()
}

fn default_max_instances() -> usize {
    8
}

fn default_update_check_secs() -> u64 {
    900
}

fn default_preview_refresh_ms() -> u64 {
    1000
}

fn default_history_limit() -> usize {
    50
}

/// User configuration, loaded from a YAML file. Everything has a default
/// so a missing file is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Agent program started inside each instance's tmux session.
    #[serde(default = "default_program")]
    pub program: String,

    #[serde(default = "default_max_instances")]
    pub max_instances: usize,

    #[serde(default = "default_update_check_secs")]
    pub update_check_secs: u64,

    #[serde(default = "default_preview_refresh_ms")]
    pub preview_refresh_ms: u64,

    /// How many commits the history overlay shows.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Overrides of the form `action_name: key_name`.
    #[serde(default)]
    pub keybindings: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            program: default_program(),
            max_instances: default_max_instances(),
            update_check_secs: default_update_check_secs(),
            preview_refresh_ms: default_preview_refresh_ms(),
            history_limit: default_history_limit(),
            keybindings: HashMap::new(),
        }
    }
}

impl Config {
    /// Load from `CORRAL_CONFIG` when set, otherwise the default location.
    /// A missing file yields the defaults; a malformed one is an error so
    /// typos do not silently revert settings.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::resolved_path())
    }

    /// The path `load` reads from and the keybinding editor writes back to.
    pub fn resolved_path() -> PathBuf {
        match std::env::var_os("CORRAL_CONFIG") {
            Some(p) => PathBuf::from(p),
            None => Self::default_path(),
        }
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("corral")
            .join("config.yaml")
    }

    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        serde_yaml::from_str(&content).with_context(|| format!("Malformed config {:?}", path))
    }

    /// Write the configuration back, creating parent directories.
    pub async fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create config dir {:?}", parent))?;
        }
        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write config {:?}", path))
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_max_instances(mut self, max: usize) -> Self {
        self.max_instances = max;
        self
    }
}
