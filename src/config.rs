//! User configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::containers::DEFAULT_IMAGE;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_image")]
    pub default_image: String,

    /// Program (or program prefix) to image. The longest matching prefix wins.
    #[serde(default)]
    pub images: BTreeMap<String, String>,

    /// Directory holding the Dockerfile used when the image is missing locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_context: Option<PathBuf>,

    /// Extra host environment variables forwarded into the sandbox when set.
    #[serde(default)]
    pub forward_env: Vec<String>,

    /// Fixed values; `$NAME` reads from the host, `$$` escapes a literal `$`.
    #[serde(default)]
    pub environment_values: BTreeMap<String, String>,

    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,

    #[serde(default = "default_input_warmup_ms")]
    pub input_warmup_ms: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            default_image: default_image(),
            images: BTreeMap::new(),
            build_context: None,
            forward_env: Vec::new(),
            environment_values: BTreeMap::new(),
            stop_timeout_secs: default_stop_timeout_secs(),
            input_warmup_ms: default_input_warmup_ms(),
        }
    }
}

impl SandboxConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn input_warmup(&self) -> Duration {
        Duration::from_millis(self.input_warmup_ms)
    }
}

fn default_image() -> String {
    DEFAULT_IMAGE.to_string()
}

fn default_stop_timeout_secs() -> u64 {
    10
}

fn default_input_warmup_ms() -> u64 {
    50
}

pub fn get_app_dir() -> Result<PathBuf> {
    let base = dirs::config_dir().context("Could not find config directory")?;
    Ok(base.join("agentbox"))
}

fn config_path() -> Result<PathBuf> {
    Ok(get_app_dir()?.join("config.toml"))
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }
}

pub fn save_config(config: &Config) -> Result<()> {
    let path = config_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    fs::write(&path, content)?;
    Ok(())
}
