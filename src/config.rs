use crate::{cli::OutputFormat, log::CliVerbosity};
use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub verbosity: CliVerbosity,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default = "default_true")]
    pub log_to_file: bool,
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            verbosity: CliVerbosity::default(),
            format: OutputFormat::default(),
            log_to_file: true,
            dry_run: false,
        }
    }
}

impl AppConfig {
    /// Reads the config from `override_path` or the default location.
    ///
    /// A missing default file yields the defaults; nothing is written.
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = override_path {
            return Self::load_from(path);
        }
        let path = default_config_path()?;
        if !path.exists() {
            return Ok(AppConfig::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parse config {}", path.display()))?;
        Ok(config)
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.config_dir().join("modscrub").join("config.json"))
}

fn default_true() -> bool {
    true
}
