//! Configuration file loading

use super::Config;
use crate::util::fs::atomic_write;
use anyhow::{Context, Result};
use std::path::Path;

/// Config file name in the working directory
pub const CONFIG_FILE: &str = "tavern.json";

/// Load and parse config from path
pub fn load_from_path(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    super::validate(&config)?;

    Ok(config)
}

/// Write config as pretty JSON
pub fn write(config: &Config, path: &Path) -> Result<()> {
    let mut json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
    json.push('\n');
    atomic_write(path, json.as_bytes(), false)
        .with_context(|| format!("Failed to write config file: {}", path.display()))
}
