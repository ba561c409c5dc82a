//! Configuration loading functionality.
//!
//! Finds `greenhouse.toml`, parses it and validates the result. Unlike an
//! explicit path, the default location may be absent; defaults apply then.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::Config;
use super::validation::validate_config;

pub const CONFIG_FILE_NAME: &str = "greenhouse.toml";

/// Configuration directory chosen on the command line, set once at startup.
static CONFIG_DIR: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Set the configuration directory for the current process.
/// Returns an error if already set.
pub fn set_config_dir(dir: Option<String>) -> Result<()> {
    CONFIG_DIR
        .set(dir.map(PathBuf::from))
        .map_err(|_| anyhow::anyhow!("Configuration directory already set"))
}

/// The `--config` directory, if one was given.
pub fn get_custom_config_dir() -> Option<PathBuf> {
    CONFIG_DIR.get().and_then(|d| d.clone())
}

/// Path of `greenhouse.toml`, whether or not it exists.
pub fn get_config_path() -> Result<PathBuf> {
    if let Some(custom_dir) = get_custom_config_dir() {
        return Ok(custom_dir.join(CONFIG_FILE_NAME));
    }

    let config_dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(config_dir.join("greenhouse").join(CONFIG_FILE_NAME))
}

/// Load configuration from the detected path, or defaults if there is none.
pub fn load() -> Result<Config> {
    let config_path = get_config_path()?;

    if !config_path.exists() {
        log_indented!(
            "No configuration at {}, using defaults",
            config_path.display()
        );
        return Ok(Config::default());
    }

    load_from_path(&config_path)
}

/// Load configuration from a specific path, which must exist.
pub fn load_from_path(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;

    let config = parse(&content)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

    Ok(config)
}

/// Parse and validate TOML text.
pub fn parse(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;
    validate_config(&config)?;
    Ok(config)
}
