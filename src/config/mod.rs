// Configuration module for offline-recorder
//
// Provides:
// - YAML configuration file loading
// - Environment variable substitution
// - Configuration validation
// - Default values

pub mod types;
mod loader;

pub use types::*;
pub use loader::ConfigLoader;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RecorderConfig> {
    ConfigLoader::load(path).context("Failed to load configuration")
}

/// Load configuration with environment variable overrides
pub fn load_config_with_env<P: AsRef<Path>>(path: P) -> Result<RecorderConfig> {
    let mut config = load_config(path)?;

    // Allow environment variables to override config values
    if let Ok(directory) = std::env::var("RECORDER_DIRECTORY") {
        config.recorder.storage.directory = PathBuf::from(directory);
    }

    if let Ok(reduct_url) = std::env::var("REDUCTSTORE_URL") {
        if let Some(reduct_config) = config.sender.backend_config.as_reductstore_mut() {
            reduct_config.url = reduct_url;
        }
    }

    if let Ok(api_token) = std::env::var("REDUCT_API_TOKEN") {
        if let Some(reduct_config) = config.sender.backend_config.as_reductstore_mut() {
            reduct_config.api_token = Some(api_token);
        }
    }

    ConfigLoader::validate(&config)?;

    Ok(config)
}
