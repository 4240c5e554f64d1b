// Configuration loader with environment variable substitution

use super::types::*;
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<RecorderConfig> {
        let content = std::fs::read_to_string(path.as_ref())
            .context("Failed to read config file")?;

        Self::load_from_str(&content)
    }

    /// Parse and validate configuration text
    pub fn load_from_str(content: &str) -> Result<RecorderConfig> {
        let content = Self::substitute_env_vars(content);

        let config: RecorderConfig = serde_yaml::from_str(&content)
            .context("Failed to parse YAML configuration")?;

        Self::validate(&config)?;

        Ok(config)
    }

    /// Substitute ${VAR} and ${VAR:-default} patterns with environment variables
    ///
    /// Examples:
    /// - ${HOME} -> /home/user
    /// - ${RECORDER_DIR:-/var/lib/recorder} -> /var/lib/recorder (if RECORDER_DIR not set)
    fn substitute_env_vars(content: &str) -> String {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let re = PATTERN.get_or_init(|| {
            Regex::new(r"\$\{([^}:]+)(?::-([^}]+))?\}").expect("env var pattern is valid")
        });

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str());

            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => match default_value {
                    Some(default) => default.to_string(),
                    // Keep original if no default and var not found
                    None => format!("${{{}}}", var_name),
                },
            }
        })
        .to_string()
    }

    /// Validate configuration
    pub fn validate(config: &RecorderConfig) -> Result<()> {
        let recorder = &config.recorder;

        if recorder.storage.max_storage_size_bytes == 0 {
            bail!("storage.max_storage_size_bytes must be > 0");
        }

        if recorder.storage.file_name.trim().is_empty() {
            bail!("storage.file_name cannot be empty");
        }

        if recorder.batch.max_records == 0 {
            bail!("batch.max_records must be > 0");
        }

        if recorder.batch.max_size_bytes == 0 {
            bail!("batch.max_size_bytes must be > 0");
        }

        if recorder.batch.max_size_bytes as u64 > recorder.storage.max_storage_size_bytes {
            bail!("batch.max_size_bytes cannot exceed storage.max_storage_size_bytes");
        }

        if recorder.flush_policy.interval_seconds == 0 {
            bail!("flush_policy.interval_seconds must be > 0");
        }

        match config.sender.backend.as_str() {
            "reductstore" => {
                if config.sender.backend_config.as_reductstore().is_none() {
                    bail!("reductstore sender selected but reductstore config missing");
                }
            }
            "filesystem" => {
                if config.sender.backend_config.as_filesystem().is_none() {
                    bail!("filesystem sender selected but filesystem config missing");
                }
            }
            unknown => bail!("Unknown sender backend: '{}'. Supported: reductstore, filesystem", unknown),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("OFFLINE_RECORDER_TEST_VAR", "test_value");

        let input = "url: ${OFFLINE_RECORDER_TEST_VAR}";
        let output = ConfigLoader::substitute_env_vars(input);
        assert_eq!(output, "url: test_value");

        std::env::remove_var("OFFLINE_RECORDER_TEST_VAR");
    }

    #[test]
    fn test_env_var_with_default() {
        std::env::remove_var("OFFLINE_RECORDER_TEST_VAR2");

        let input = "directory: ${OFFLINE_RECORDER_TEST_VAR2:-/tmp/records}";
        let output = ConfigLoader::substitute_env_vars(input);
        assert_eq!(output, "directory: /tmp/records");
    }

    #[test]
    fn test_unset_var_without_default_is_kept() {
        std::env::remove_var("OFFLINE_RECORDER_TEST_VAR3");

        let output = ConfigLoader::substitute_env_vars("token: ${OFFLINE_RECORDER_TEST_VAR3}");
        assert_eq!(output, "token: ${OFFLINE_RECORDER_TEST_VAR3}");
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(ConfigLoader::validate(&RecorderConfig::default()).is_ok());
    }

    #[test]
    fn test_validation_zero_storage_size() {
        let mut config = RecorderConfig::default();
        config.recorder.storage.max_storage_size_bytes = 0;

        let result = ConfigLoader::validate(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("max_storage_size_bytes"));
    }

    #[test]
    fn test_validation_batch_larger_than_store() {
        let mut config = RecorderConfig::default();
        config.recorder.storage.max_storage_size_bytes = 1024;
        config.recorder.batch.max_size_bytes = 4096;

        let result = ConfigLoader::validate(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("batch.max_size_bytes"));
    }

    #[test]
    fn test_validation_unknown_backend() {
        let mut config = RecorderConfig::default();
        config.sender.backend = "s3".to_string();

        let result = ConfigLoader::validate(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Unknown sender backend"));
    }
}
