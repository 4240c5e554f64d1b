// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Configuration types for offline-recorder

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RecorderConfig {
    #[serde(default)]
    pub recorder: RecorderSettings,
    #[serde(default)]
    pub sender: SenderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Recorder-specific settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RecorderSettings {
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub batch: BatchPolicy,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub flush_policy: FlushPolicy,
}

/// Where records are buffered and how much disk they may use
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageSettings {
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    #[serde(default = "default_file_name")]
    pub file_name: String,

    /// Hard cap on the log file; records beyond it are dropped
    #[serde(default = "default_max_storage_size")]
    pub max_storage_size_bytes: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            file_name: default_file_name(),
            max_storage_size_bytes: default_max_storage_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchPolicy {
    /// Maximum records per send
    #[serde(default = "default_max_records")]
    pub max_records: usize,

    /// Soft cap on payload bytes per send
    #[serde(default = "default_max_batch_size")]
    pub max_size_bytes: usize,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
            max_size_bytes: default_max_batch_size(),
        }
    }
}

/// Retries of the failed part of a batch within one drain
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryPolicy {
    #[serde(default = "default_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), doubling and capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self.initial_backoff_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FlushPolicy {
    /// Drain at least this often while records are buffered
    #[serde(default = "default_flush_interval")]
    pub interval_seconds: u64,

    /// Drain as soon as the store holds this many bytes
    #[serde(default = "default_flush_threshold")]
    pub threshold_bytes: u64,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            interval_seconds: default_flush_interval(),
            threshold_bytes: default_flush_threshold(),
        }
    }
}

impl FlushPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

/// Sender configuration with backend selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SenderConfig {
    /// Backend type: "reductstore", "filesystem"
    pub backend: String,

    /// Backend-specific configuration
    #[serde(flatten)]
    pub backend_config: BackendConfig,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            backend: "reductstore".to_string(),
            backend_config: BackendConfig::ReductStore {
                reductstore: ReductStoreConfig::default(),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum BackendConfig {
    ReductStore {
        #[serde(rename = "reductstore")]
        reductstore: ReductStoreConfig,
    },
    Filesystem {
        #[serde(rename = "filesystem")]
        filesystem: FilesystemConfig,
    },
}

impl BackendConfig {
    pub fn as_reductstore(&self) -> Option<&ReductStoreConfig> {
        match self {
            BackendConfig::ReductStore { reductstore } => Some(reductstore),
            _ => None,
        }
    }

    pub fn as_reductstore_mut(&mut self) -> Option<&mut ReductStoreConfig> {
        match self {
            BackendConfig::ReductStore { reductstore } => Some(reductstore),
            _ => None,
        }
    }

    pub fn as_filesystem(&self) -> Option<&FilesystemConfig> {
        match self {
            BackendConfig::Filesystem { filesystem } => Some(filesystem),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReductStoreConfig {
    pub url: String,
    pub bucket_name: String,
    #[serde(default)]
    pub api_token: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ReductStoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8383".to_string(),
            bucket_name: "offline_records".to_string(),
            api_token: None,
            timeout_seconds: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilesystemConfig {
    pub base_path: String,
    #[serde(default = "default_file_extension")]
    pub file_extension: String,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            base_path: "/data/delivered".to_string(),
            file_extension: default_file_extension(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,  // "trace", "debug", "info", "warn", "error"

    #[serde(default = "default_log_format")]
    pub format: String,  // "text", "compact"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_directory() -> PathBuf { PathBuf::from("./recorder_data") }
fn default_file_name() -> String { "records.log".to_string() }
fn default_max_storage_size() -> u64 { 5 * 1024 * 1024 }
fn default_max_records() -> usize { 128 }
fn default_max_batch_size() -> usize { 512 * 1024 }
fn default_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 100 }
fn default_max_backoff() -> u64 { 30_000 }
fn default_flush_interval() -> u64 { 30 }
fn default_flush_threshold() -> u64 { 1024 * 1024 }
fn default_timeout() -> u64 { 60 }
fn default_file_extension() -> String { "batch".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "text".to_string() }
