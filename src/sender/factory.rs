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

// Sender factory for creating record senders from configuration

use super::backend::RecordSender;
use super::filesystem::FilesystemSender;
use super::reductstore::ReductStoreSender;
use crate::config::SenderConfig;
use anyhow::{bail, Result};
use std::sync::Arc;

pub struct SenderFactory;

impl SenderFactory {
    /// Create record sender from configuration
    pub fn create(config: &SenderConfig) -> Result<Arc<dyn RecordSender>> {
        match config.backend.as_str() {
            "reductstore" => {
                let backend_config = config
                    .backend_config
                    .as_reductstore()
                    .ok_or_else(|| anyhow::anyhow!("ReductStore config missing"))?;

                let sender = ReductStoreSender::new(backend_config.clone())?;
                Ok(Arc::new(sender))
            }

            "filesystem" => {
                let backend_config = config
                    .backend_config
                    .as_filesystem()
                    .ok_or_else(|| anyhow::anyhow!("Filesystem config missing"))?;

                let sender = FilesystemSender::new(backend_config.clone())?;
                Ok(Arc::new(sender))
            }

            unknown => bail!(
                "Unknown sender backend: '{}'. Supported: reductstore, filesystem",
                unknown
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, FilesystemConfig, ReductStoreConfig};

    #[test]
    fn test_create_reductstore_sender() {
        let sender_config = SenderConfig {
            backend: "reductstore".to_string(),
            backend_config: BackendConfig::ReductStore {
                reductstore: ReductStoreConfig::default(),
            },
        };

        let sender = SenderFactory::create(&sender_config);
        assert!(sender.is_ok());
        assert_eq!(sender.unwrap().sender_type(), "reductstore");
    }

    #[test]
    fn test_create_filesystem_sender() {
        let sender_config = SenderConfig {
            backend: "filesystem".to_string(),
            backend_config: BackendConfig::Filesystem {
                filesystem: FilesystemConfig::default(),
            },
        };

        let sender = SenderFactory::create(&sender_config);
        assert!(sender.is_ok());
        assert_eq!(sender.unwrap().sender_type(), "filesystem");
    }

    #[test]
    fn test_mismatched_backend_config() {
        let sender_config = SenderConfig {
            backend: "filesystem".to_string(),
            backend_config: BackendConfig::ReductStore {
                reductstore: ReductStoreConfig::default(),
            },
        };

        let sender = SenderFactory::create(&sender_config);
        assert!(sender.is_err());
    }

    #[test]
    fn test_create_unknown_sender() {
        let sender_config = SenderConfig {
            backend: "kinesis".to_string(),
            backend_config: BackendConfig::ReductStore {
                reductstore: ReductStoreConfig::default(),
            },
        };

        let sender = SenderFactory::create(&sender_config);
        assert!(sender.is_err());
        if let Err(e) = sender {
            assert!(e.to_string().contains("Unknown sender backend"));
        }
    }
}
