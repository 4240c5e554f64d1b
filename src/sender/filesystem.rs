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

// Filesystem sender implementation

use super::backend::{stream_to_entry_name, RecordSender};
use crate::config::FilesystemConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Sender that lands each batch as a file on local disk
///
/// Layout: `<base_path>/<entry>/<timestamp_us>.<ext>` with one base64 payload
/// per line, next to a `<timestamp_us>.meta.json` describing the batch.
/// A batch is written whole or the call fails; there is no partial result.
pub struct FilesystemSender {
    base_path: PathBuf,
    file_extension: String,
}

impl FilesystemSender {
    pub fn new(config: FilesystemConfig) -> Result<Self> {
        let base_path = PathBuf::from(&config.base_path);

        info!(
            "Initializing filesystem sender at: {}",
            base_path.display()
        );

        Ok(Self {
            base_path,
            file_extension: config.file_extension,
        })
    }

    fn entry_dir(&self, stream_name: &str) -> std::io::Result<PathBuf> {
        let entry_name = stream_to_entry_name(stream_name);
        if entry_name.is_empty() || entry_name == "." || entry_name == ".." {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("stream '{}' has no usable entry name", stream_name),
            ));
        }
        Ok(self.base_path.join(entry_name))
    }

    /// Create a batch file that does not exist yet, returning it with its timestamp
    async fn create_batch_file(&self, entry_dir: &Path) -> Result<(fs::File, u64)> {
        let mut timestamp_us = now_micros();
        loop {
            let path = entry_dir.join(format!("{}.{}", timestamp_us, self.file_extension));
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((file, timestamp_us)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => timestamp_us += 1,
                Err(e) => {
                    return Err(anyhow::Error::new(e)
                        .context(format!("Failed to create file: {}", path.display())))
                }
            }
        }
    }
}

#[async_trait]
impl RecordSender for FilesystemSender {
    async fn initialize(&self) -> Result<()> {
        if !self.base_path.exists() {
            info!("Creating base directory: {}", self.base_path.display());
            fs::create_dir_all(&self.base_path)
                .await
                .context("Failed to create base directory")?;
        }
        Ok(())
    }

    async fn send_batch(&self, stream_name: &str, payloads: Vec<Bytes>) -> Result<Vec<Bytes>> {
        let entry_dir = self.entry_dir(stream_name)?;
        fs::create_dir_all(&entry_dir)
            .await
            .context("Failed to create entry directory")?;

        let (mut file, timestamp_us) = self.create_batch_file(&entry_dir).await?;

        let mut body = String::new();
        for payload in &payloads {
            body.push_str(&STANDARD.encode(payload));
            body.push('\n');
        }
        file.write_all(body.as_bytes())
            .await
            .context("Failed to write batch")?;
        file.sync_all().await.context("Failed to sync batch")?;

        let bytes: usize = payloads.iter().map(|p| p.len()).sum();
        let mut labels = HashMap::new();
        labels.insert("stream".to_string(), stream_name.to_string());
        labels.insert("record_count".to_string(), payloads.len().to_string());
        labels.insert("bytes".to_string(), bytes.to_string());

        let metadata_path = entry_dir.join(format!("{}.meta.json", timestamp_us));
        let metadata_json =
            serde_json::to_string_pretty(&labels).context("Failed to serialize metadata")?;
        fs::write(&metadata_path, metadata_json)
            .await
            .context(format!(
                "Failed to write metadata file: {}",
                metadata_path.display()
            ))?;

        debug!(
            "Wrote {} records ({} bytes) for stream '{}' to {}",
            payloads.len(),
            bytes,
            stream_name,
            entry_dir.display()
        );

        Ok(Vec::new())
    }

    fn is_recoverable(&self, error: &anyhow::Error) -> bool {
        match error.downcast_ref::<std::io::Error>() {
            Some(io) => !matches!(
                io.kind(),
                ErrorKind::InvalidInput | ErrorKind::PermissionDenied | ErrorKind::InvalidData
            ),
            None => true,
        }
    }

    fn sender_type(&self) -> &str {
        "filesystem"
    }
}

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_sender() -> (FilesystemSender, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = FilesystemConfig {
            base_path: temp_dir.path().join("out").to_string_lossy().to_string(),
            file_extension: "batch".to_string(),
        };
        let sender = FilesystemSender::new(config).unwrap();
        (sender, temp_dir)
    }

    #[tokio::test]
    async fn test_initialize_creates_base_dir() {
        let (sender, _temp_dir) = create_test_sender();
        sender.initialize().await.unwrap();
        assert!(sender.base_path.exists());
    }

    #[tokio::test]
    async fn test_send_batch_writes_file_and_metadata() {
        let (sender, _temp_dir) = create_test_sender();
        sender.initialize().await.unwrap();

        let payloads = vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")];
        let failed = sender.send_batch("/app/clicks", payloads).await.unwrap();
        assert!(failed.is_empty());

        let entry_dir = sender.base_path.join("app_clicks");
        let mut batch_files = Vec::new();
        let mut meta_files = Vec::new();
        for entry in std::fs::read_dir(&entry_dir).unwrap() {
            let path = entry.unwrap().path();
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            if name.ends_with(".meta.json") {
                meta_files.push(path);
            } else {
                batch_files.push(path);
            }
        }
        assert_eq!(batch_files.len(), 1);
        assert_eq!(meta_files.len(), 1);

        let content = std::fs::read_to_string(&batch_files[0]).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines, vec![STANDARD.encode("one"), STANDARD.encode("two")]);

        let labels: HashMap<String, String> =
            serde_json::from_str(&std::fs::read_to_string(&meta_files[0]).unwrap()).unwrap();
        assert_eq!(labels["stream"], "/app/clicks");
        assert_eq!(labels["record_count"], "2");
        assert_eq!(labels["bytes"], "6");
    }

    #[tokio::test]
    async fn test_back_to_back_batches_get_distinct_files() {
        let (sender, _temp_dir) = create_test_sender();
        sender.initialize().await.unwrap();

        for i in 0..5 {
            let payload = Bytes::from(format!("payload_{}", i));
            sender.send_batch("events", vec![payload]).await.unwrap();
        }

        let count = std::fs::read_dir(sender.base_path.join("events"))
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .path()
                    .extension()
                    .is_some_and(|ext| ext == "batch")
            })
            .count();
        assert_eq!(count, 5);
    }

    #[tokio::test]
    async fn test_unusable_stream_name_is_not_recoverable() {
        let (sender, _temp_dir) = create_test_sender();
        sender.initialize().await.unwrap();

        let err = sender
            .send_batch("..", vec![Bytes::from_static(b"x")])
            .await
            .unwrap_err();
        assert!(!sender.is_recoverable(&err));
    }
}
