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

// Recorder: buffers records on disk and drains them through a sender

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info, warn};

use crate::batch::{next_batch, Batch};
use crate::config::{BatchPolicy, RecorderSettings, RetryPolicy};
use crate::cursor::RecordCursor;
use crate::error::{RecorderError, Result};
use crate::sender::RecordSender;
use crate::store::RecordStore;

/// Outcome of a drain that did not raise
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub batches_delivered: usize,
    pub records_delivered: usize,
    /// Stream whose batch still had refused records after the retry budget
    pub stalled_stream: Option<String>,
    /// Records of the stalled batch the sink never accepted
    pub records_pending: usize,
}

impl DrainReport {
    /// True when the drain reached the end of the store
    pub fn is_complete(&self) -> bool {
        self.stalled_stream.is_none()
    }
}

enum Delivery {
    Delivered,
    /// Retry budget spent with this many payloads still refused
    Stalled(usize),
    Failed {
        error: anyhow::Error,
        undelivered: usize,
    },
}

/// Disk-backed record buffer bound to one sender
///
/// Producers call `save_record` from any thread. `submit_all_records` drains
/// the store batch by batch; only one drain runs at a time.
pub struct Recorder {
    store: RecordStore,
    sender: Arc<dyn RecordSender>,
    batch: BatchPolicy,
    retry: RetryPolicy,
    flush_threshold: u64,
    flush_signal: Notify,
    drain_lock: Mutex<()>,
}

impl Recorder {
    /// Open the store described by `settings`
    pub fn new(settings: &RecorderSettings, sender: Arc<dyn RecordSender>) -> Result<Self> {
        let storage = &settings.storage;
        let store = RecordStore::open(
            &storage.directory,
            &storage.file_name,
            storage.max_storage_size_bytes,
        )?;
        Self::with_store(store, settings, sender)
    }

    /// Wrap an already opened store
    pub fn with_store(
        store: RecordStore,
        settings: &RecorderSettings,
        sender: Arc<dyn RecordSender>,
    ) -> Result<Self> {
        if settings.batch.max_records == 0 || settings.batch.max_size_bytes == 0 {
            return Err(RecorderError::Config(
                "batch limits must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            store,
            sender,
            batch: settings.batch.clone(),
            retry: settings.retry.clone(),
            flush_threshold: settings.flush_policy.threshold_bytes,
            flush_signal: Notify::new(),
            drain_lock: Mutex::new(()),
        })
    }

    /// Buffer one record. `Ok(false)` means the store is full and the record
    /// was dropped.
    pub fn save_record(&self, payload: &[u8], stream_name: &str) -> Result<bool> {
        let saved = self.store.put(payload, stream_name)?;
        if saved && self.store.size_bytes() >= self.flush_threshold {
            self.flush_signal.notify_one();
        }
        Ok(saved)
    }

    /// Drain the store through the sender
    ///
    /// Each same-stream batch is removed from disk only once the sender has
    /// accepted all of it. Refused payloads are resent up to
    /// `retry.max_retries` times; if they are still refused the drain stops
    /// quietly and leaves the batch on disk. A recoverable send error stops
    /// the drain with nothing removed; any other send error drops the batch
    /// from disk before it is returned.
    pub async fn submit_all_records(&self) -> Result<DrainReport> {
        let _guard = self.drain_lock.lock().await;

        let mut cursor = self.store.iterator()?;
        let outcome = self.drain(&mut cursor).await;
        cursor.close();

        if let Ok(report) = &outcome {
            info!(
                "Drain finished: {} records in {} batches delivered, {} bytes left on disk",
                report.records_delivered,
                report.batches_delivered,
                self.store.size_bytes()
            );
        }
        outcome
    }

    async fn drain(&self, cursor: &mut RecordCursor<'_>) -> Result<DrainReport> {
        let mut report = DrainReport::default();

        while let Some(batch) = next_batch(
            cursor,
            None,
            self.batch.max_records,
            self.batch.max_size_bytes,
        )? {
            match self.deliver(&batch).await {
                Delivery::Delivered => {
                    cursor.remove_read_records()?;
                    report.batches_delivered += 1;
                    report.records_delivered += batch.len();
                }
                Delivery::Stalled(pending) => {
                    warn!(
                        "Stream '{}' still refusing {} of {} records after {} retries, stopping drain",
                        batch.stream_name,
                        pending,
                        batch.len(),
                        self.retry.max_retries
                    );
                    report.stalled_stream = Some(batch.stream_name);
                    report.records_pending = pending;
                    break;
                }
                Delivery::Failed { error, undelivered } => {
                    if self.sender.is_recoverable(&error) {
                        warn!(
                            "Recoverable failure sending to stream '{}', keeping records: {:#}",
                            batch.stream_name, error
                        );
                        return Err(RecorderError::Recoverable {
                            stream_name: batch.stream_name,
                            source: error,
                        });
                    }

                    cursor.remove_read_records()?;
                    error!(
                        "Stream '{}' rejected batch, dropped {} records: {:#}",
                        batch.stream_name, undelivered, error
                    );
                    return Err(RecorderError::Rejected {
                        stream_name: batch.stream_name,
                        dropped: undelivered,
                        source: error,
                    });
                }
            }
        }

        Ok(report)
    }

    /// Send a batch, resending only what the sender refused
    async fn deliver(&self, batch: &Batch) -> Delivery {
        let mut pending = batch.payloads.clone();
        let mut attempt = 0u32;

        loop {
            let failed = match self
                .sender
                .send_batch(&batch.stream_name, pending.clone())
                .await
            {
                Ok(failed) => failed,
                Err(error) => {
                    return Delivery::Failed {
                        error,
                        undelivered: pending.len(),
                    }
                }
            };

            if failed.is_empty() {
                return Delivery::Delivered;
            }

            let refused = retain_refused(&pending, failed);
            if refused.is_empty() {
                warn!(
                    "Sender for stream '{}' reported failures that match no sent record, resending {} records",
                    batch.stream_name,
                    pending.len()
                );
            } else {
                pending = refused;
            }

            if attempt >= self.retry.max_retries {
                return Delivery::Stalled(pending.len());
            }

            let delay = self.retry.backoff(attempt);
            attempt += 1;
            debug!(
                "Retrying {} refused records for stream '{}' (attempt {}/{}) in {:?}",
                pending.len(),
                batch.stream_name,
                attempt,
                self.retry.max_retries,
                delay
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Remove every buffered record
    ///
    /// Waits for an in-flight drain to finish first.
    pub async fn delete_all_records(&self) -> Result<()> {
        let _guard = self.drain_lock.lock().await;
        self.store.delete_all()
    }

    pub fn disk_bytes_used(&self) -> u64 {
        self.store.size_bytes()
    }

    pub fn disk_byte_limit(&self) -> u64 {
        self.store.max_storage_size()
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn sender(&self) -> &Arc<dyn RecordSender> {
        &self.sender
    }

    /// Fires when `save_record` pushes usage past the flush threshold
    pub(crate) fn flush_signal(&self) -> &Notify {
        &self.flush_signal
    }
}

/// Payloads of `pending` that appear in `failed`, matched by equality and
/// counted so duplicates are only kept as often as they were refused
fn retain_refused(pending: &[Bytes], mut failed: Vec<Bytes>) -> Vec<Bytes> {
    pending
        .iter()
        .filter(|payload| match failed.iter().position(|f| f == *payload) {
            Some(i) => {
                failed.swap_remove(i);
                true
            }
            None => false,
        })
        .cloned()
        .collect()
}
