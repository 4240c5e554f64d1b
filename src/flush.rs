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

// Background flush worker
//
// Drains the recorder when either trigger fires:
// - the flush interval elapses while records are buffered
// - a saved record pushes disk usage to the flush threshold

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::FlushPolicy;
use crate::recorder::Recorder;

/// Handle to a running flush task
pub struct FlushWorker {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl FlushWorker {
    /// Start draining `recorder` in the background
    pub fn spawn(recorder: Arc<Recorder>, policy: FlushPolicy) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(policy.interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            info!(
                "Flush worker started (interval {:?}, threshold {} bytes)",
                policy.interval(),
                policy.threshold_bytes
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if recorder.disk_bytes_used() == 0 {
                            continue;
                        }
                        debug!("Flush interval elapsed");
                    }
                    _ = recorder.flush_signal().notified() => {
                        debug!("Flush threshold reached");
                    }
                    _ = shutdown_rx.changed() => break,
                }

                flush_once(&recorder).await;
            }

            if recorder.disk_bytes_used() > 0 {
                flush_once(&recorder).await;
            }
            info!("Flush worker stopped");
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Stop the worker after one last drain attempt
    pub async fn shutdown(self) -> Result<()> {
        // The receiver only goes away if the task already ended
        let _ = self.shutdown_tx.send(true);
        self.handle.await.context("Flush worker panicked")
    }
}

async fn flush_once(recorder: &Recorder) {
    match recorder.submit_all_records().await {
        Ok(report) if !report.is_complete() => {
            warn!(
                "Flush stalled on stream '{}' with {} records pending",
                report.stalled_stream.as_deref().unwrap_or_default(),
                report.records_pending
            );
        }
        Ok(_) => {}
        Err(e) if e.is_recoverable() => warn!("Flush will be retried later: {}", e),
        Err(e) => error!("Flush dropped records: {}", e),
    }
}
