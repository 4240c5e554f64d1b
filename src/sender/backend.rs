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

// Record sender trait for batch delivery

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Delivers batches of buffered records to a remote sink
///
/// The drain loop hands a sender one same-stream batch at a time and decides
/// what to keep on disk from the outcome:
///
/// - `Ok(failed)` lists the payloads the sink did not accept. An empty list
///   means the whole batch landed. Failed payloads are matched back to the
///   batch by equality, so implementations must return them unchanged.
/// - `Err(e)` means nothing can be assumed delivered. `is_recoverable(&e)`
///   decides whether the batch stays on disk for a later drain or is dropped.
#[async_trait]
pub trait RecordSender: Send + Sync {
    /// Prepare the sink (create bucket/directory if needed)
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Send one batch of payloads for `stream_name`
    ///
    /// # Arguments
    /// * `stream_name` - Destination stream of every payload in the batch
    /// * `payloads` - Record payloads in store order
    async fn send_batch(&self, stream_name: &str, payloads: Vec<Bytes>) -> Result<Vec<Bytes>>;

    /// Whether retrying the same data later may succeed
    fn is_recoverable(&self, error: &anyhow::Error) -> bool;

    /// Get sender type identifier
    fn sender_type(&self) -> &str;
}

/// Convert a stream name to a sink entry name
pub fn stream_to_entry_name(stream_name: &str) -> String {
    stream_name
        .trim_start_matches('/')
        .replace('/', "_")
        .replace("**", "all")
}
