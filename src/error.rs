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

// Error types for the record buffer

/// Errors surfaced by the record store, cursor and drain loop.
///
/// Capacity rejection and corrupt lines are not errors: `put` reports a
/// dropped record with `Ok(false)` and the cursor skips lines it cannot decode.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    /// Stream name is empty or contains a line break.
    #[error("invalid stream name: {0:?}")]
    InvalidStreamName(String),

    #[error("record store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A thread panicked while holding the store lock.
    #[error("record store lock poisoned")]
    LockPoisoned,

    /// Transient send failure. Nothing was removed from disk.
    #[error("recoverable failure sending to stream '{stream_name}': {source}")]
    Recoverable {
        stream_name: String,
        #[source]
        source: anyhow::Error,
    },

    /// Permanent send failure. The batch was removed from disk.
    #[error("stream '{stream_name}' rejected batch, dropped {dropped} records: {source}")]
    Rejected {
        stream_name: String,
        dropped: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid recorder configuration: {0}")]
    Config(String),
}

impl RecorderError {
    /// True when retrying the same drain later may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RecorderError::Recoverable { .. } | RecorderError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, RecorderError>;
