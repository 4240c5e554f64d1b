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

// Per-stream batch assembly

use bytes::Bytes;
use tracing::debug;

use crate::cursor::RecordCursor;
use crate::error::Result;

/// Consecutive records of a single stream, in store order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub stream_name: String,
    pub payloads: Vec<Bytes>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// Sum of payload sizes
    pub fn size_bytes(&self) -> usize {
        self.payloads.iter().map(|p| p.len()).sum()
    }
}

/// Pull the next batch off the cursor.
///
/// The batch ends at `max_count` records, at the first record of another
/// stream (left unconsumed for the next call), or once the payload total has
/// reached `max_size_bytes`. The size limit is soft: the record that crosses
/// it is still admitted.
///
/// `expected_stream` names the stream being accumulated; an empty batch takes
/// the stream of whatever record comes first. Returns `None` when the cursor
/// has no records left.
pub fn next_batch(
    cursor: &mut RecordCursor<'_>,
    expected_stream: Option<&str>,
    max_count: usize,
    max_size_bytes: usize,
) -> Result<Option<Batch>> {
    let mut stream_name = expected_stream.map(str::to_string);
    let mut payloads: Vec<Bytes> = Vec::new();
    let mut size = 0usize;

    while payloads.len() < max_count && size < max_size_bytes {
        let Some(record) = cursor.peek()? else {
            break;
        };

        if let Some(name) = &stream_name {
            if *name != record.stream_name && !payloads.is_empty() {
                break;
            }
        }
        stream_name = Some(record.stream_name);

        // Consume what was just peeked
        if let Some(record) = cursor.next()? {
            size += record.payload.len();
            payloads.push(record.payload);
        }
    }

    if payloads.is_empty() {
        return Ok(None);
    }

    let stream_name = stream_name.unwrap_or_default();
    debug!(
        "Assembled batch of {} records ({} bytes) for stream '{}'",
        payloads.len(),
        size,
        stream_name
    );
    Ok(Some(Batch {
        stream_name,
        payloads,
    }))
}
