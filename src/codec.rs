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

// On-disk record line format
//
// One record per line: `<stream name>,<base64 payload>\n`
// The separator never occurs in base64 output, so decoding splits on the
// last separator and stream names may contain commas.

use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;

use crate::error::{RecorderError, Result};

pub const SEPARATOR: u8 = b',';
pub const LINE_TERMINATOR: u8 = b'\n';

/// A single buffered record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub stream_name: String,
    pub payload: Bytes,
}

impl Record {
    pub fn new(stream_name: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            stream_name: stream_name.into(),
            payload: payload.into(),
        }
    }
}

/// Why a stored line could not be turned back into a record
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("line has no stream separator")]
    MissingSeparator,
    #[error("stream name is not valid UTF-8")]
    InvalidStreamName,
    #[error("payload is not valid base64: {0}")]
    InvalidPayload(String),
}

/// Reject stream names that would break the line structure
pub fn validate_stream_name(stream_name: &str) -> Result<()> {
    if stream_name.is_empty() || stream_name.contains(['\n', '\r']) {
        return Err(RecorderError::InvalidStreamName(stream_name.to_string()));
    }
    Ok(())
}

/// Encode a record as one newline-terminated line
pub fn encode(stream_name: &str, payload: &[u8]) -> Result<Vec<u8>> {
    validate_stream_name(stream_name)?;

    let encoded_len = base64::encoded_len(payload.len(), true).unwrap_or(0);
    let mut line = Vec::with_capacity(stream_name.len() + encoded_len + 2);
    line.extend_from_slice(stream_name.as_bytes());
    line.push(SEPARATOR);
    line.extend_from_slice(STANDARD.encode(payload).as_bytes());
    line.push(LINE_TERMINATOR);
    Ok(line)
}

/// Size in bytes a record occupies on disk, terminator included
pub fn encoded_len(stream_name: &str, payload_len: usize) -> usize {
    stream_name.len() + 1 + base64::encoded_len(payload_len, true).unwrap_or(0) + 1
}

/// Decode one line, with or without its trailing newline
pub fn decode(line: &[u8]) -> std::result::Result<Record, DecodeError> {
    let line = line.strip_suffix(&[LINE_TERMINATOR]).unwrap_or(line);

    let split = line
        .iter()
        .rposition(|b| *b == SEPARATOR)
        .ok_or(DecodeError::MissingSeparator)?;
    let (name, encoded) = (&line[..split], &line[split + 1..]);

    let stream_name = std::str::from_utf8(name)
        .map_err(|_| DecodeError::InvalidStreamName)?
        .to_string();
    let payload = STANDARD
        .decode(encoded)
        .map_err(|e| DecodeError::InvalidPayload(e.to_string()))?;

    Ok(Record {
        stream_name,
        payload: Bytes::from(payload),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let line = encode("clicks", b"\x00\x01binary\xff").unwrap();
        let record = decode(&line).unwrap();
        assert_eq!(record.stream_name, "clicks");
        assert_eq!(&record.payload[..], b"\x00\x01binary\xff");
    }

    #[test]
    fn test_round_trip_empty_payload() {
        let line = encode("s", b"").unwrap();
        assert_eq!(line, b"s,\n");
        let record = decode(&line).unwrap();
        assert!(record.payload.is_empty());
    }

    #[test]
    fn test_stream_name_with_separator() {
        let line = encode("a,b", b"xyz").unwrap();
        let record = decode(&line).unwrap();
        assert_eq!(record.stream_name, "a,b");
        assert_eq!(&record.payload[..], b"xyz");
    }

    #[test]
    fn test_encoded_len_matches_encode() {
        for size in [0usize, 1, 2, 3, 4, 57, 100] {
            let payload = vec![7u8; size];
            let line = encode("stream", &payload).unwrap();
            assert_eq!(line.len(), encoded_len("stream", size));
        }
    }

    #[test]
    fn test_missing_separator() {
        assert_eq!(decode(b"garbage\n"), Err(DecodeError::MissingSeparator));
    }

    #[test]
    fn test_invalid_base64() {
        let result = decode(b"stream,not*base64!\n");
        assert!(matches!(result, Err(DecodeError::InvalidPayload(_))));
    }

    #[test]
    fn test_invalid_stream_names() {
        assert!(encode("", b"x").is_err());
        assert!(encode("two\nlines", b"x").is_err());
        assert!(encode("carriage\r", b"x").is_err());
    }
}
