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

// Forward-only reader over a record store snapshot

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};

use tracing::{debug, warn};

use crate::codec::{self, Record, LINE_TERMINATOR};
use crate::error::Result;
use crate::store::RecordStore;

enum Lookahead {
    /// Next decodable record and the file offset just past its line
    Record { record: Record, end: u64 },
    Exhausted,
}

/// Cursor over the records a store held when the cursor was created.
///
/// Lines that fail to decode are skipped: they advance the position and are
/// removed by `remove_read_records`, but are never returned.
///
/// Offsets are relative to the current head of the log file. When
/// `remove_read_records` compacts the file, every offset is shifted down by
/// the number of bytes removed. If the store was cleared or compacted by
/// someone else in the meantime, the offsets no longer describe the file:
/// the cursor removes nothing and ends.
pub struct RecordCursor<'a> {
    store: &'a RecordStore,
    // Store epoch the offsets belong to
    epoch: u64,
    reader: Option<BufReader<File>>,
    // End of the snapshot; later appends are not visible
    limit: u64,
    // Offset of the next unread line
    position: u64,
    // Offset up to which records were handed out by `next`
    consumed: u64,
    lookahead: Option<Lookahead>,
    line: Vec<u8>,
    skipped_lines: usize,
}

impl<'a> RecordCursor<'a> {
    pub(crate) fn new(store: &'a RecordStore, file: File, limit: u64, epoch: u64) -> Self {
        Self {
            store,
            epoch,
            reader: Some(BufReader::new(file)),
            limit,
            position: 0,
            consumed: 0,
            lookahead: None,
            line: Vec::new(),
            skipped_lines: 0,
        }
    }

    /// Next record without advancing. `None` at end of data.
    pub fn peek(&mut self) -> Result<Option<Record>> {
        self.fill()?;
        match &self.lookahead {
            Some(Lookahead::Record { record, .. }) => Ok(Some(record.clone())),
            _ => Ok(None),
        }
    }

    /// Next record, advancing past it. `None` at end of data, repeatedly.
    pub fn next(&mut self) -> Result<Option<Record>> {
        self.fill()?;
        match self.lookahead.take() {
            Some(Lookahead::Record { record, end }) => {
                self.consumed = end;
                Ok(Some(record))
            }
            _ => {
                self.lookahead = Some(Lookahead::Exhausted);
                Ok(None)
            }
        }
    }

    pub fn has_next(&mut self) -> Result<bool> {
        Ok(self.peek()?.is_some())
    }

    /// Delete everything returned by `next` (and skipped lines before it) from
    /// the head of the store. Returns the number of bytes removed.
    pub fn remove_read_records(&mut self) -> Result<u64> {
        if self.consumed == 0 {
            return Ok(0);
        }

        let consumed = self.consumed;
        let Some((removed, epoch)) = self.store.compact(consumed, self.epoch)? else {
            warn!(
                "Record store changed under the cursor, leaving {} read bytes in place",
                consumed
            );
            self.limit = 0;
            self.position = 0;
            self.consumed = 0;
            self.close();
            return Ok(0);
        };
        self.epoch = epoch;

        self.limit = self.limit.saturating_sub(consumed);
        self.position = self.position.saturating_sub(consumed);
        self.consumed = 0;
        if let Some(Lookahead::Record { end, .. }) = &mut self.lookahead {
            *end = end.saturating_sub(consumed);
        }

        // The log file was rewritten, so the old handle no longer matches it
        if self.reader.is_some() {
            let mut file = File::open(self.store.path())?;
            file.seek(SeekFrom::Start(self.position))?;
            self.reader = Some(BufReader::new(file));
        }

        debug!("Removed {} bytes of read records", removed);
        Ok(removed)
    }

    /// Release the file handle. Safe to call more than once.
    pub fn close(&mut self) {
        if self.reader.take().is_some() {
            debug!("Closed record cursor at offset {}", self.position);
        }
        self.lookahead = Some(Lookahead::Exhausted);
    }

    /// Bytes the next `remove_read_records` would delete
    pub fn consumed_bytes(&self) -> u64 {
        self.consumed
    }

    /// Number of undecodable lines passed over so far
    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    fn fill(&mut self) -> Result<()> {
        if self.lookahead.is_some() {
            return Ok(());
        }
        let Some(reader) = self.reader.as_mut() else {
            self.lookahead = Some(Lookahead::Exhausted);
            return Ok(());
        };

        loop {
            if self.position >= self.limit {
                // Only undecodable lines remain after the last record handed
                // out, so they are consumed as well
                self.consumed = self.position;
                self.lookahead = Some(Lookahead::Exhausted);
                return Ok(());
            }

            self.line.clear();
            let read = reader
                .by_ref()
                .take(self.limit - self.position)
                .read_until(LINE_TERMINATOR, &mut self.line)?;
            if read == 0 {
                // File shrank underneath us (delete_all)
                self.limit = self.position;
                continue;
            }
            self.position += read as u64;

            match codec::decode(&self.line) {
                Ok(record) => {
                    self.lookahead = Some(Lookahead::Record {
                        record,
                        end: self.position,
                    });
                    return Ok(());
                }
                Err(e) => {
                    self.skipped_lines += 1;
                    warn!(
                        "Skipping corrupt record ending at offset {}: {}",
                        self.position, e
                    );
                }
            }
        }
    }
}

impl Drop for RecordCursor<'_> {
    fn drop(&mut self) {
        self.close();
    }
}
