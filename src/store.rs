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

// Size-bounded, append-only record log
//
// The store owns a single log file. Producers append encoded lines from any
// thread; a drain reads them back through a `RecordCursor` and removes the
// delivered prefix with `RecordCursor::remove_read_records`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, error, info, warn};

use crate::codec::{self, LINE_TERMINATOR};
use crate::cursor::RecordCursor;
use crate::error::{RecorderError, Result};

/// Append handle and running size, always updated together
pub(crate) struct StoreState {
    file: File,
    size: u64,
    // Bumped whenever byte offsets into the file stop meaning what they meant
    // (compaction, delete_all). Cursors from an older epoch cannot compact.
    epoch: u64,
    // The file ends in a fragment of a failed append that could not be cut off
    torn: bool,
}

impl StoreState {
    /// Cut the file back to `boundary` after a failed append.
    ///
    /// If truncation fails too, the fragment stays and the next append starts
    /// with a line terminator so the fragment decodes as its own corrupt line.
    fn recover_from_failed_append(&mut self, boundary: u64) {
        match self.file.set_len(boundary) {
            Ok(()) => self.size = boundary,
            Err(e) => {
                error!("Failed to cut off partial record: {}", e);
                let on_disk = self.file.metadata().map(|m| m.len()).unwrap_or(boundary);
                if on_disk != boundary {
                    self.size = on_disk;
                    self.torn = true;
                }
            }
        }
    }
}

/// Disk-backed record log with a hard size cap
pub struct RecordStore {
    path: PathBuf,
    max_storage_size: u64,
    state: Mutex<StoreState>,
    poison_reported: AtomicBool,
}

impl RecordStore {
    /// Open (or create) `directory/file_name`
    ///
    /// Records written by an earlier process are kept. A trailing line without
    /// a terminator is the remains of an interrupted append and is truncated.
    pub fn open<P: AsRef<Path>>(
        directory: P,
        file_name: &str,
        max_storage_size: u64,
    ) -> Result<Self> {
        let directory = directory.as_ref();
        if !directory.exists() {
            info!("Creating record store directory: {}", directory.display());
            fs::create_dir_all(directory)?;
        }

        let path = directory.join(file_name);
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;

        let mut size = file.metadata()?.len();
        if size > 0 {
            let clean_len = clean_length(&mut file, size)?;
            if clean_len < size {
                warn!(
                    "Truncating {} bytes of partial record at end of {}",
                    size - clean_len,
                    path.display()
                );
                file.set_len(clean_len)?;
                size = clean_len;
            }
        }

        if size > max_storage_size {
            warn!(
                "Record store {} holds {} bytes, above the {} byte limit; new records are dropped until it drains",
                path.display(),
                size,
                max_storage_size
            );
        }

        info!(
            "Opened record store {} ({} bytes used, limit {} bytes)",
            path.display(),
            size,
            max_storage_size
        );

        Ok(Self {
            path,
            max_storage_size,
            state: Mutex::new(StoreState {
                file,
                size,
                epoch: 0,
                torn: false,
            }),
            poison_reported: AtomicBool::new(false),
        })
    }

    /// Append a record
    ///
    /// Returns `Ok(false)` without touching the file when the encoded line
    /// would push the store past its size limit.
    pub fn put(&self, payload: &[u8], stream_name: &str) -> Result<bool> {
        let line = codec::encode(stream_name, payload)?;
        let line_len = line.len() as u64;

        let mut state = self.lock()?;
        let terminator_len = u64::from(state.torn);
        if state.size + terminator_len + line_len > self.max_storage_size {
            warn!(
                "Record store full ({} of {} bytes), dropping {} byte record for stream '{}'",
                state.size, self.max_storage_size, line_len, stream_name
            );
            return Ok(false);
        }

        let boundary = state.size;
        let written = if state.torn {
            let mut bytes = Vec::with_capacity(line.len() + 1);
            bytes.push(LINE_TERMINATOR);
            bytes.extend_from_slice(&line);
            state.file.write_all(&bytes)
        } else {
            state.file.write_all(&line)
        };
        if let Err(e) = written.and_then(|_| state.file.flush()) {
            // A short write may have left part of the line behind
            state.recover_from_failed_append(boundary);
            return Err(e.into());
        }
        state.size += terminator_len + line_len;
        state.torn = false;

        Ok(true)
    }

    /// Open a cursor over the records currently in the store
    ///
    /// Several cursors may read at once, but only one of them should remove
    /// records. Once a cursor compacts the log, or `delete_all` runs, the
    /// other cursors' offsets are stale and their `remove_read_records`
    /// removes nothing.
    pub fn iterator(&self) -> Result<RecordCursor<'_>> {
        let state = self.lock()?;
        let reader = File::open(&self.path)?;
        Ok(RecordCursor::new(self, reader, state.size, state.epoch))
    }

    /// Remove every record
    pub fn delete_all(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.file.set_len(0)?;
        let deleted = state.size;
        state.epoch += 1;
        state.size = 0;
        state.torn = false;
        state.file.sync_all()?;
        info!(
            "Deleted all records from {} ({} bytes)",
            self.path.display(),
            deleted
        );
        Ok(())
    }

    /// Bytes currently on disk
    pub fn size_bytes(&self) -> u64 {
        match self.state.lock() {
            Ok(state) => state.size,
            Err(poisoned) => {
                self.report_poisoned();
                poisoned.into_inner().size
            }
        }
    }

    pub fn max_storage_size(&self) -> u64 {
        self.max_storage_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop the first `consumed` bytes and keep the rest, including anything
    /// appended after a cursor took its snapshot.
    ///
    /// `epoch` is the epoch the offsets were taken in. Returns `None` without
    /// touching the file when it is stale, otherwise the number of bytes
    /// removed and the epoch the remaining bytes now belong to.
    pub(crate) fn compact(&self, consumed: u64, epoch: u64) -> Result<Option<(u64, u64)>> {
        let mut state = self.lock()?;
        if epoch != state.epoch {
            return Ok(None);
        }
        let consumed = consumed.min(state.size);
        if consumed == 0 {
            return Ok(Some((0, state.epoch)));
        }

        if consumed == state.size {
            state.file.set_len(0)?;
            state.epoch += 1;
            state.size = 0;
            state.torn = false;
            state.file.sync_all()?;
            debug!("Compacted {}: removed all {} bytes", self.path.display(), consumed);
            return Ok(Some((consumed, state.epoch)));
        }

        let tmp_path = compaction_path(&self.path);
        {
            let mut source = File::open(&self.path)?;
            source.seek(SeekFrom::Start(consumed))?;
            let mut tmp = File::create(&tmp_path)?;
            io::copy(&mut source, &mut tmp)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.path)?;
        state.epoch += 1;
        state.size = file.metadata()?.len();
        state.file = file;
        let size = state.size;

        debug!(
            "Compacted {}: removed {} bytes, {} bytes remain",
            self.path.display(),
            consumed,
            size
        );
        Ok(Some((consumed, state.epoch)))
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>> {
        self.state.lock().map_err(|_| {
            self.report_poisoned();
            RecorderError::LockPoisoned
        })
    }

    fn report_poisoned(&self) {
        if !self.poison_reported.swap(true, Ordering::Relaxed) {
            error!(
                "Record store lock for {} poisoned by a panicking writer",
                self.path.display()
            );
        }
    }
}

fn compaction_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".compact");
    path.with_file_name(name)
}

/// Length of the file up to and including its last line terminator
fn clean_length(file: &mut File, size: u64) -> io::Result<u64> {
    const CHUNK: u64 = 4096;

    let mut end = size;
    let mut buf = vec![0u8; CHUNK as usize];
    while end > 0 {
        let start = end.saturating_sub(CHUNK);
        let len = (end - start) as usize;
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut buf[..len])?;
        if let Some(pos) = buf[..len].iter().rposition(|b| *b == LINE_TERMINATOR) {
            return Ok(start + pos as u64 + 1);
        }
        end = start;
    }
    Ok(0)
}
