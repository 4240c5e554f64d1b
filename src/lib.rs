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

// Offline record buffer
//
// Accumulates small binary records on disk while a sink is unreachable and
// delivers them later:
// - Appends records from many producer threads to a size-capped log file
// - Groups consecutive records of one stream into bounded batches
// - Retries only the records a sink refused, then checkpoints the log
// - Keeps records on transient failures, drops them on permanent rejection
// - Ships batches to ReductStore or the local filesystem

pub mod batch;
pub mod codec;
pub mod config;
pub mod cursor;
pub mod error;
pub mod flush;
pub mod recorder;
pub mod sender;
pub mod store;

// Re-export main types
pub use batch::{next_batch, Batch};
pub use codec::Record;
pub use config::{load_config, load_config_with_env, RecorderConfig};
pub use cursor::RecordCursor;
pub use error::RecorderError;
pub use flush::FlushWorker;
pub use recorder::{DrainReport, Recorder};
pub use sender::{stream_to_entry_name, RecordSender, SenderFactory};
pub use store::RecordStore;
