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

// Record sender module
//
// Provides a trait-based abstraction over the sinks buffered records are
// drained to (ReductStore, local filesystem). A sender reports which
// payloads of a batch were refused so the recorder can retry just those.

pub mod backend;
pub mod factory;
pub mod filesystem;
pub mod reductstore;

pub use backend::{stream_to_entry_name, RecordSender};
pub use factory::SenderFactory;
pub use filesystem::FilesystemSender;
pub use reductstore::{HttpStatusError, ReductStoreSender};
