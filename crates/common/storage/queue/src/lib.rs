// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Persistent disk-backed FIFO queue.
//!
//! Records are appended to fixed-size memory-mapped data pages and located
//! through a dense index of fixed-width entries, so any live sequence is
//! found in O(1). A small dual-slot control file records head and tail for
//! fast recovery.
//!
//! ```text
//! dir/name_<id>.dat   data pages    [len i32][payload] ...
//! dir/name_<id>.idx   index pages   [seq i64][page i32][offset i32][len i32] ...
//! dir/name.meta       control file  two checksummed slots
//! ```

pub mod builder;
pub mod codec;
pub mod config;
mod crc;
pub mod error;
pub mod index;
pub mod message;
pub mod meta;
pub mod page;
pub mod path;
mod queue;
pub mod recovery;
pub mod subscriber;
pub mod tailer;

pub use builder::QueueBuilder;
pub use config::{FlushMode, QueueConfig, QueueOptions};
pub use error::{QueueError, Result};
pub use message::Message;
pub use queue::{Queue, QueueStatus, ReclaimStats};
pub use subscriber::Subscription;
pub use tailer::Tailer;
