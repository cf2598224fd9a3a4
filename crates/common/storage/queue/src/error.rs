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

use std::io;

use snafu::Snafu;

/// Queue operation errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum QueueError {
    /// Filesystem I/O failure.
    #[snafu(display("IO error: {source}"), context(false))]
    Io { source: io::Error },

    /// Memory mapping operation failed.
    #[snafu(display("Mmap operation failed: {message}"))]
    Mmap {
        message: String,
        #[snafu(implicit)]
        loc:     snafu::Location,
    },

    /// A buffer was too small to hold a fixed-width integer.
    #[snafu(display("Encoding error: need {expected} bytes, got {actual}"))]
    Encoding {
        expected: usize,
        actual:   usize,
        #[snafu(implicit)]
        loc:      snafu::Location,
    },

    /// On-disk data disagrees with the index or is missing.
    #[snafu(display("Corrupted queue data: {reason}"))]
    Corruption {
        reason: String,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// An index entry arrived out of order.
    #[snafu(display("Index consistency violated: expected sequence {expected}, got {actual}"))]
    IndexConsistency {
        expected: u64,
        actual:   u64,
        #[snafu(implicit)]
        loc:      snafu::Location,
    },

    /// Sequence lies outside the live range of the queue.
    #[snafu(display("Sequence {sequence} not found (live range {head}..{tail})"))]
    NotFound {
        sequence: u64,
        head:     u64,
        tail:     u64,
        #[snafu(implicit)]
        loc:      snafu::Location,
    },

    /// Record does not fit into a single data page.
    #[snafu(display("Record of {size} bytes exceeds the maximum of {max} bytes"))]
    RecordTooLarge {
        size: usize,
        max:  usize,
        #[snafu(implicit)]
        loc:  snafu::Location,
    },

    /// No record available at the requested position.
    #[snafu(display("Queue is empty"))]
    Empty,

    /// Operation attempted after close.
    #[snafu(display("Queue is closed"))]
    QueueClosed,

    /// Options rejected before touching disk.
    #[snafu(display("Invalid queue options: {reason}"))]
    InvalidOptions {
        reason: String,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// Options differ from the ones the queue was created with.
    #[snafu(display(
        "Queue options mismatch: stored (page size {stored_page_size}, items per page \
         {stored_items_per_page}), requested (page size {page_size}, items per page \
         {items_per_page})"
    ))]
    OptionsMismatch {
        stored_page_size:      u32,
        stored_items_per_page: u32,
        page_size:             u32,
        items_per_page:        u32,
    },

    /// A subscription callback panicked while handling a record.
    #[snafu(display("Subscriber callback panicked at sequence {sequence}"))]
    CallbackPanicked { sequence: u64 },

    /// Unexpected internal failure.
    #[snafu(display("Internal error: {message}"))]
    Internal {
        message: String,
        #[snafu(implicit)]
        loc:     snafu::Location,
    },
}

impl QueueError {
    /// Whether the error only signals that nothing is available yet.
    #[must_use]
    pub const fn is_empty(&self) -> bool { matches!(self, Self::Empty) }
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
