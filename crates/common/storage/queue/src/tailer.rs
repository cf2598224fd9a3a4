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

//! Pull-based cursor over the queue.
//!
//! The [`Tailer`] reads records in sequence order without consuming them:
//! - Sequential iteration via [`read_next`](Tailer::read_next) or the
//!   `Iterator` trait
//! - Repositioning via [`seek`](Tailer::seek)
//!
//! Every read goes through the queue's index, so a tailer never scans data
//! pages and never moves the head.

use crate::{Queue, QueueError, Result, message::Message};

/// A reader with its own position in the queue.
///
/// Multiple tailers can read the same queue concurrently. Tailers are not
/// shared between threads; create one per reader.
pub struct Tailer {
    queue:    Queue,
    /// Sequence of the next record to read.
    position: u64,
}

impl Tailer {
    pub(crate) const fn new(queue: Queue, position: u64) -> Self { Self { queue, position } }

    /// Read the record at the current position and advance past it.
    ///
    /// Returns `Ok(None)` when the position has caught up with the tail, and
    /// `NotFound` when the record was consumed before this tailer got to it.
    pub fn read_next(&mut self) -> Result<Option<Message>> {
        match self.queue.peek(self.position) {
            Ok(payload) => {
                let message = Message {
                    sequence: self.position,
                    payload,
                };
                self.position += 1;
                Ok(Some(message))
            }
            Err(QueueError::Empty) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Move to `sequence`. The next read returns that record.
    pub const fn seek(&mut self, sequence: u64) { self.position = sequence; }

    /// Move to the current head of the queue.
    pub fn seek_to_head(&mut self) { self.position = self.queue.head(); }

    pub const fn position(&self) -> u64 { self.position }

    pub const fn queue(&self) -> &Queue { &self.queue }
}

impl Iterator for Tailer {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> { self.read_next().transpose() }
}
