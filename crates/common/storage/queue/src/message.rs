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

//! Record types and on-disk record format.
//!
//! Records are stored back to back inside a data page:
//!
//! ```text
//! ┌─────────────────┬──────────────────────┐
//! │  Length (4B)    │   Payload (variable) │
//! │  big-endian i32 │   raw bytes          │
//! └─────────────────┴──────────────────────┘
//! ```
//!
//! A record never spans two pages. Its position is found through the index,
//! so the data page itself carries no sequence numbers; the length prefix is
//! cross-checked against the index entry on every read.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{I32_SIZE, encode_i32};

/// A record read from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Sequence assigned at enqueue time. Sequences are contiguous and never
    /// reused.
    pub sequence: u64,

    /// The record payload.
    pub payload: Bytes,
}

/// Size of the length prefix in front of every payload.
pub const RECORD_HEADER_SIZE: usize = I32_SIZE;

/// On-disk size of a record with a payload of `payload_len` bytes.
#[inline]
pub(crate) const fn record_disk_size(payload_len: usize) -> usize {
    RECORD_HEADER_SIZE + payload_len
}

/// Encodes `[length][payload]` into one contiguous buffer.
///
/// `length` is the already validated payload length.
pub(crate) fn encode_record(length: i32, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(RECORD_HEADER_SIZE + payload.len());
    buf.put_slice(&encode_i32(length));
    buf.put_slice(payload);
    buf.freeze()
}
