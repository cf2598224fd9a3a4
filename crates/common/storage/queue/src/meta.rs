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

//! Durable control record holding the queue's head and tail.
//!
//! The control file keeps two fixed-size slots and writes them alternately,
//! so a crash in the middle of an update leaves the previous slot intact.
//! On load the valid slot with the highest generation wins.
//!
//! ## Slot Format (64 bytes, big-endian)
//!
//! ```text
//! ┌────────────────────────┬─────────────────────────────────────┐
//! │ magic: [u8; 4]         │ "BQMT"                              │
//! │ version: u32           │ Format version, currently 1         │
//! │ generation: u64        │ Incremented on every write          │
//! │ head: u64              │ Next sequence to dequeue            │
//! │ tail: u64              │ Next sequence to assign             │
//! │ data_page_size: u32    │ Creation-time option                │
//! │ items_per_page: u32    │ Creation-time option                │
//! │ active_data_page: u32  │ Page receiving appends              │
//! │ reserved: u32          │                                     │
//! │ write_offset: u64      │ Next free byte in the active page   │
//! │ checksum: u32          │ CRC32 of bytes [0, 56)              │
//! │ reserved: u32          │                                     │
//! └────────────────────────┴─────────────────────────────────────┘
//! ```

use std::{
    fs::{File, OpenOptions},
    io::{Seek, SeekFrom, Write},
    path::Path,
};

use bytes::{Buf, BufMut};
use tracing::{debug, warn};

use crate::{
    Result,
    crc::{checksum, verify_checksum},
    error::CorruptionSnafu,
};

/// Magic bytes identifying a control slot: "BQMT"
pub const META_MAGIC: [u8; 4] = *b"BQMT";

/// Current control record format version.
pub const META_VERSION: u32 = 1;

/// Size of one slot in bytes.
pub const META_SLOT_SIZE: usize = 64;

/// Bytes covered by the slot checksum.
const CHECKSUMMED_LEN: usize = 56;

/// Persisted queue state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetaRecord {
    /// Next sequence to dequeue.
    pub head:                 u64,
    /// Next sequence to assign.
    pub tail:                 u64,
    pub data_page_size:       u32,
    pub index_items_per_page: u32,
    /// Data page receiving appends.
    pub active_data_page:     u32,
    /// Next free byte inside the active data page.
    pub write_offset:         u64,
}

impl MetaRecord {
    fn encode(&self, generation: u64) -> [u8; META_SLOT_SIZE] {
        let mut buf = [0u8; META_SLOT_SIZE];
        {
            let mut out = &mut buf[..];
            out.put_slice(&META_MAGIC);
            out.put_u32(META_VERSION);
            out.put_u64(generation);
            out.put_u64(self.head);
            out.put_u64(self.tail);
            out.put_u32(self.data_page_size);
            out.put_u32(self.index_items_per_page);
            out.put_u32(self.active_data_page);
            out.put_u32(0);
            out.put_u64(self.write_offset);
        }

        let crc = checksum(&buf[..CHECKSUMMED_LEN]);
        buf[CHECKSUMMED_LEN..CHECKSUMMED_LEN + 4].copy_from_slice(&crc.to_be_bytes());
        buf
    }

    /// Decode one slot, returning `None` when it is torn, blank, or from an
    /// unknown format version.
    fn decode(slot: &[u8]) -> Option<(u64, Self)> {
        if slot.len() < META_SLOT_SIZE || slot[0..4] != META_MAGIC {
            return None;
        }

        let mut crc_bytes = &slot[CHECKSUMMED_LEN..CHECKSUMMED_LEN + 4];
        if !verify_checksum(&slot[..CHECKSUMMED_LEN], crc_bytes.get_u32()) {
            return None;
        }

        let mut cursor = &slot[4..CHECKSUMMED_LEN];
        if cursor.get_u32() != META_VERSION {
            return None;
        }
        let generation = cursor.get_u64();
        let head = cursor.get_u64();
        let tail = cursor.get_u64();
        let data_page_size = cursor.get_u32();
        let index_items_per_page = cursor.get_u32();
        let active_data_page = cursor.get_u32();
        let _reserved = cursor.get_u32();
        let write_offset = cursor.get_u64();

        Some((
            generation,
            Self {
                head,
                tail,
                data_page_size,
                index_items_per_page,
                active_data_page,
                write_offset,
            },
        ))
    }
}

/// Writer for the dual-slot control file.
pub struct MetaFile {
    file:       File,
    /// Generation of the most recent successful write.
    generation: u64,
}

impl MetaFile {
    /// Open or create the control file and load its latest valid record.
    ///
    /// Returns `None` for a file that has never been written. A file with
    /// content but no valid slot is reported as corruption.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<(Self, Option<MetaRecord>)> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let data = std::fs::read(&path)?;
        let latest = if data.is_empty() {
            None
        } else {
            let latest = data
                .chunks(META_SLOT_SIZE)
                .take(2)
                .enumerate()
                .filter_map(|(slot, bytes)| {
                    let decoded = MetaRecord::decode(bytes);
                    if decoded.is_none() {
                        warn!(slot, path = ?path, "Ignoring invalid control slot");
                    }
                    decoded
                })
                .max_by_key(|(generation, _)| *generation);

            match latest {
                Some(latest) => Some(latest),
                None => {
                    return CorruptionSnafu {
                        reason: format!("no valid slot in control file {}", path.display()),
                    }
                    .fail();
                }
            }
        };

        let generation = latest.map_or(0, |(generation, _)| generation);
        debug!(path = ?path, generation, "Loaded control file");

        Ok((
            Self { file, generation },
            latest.map(|(_, record)| record),
        ))
    }

    /// Persist `record` into the slot not holding the latest generation.
    ///
    /// With `sync` the slot is forced to disk before returning.
    pub fn write(&mut self, record: &MetaRecord, sync: bool) -> Result<()> {
        let generation = self.generation + 1;
        let slot = generation % 2;

        self.file
            .seek(SeekFrom::Start(slot * META_SLOT_SIZE as u64))?;
        self.file.write_all(&record.encode(generation))?;
        if sync {
            self.file.sync_data()?;
        }

        self.generation = generation;
        Ok(())
    }

    #[cfg(test)]
    fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    #[cfg(test)]
    const fn generation(&self) -> u64 { self.generation }
}
