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

//! Dense sequence index mapping every record to its data page location.
//!
//! ## Purpose
//!
//! Every record gets exactly one index entry, so finding sequence `s` is
//! pure arithmetic: with `n` entries per index page the entry lives in page
//! `s / n` at slot `s % n`. No search and no scan of the data page is
//! needed.
//!
//! ## Index Page Format
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   Entries (20B each, no header)               │
//! ├───────────────┬──────────────┬──────────────┬────────────────┤
//! │ sequence (8B) │ page_id (4B) │ offset (4B)  │ length (4B)    │
//! ├───────────────┼──────────────┼──────────────┼────────────────┤
//! │ sequence (8B) │ page_id (4B) │ offset (4B)  │ length (4B)    │
//! └───────────────┴──────────────┴──────────────┴────────────────┘
//! ```
//!
//! All fields are big-endian signed integers. Index page `p` holds the
//! sequences `[p * n, (p + 1) * n)`. The file grows by one entry per
//! enqueue, so its length tells how many entries were durably written; a
//! trailing partial entry is ignored and later overwritten.

use std::{
    collections::{HashMap, hash_map::Entry},
    fs::{File, OpenOptions},
    io::{ErrorKind, Read, Seek, SeekFrom, Write},
    path::PathBuf,
};

use parking_lot::Mutex;
use snafu::ensure;
use tracing::{debug, warn};

use crate::{
    Result,
    codec::{I32_SIZE, I64_SIZE, decode_i32, decode_i64, put_i32, put_i64},
    error::{CorruptionSnafu, IndexConsistencySnafu, InternalSnafu},
    path::index_page_path,
};

/// Upper bound on index page handles kept open by an [`IndexReader`].
const MAX_CACHED_PAGES: usize = 8;

/// Size of each index entry in bytes (sequence 8 + page 4 + offset 4 + length
/// 4).
pub const INDEX_ENTRY_SIZE: usize = I64_SIZE + 3 * I32_SIZE;

/// Location of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Sequence of the record.
    pub sequence: u64,
    /// Data page holding the record.
    pub page_id:  u32,
    /// Byte offset of the record header inside the data page.
    pub offset:   u64,
    /// Payload length, excluding the header.
    pub length:   u32,
}

impl IndexEntry {
    /// Byte offset just past the record in its data page.
    #[must_use]
    pub const fn end_offset(&self) -> u64 {
        self.offset + crate::message::RECORD_HEADER_SIZE as u64 + self.length as u64
    }

    pub fn encode(&self) -> Result<[u8; INDEX_ENTRY_SIZE]> {
        let sequence = to_i64(self.sequence, "sequence")?;
        let page_id = to_i32(u64::from(self.page_id), "page id")?;
        let offset = to_i32(self.offset, "offset")?;
        let length = to_i32(u64::from(self.length), "length")?;

        let mut buf = [0u8; INDEX_ENTRY_SIZE];
        put_i64(&mut buf[0..8], sequence)?;
        put_i32(&mut buf[8..12], page_id)?;
        put_i32(&mut buf[12..16], offset)?;
        put_i32(&mut buf[16..20], length)?;
        Ok(buf)
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let sequence = decode_i64(buf)?;
        let page_id = decode_i32(buf.get(8..).unwrap_or_default())?;
        let offset = decode_i32(buf.get(12..).unwrap_or_default())?;
        let length = decode_i32(buf.get(16..).unwrap_or_default())?;

        let corrupt = || {
            CorruptionSnafu {
                reason: format!(
                    "negative field in index entry (sequence {sequence}, page {page_id}, offset \
                     {offset}, length {length})"
                ),
            }
            .build()
        };

        Ok(Self {
            sequence: u64::try_from(sequence).map_err(|_| corrupt())?,
            page_id:  u32::try_from(page_id).map_err(|_| corrupt())?,
            offset:   u64::try_from(offset).map_err(|_| corrupt())?,
            length:   u32::try_from(length).map_err(|_| corrupt())?,
        })
    }
}

fn to_i64(value: u64, field: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| {
        InternalSnafu {
            message: format!("index {field} {value} does not fit i64"),
        }
        .build()
    })
}

fn to_i32(value: u64, field: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| {
        InternalSnafu {
            message: format!("index {field} {value} does not fit i32"),
        }
        .build()
    })
}

/// Where the index pages of one queue live and how sequences map onto them.
#[derive(Debug, Clone)]
pub struct IndexLayout {
    dir:            PathBuf,
    name:           String,
    items_per_page: u32,
}

impl IndexLayout {
    pub fn new<P: Into<PathBuf>>(dir: P, name: impl Into<String>, items_per_page: u32) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
            items_per_page,
        }
    }

    pub const fn items_per_page(&self) -> u32 { self.items_per_page }

    pub fn page_path(&self, page_id: u32) -> PathBuf {
        index_page_path(&self.dir, &self.name, page_id)
    }

    /// Index page holding `sequence`.
    pub fn page_of(&self, sequence: u64) -> Result<u32> {
        let page = sequence / u64::from(self.items_per_page);
        u32::try_from(page).map_err(|_| {
            InternalSnafu {
                message: format!("sequence {sequence} maps beyond the last index page"),
            }
            .build()
        })
    }

    /// Slot of `sequence` inside its index page.
    pub const fn slot_of(&self, sequence: u64) -> u64 { sequence % self.items_per_page as u64 }

    /// First sequence stored in `page_id`.
    pub const fn first_sequence(&self, page_id: u32) -> u64 {
        page_id as u64 * self.items_per_page as u64
    }
}

/// Lookups against the index pages.
///
/// Open page handles are cached, so steady-state lookups cost one seek and
/// one read. Handles see entries appended after they were opened.
#[derive(Debug)]
pub struct IndexReader {
    layout: IndexLayout,
    pages:  Mutex<HashMap<u32, File>>,
}

impl IndexReader {
    pub fn new(layout: IndexLayout) -> Self {
        Self {
            layout,
            pages: Mutex::new(HashMap::new()),
        }
    }

    pub const fn layout(&self) -> &IndexLayout { &self.layout }

    /// Read the entry of `sequence`.
    ///
    /// The logical range check belongs to the caller; this only reports
    /// missing or inconsistent pages as corruption.
    pub fn lookup(&self, sequence: u64) -> Result<IndexEntry> {
        let page_id = self.layout.page_of(sequence)?;
        let position = self.layout.slot_of(sequence) * INDEX_ENTRY_SIZE as u64;
        let mut buf = [0u8; INDEX_ENTRY_SIZE];

        {
            let mut pages = self.pages.lock();
            if !pages.contains_key(&page_id)
                && pages.len() >= MAX_CACHED_PAGES
                && let Some(&oldest) = pages.keys().min()
            {
                pages.remove(&oldest);
            }
            let file = match pages.entry(page_id) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(self.open_page(page_id, sequence)?),
            };

            file.seek(SeekFrom::Start(position))?;
            if let Err(e) = file.read_exact(&mut buf) {
                if e.kind() == ErrorKind::UnexpectedEof {
                    return CorruptionSnafu {
                        reason: format!(
                            "index page {page_id} is too short for sequence {sequence}"
                        ),
                    }
                    .fail();
                }
                return Err(e.into());
            }
        }

        let entry = IndexEntry::decode(&buf)?;
        ensure!(
            entry.sequence == sequence,
            CorruptionSnafu {
                reason: format!(
                    "index slot for sequence {sequence} holds sequence {}",
                    entry.sequence
                ),
            }
        );
        Ok(entry)
    }

    fn open_page(&self, page_id: u32, sequence: u64) -> Result<File> {
        match File::open(self.layout.page_path(page_id)) {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == ErrorKind::NotFound => CorruptionSnafu {
                reason: format!("index page {page_id} for sequence {sequence} is missing"),
            }
            .fail(),
            Err(e) => Err(e.into()),
        }
    }

    /// Every complete, consistent entry of `page_id`, in slot order.
    ///
    /// Stops at the first entry whose sequence does not match its slot and
    /// ignores trailing partial bytes.
    pub fn scan_page(&self, page_id: u32) -> Result<Vec<IndexEntry>> {
        let path = self.layout.page_path(page_id);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        if data.len() % INDEX_ENTRY_SIZE != 0 {
            warn!(
                page_id,
                len = data.len(),
                "Index page ends with a partial entry, ignoring it"
            );
        }

        let first = self.layout.first_sequence(page_id);
        let mut entries = Vec::with_capacity(data.len() / INDEX_ENTRY_SIZE);

        for (slot, chunk) in data
            .chunks_exact(INDEX_ENTRY_SIZE)
            .take(self.layout.items_per_page as usize)
            .enumerate()
        {
            let expected = first + slot as u64;
            match IndexEntry::decode(chunk) {
                Ok(entry) if entry.sequence == expected => entries.push(entry),
                _ => {
                    warn!(
                        page_id,
                        slot, expected, "Inconsistent index entry, stopping page scan"
                    );
                    break;
                }
            }
        }

        Ok(entries)
    }

    /// Delete index page `page_id`. Returns whether a file was removed.
    pub fn remove_page(&self, page_id: u32) -> Result<bool> {
        self.pages.lock().remove(&page_id);
        let path = self.layout.page_path(page_id);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = ?path, page_id, "Removed index page");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Close every cached page handle.
    pub fn clear(&self) { self.pages.lock().clear(); }
}

/// Appends entries to the active index page.
///
/// Entries are written at their slot position rather than at the end of the
/// file, so a torn or rewound entry is simply overwritten by the next append.
pub struct IndexWriter {
    layout:        IndexLayout,
    /// Index page currently receiving appends.
    page_id:       u32,
    file:          File,
    /// The only sequence `append` will accept next.
    next_sequence: u64,
}

impl IndexWriter {
    /// Open the index for appending `next_sequence`.
    ///
    /// The page of `next_sequence` is truncated to its slot, dropping any
    /// entries that were written but never committed.
    pub fn open(layout: IndexLayout, next_sequence: u64) -> Result<Self> {
        let page_id = layout.page_of(next_sequence)?;
        let slot_position = layout.slot_of(next_sequence) * INDEX_ENTRY_SIZE as u64;
        let path = layout.page_path(page_id);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let len = file.metadata()?.len();
        ensure!(
            len >= slot_position,
            CorruptionSnafu {
                reason: format!(
                    "index page {page_id} holds {len} bytes, sequence {next_sequence} needs {} \
                     before it",
                    slot_position
                ),
            }
        );
        if len > slot_position {
            warn!(
                page_id,
                dropped_bytes = len - slot_position,
                "Truncating uncommitted index entries"
            );
            file.set_len(slot_position)?;
        }

        Ok(Self {
            layout,
            page_id,
            file,
            next_sequence,
        })
    }

    /// Append the entry for the next sequence, rolling to a new index page
    /// when the current one is full.
    pub fn append(&mut self, entry: &IndexEntry) -> Result<()> {
        ensure!(
            entry.sequence == self.next_sequence,
            IndexConsistencySnafu {
                expected: self.next_sequence,
                actual:   entry.sequence,
            }
        );

        let page_id = self.layout.page_of(entry.sequence)?;
        if page_id != self.page_id {
            self.roll(page_id)?;
        }

        let buf = entry.encode()?;
        let position = self.layout.slot_of(entry.sequence) * INDEX_ENTRY_SIZE as u64;
        self.file.seek(SeekFrom::Start(position))?;
        self.file.write_all(&buf)?;

        self.next_sequence += 1;
        Ok(())
    }

    /// Append `entry`, optionally sync it, then run `commit`.
    ///
    /// When the sync or `commit` fails the entry is rewound, so the next
    /// append reuses its sequence and slot.
    pub fn append_with<F>(&mut self, entry: &IndexEntry, sync: bool, commit: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        self.append(entry)?;

        let synced = if sync { self.sync() } else { Ok(()) };
        if let Err(e) = synced.and_then(|()| commit()) {
            if let Err(rewind) = self.rewind(entry.sequence) {
                warn!(
                    sequence = entry.sequence,
                    error = %rewind,
                    "Failed to rewind index after a failed append"
                );
            }
            return Err(e);
        }
        Ok(())
    }

    /// Forget the entries from `sequence` on, which must lie in the current
    /// page.
    pub fn rewind(&mut self, sequence: u64) -> Result<()> {
        ensure!(
            sequence <= self.next_sequence && self.layout.page_of(sequence)? == self.page_id,
            InternalSnafu {
                message: format!(
                    "cannot rewind index from {} to {sequence} outside page {}",
                    self.next_sequence, self.page_id
                ),
            }
        );

        self.file
            .set_len(self.layout.slot_of(sequence) * INDEX_ENTRY_SIZE as u64)?;
        self.next_sequence = sequence;
        Ok(())
    }

    /// Force appended entries to disk.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    pub const fn next_sequence(&self) -> u64 { self.next_sequence }

    pub const fn page_id(&self) -> u32 { self.page_id }

    fn roll(&mut self, page_id: u32) -> Result<()> {
        self.file.sync_data()?;

        let path = self.layout.page_path(page_id);
        self.file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        debug!(from = self.page_id, to = page_id, "Rolled to new index page");
        self.page_id = page_id;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use test_case::test_case;

    use super::*;
    use crate::QueueError;

    fn entry(sequence: u64) -> IndexEntry {
        IndexEntry {
            sequence,
            page_id: (sequence / 10) as u32,
            offset: (sequence % 10) * 32,
            length: 28,
        }
    }

    fn layout(temp_dir: &TempDir, items_per_page: u32) -> IndexLayout {
        IndexLayout::new(temp_dir.path(), "q", items_per_page)
    }

    #[test]
    fn test_entry_encoding_is_fixed_width_big_endian() {
        let bytes = IndexEntry {
            sequence: 1,
            page_id:  2,
            offset:   3,
            length:   4,
        }
        .encode()
        .unwrap();

        assert_eq!(bytes.len(), 20);
        assert_eq!(&bytes[0..8], &[0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(&bytes[8..12], &[0, 0, 0, 2]);
        assert_eq!(&bytes[12..16], &[0, 0, 0, 3]);
        assert_eq!(&bytes[16..20], &[0, 0, 0, 4]);
    }

    #[test]
    fn test_entry_decode_rejects_negative_fields() {
        let mut bytes = entry(5).encode().unwrap();
        bytes[16..20].copy_from_slice(&(-1i32).to_be_bytes());
        assert!(matches!(
            IndexEntry::decode(&bytes),
            Err(QueueError::Corruption { .. })
        ));
    }

    #[test]
    fn test_entry_decode_short_buffer() {
        assert!(matches!(
            IndexEntry::decode(&[0u8; 12]),
            Err(QueueError::Encoding { .. })
        ));
    }

    #[test_case(0, 0, 0 ; "first sequence")]
    #[test_case(9, 2, 1 ; "last slot of page")]
    #[test_case(12, 3, 0 ; "first slot of next page")]
    fn test_layout_mapping(sequence: u64, expected_page: u32, expected_slot: u64) {
        let temp_dir = TempDir::new().unwrap();
        let layout = layout(&temp_dir, 4);
        assert_eq!(layout.page_of(sequence).unwrap(), expected_page);
        assert_eq!(layout.slot_of(sequence), expected_slot);
    }

    #[test]
    fn test_append_and_lookup_across_pages() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = IndexWriter::open(layout(&temp_dir, 4), 0).unwrap();

        for seq in 0..10 {
            writer.append(&entry(seq)).unwrap();
        }
        writer.sync().unwrap();

        assert_eq!(writer.page_id(), 2);
        assert!(temp_dir.path().join("q_0.idx").exists());
        assert!(temp_dir.path().join("q_2.idx").exists());

        let reader = IndexReader::new(layout(&temp_dir, 4));
        for seq in 0..10 {
            assert_eq!(reader.lookup(seq).unwrap(), entry(seq));
        }
    }

    #[test_case(2 ; "gap")]
    #[test_case(0 ; "repeat")]
    fn test_append_out_of_order(wrong_sequence: u64) {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = IndexWriter::open(layout(&temp_dir, 4), 0).unwrap();
        writer.append(&entry(0)).unwrap();

        assert!(matches!(
            writer.append(&entry(wrong_sequence)),
            Err(QueueError::IndexConsistency { expected: 1, .. })
        ));
    }

    #[test]
    fn test_lookup_missing_and_short_pages() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = IndexWriter::open(layout(&temp_dir, 4), 0).unwrap();
        writer.append(&entry(0)).unwrap();

        let reader = IndexReader::new(layout(&temp_dir, 4));
        assert!(matches!(
            reader.lookup(1),
            Err(QueueError::Corruption { .. })
        ));
        assert!(matches!(
            reader.lookup(9),
            Err(QueueError::Corruption { .. })
        ));
    }

    #[test]
    fn test_rewind_drops_last_entry() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = IndexWriter::open(layout(&temp_dir, 4), 0).unwrap();
        writer.append(&entry(0)).unwrap();
        writer.append(&entry(1)).unwrap();

        writer.rewind(1).unwrap();
        assert_eq!(writer.next_sequence(), 1);

        let reader = IndexReader::new(layout(&temp_dir, 4));
        assert!(reader.lookup(1).is_err());

        writer.append(&entry(1)).unwrap();
        assert_eq!(reader.lookup(1).unwrap(), entry(1));
    }

    #[test]
    fn test_reopen_truncates_uncommitted_entries() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut writer = IndexWriter::open(layout(&temp_dir, 8), 0).unwrap();
            for seq in 0..5 {
                writer.append(&entry(seq)).unwrap();
            }
        }

        let writer = IndexWriter::open(layout(&temp_dir, 8), 3).unwrap();
        assert_eq!(writer.next_sequence(), 3);

        let reader = IndexReader::new(layout(&temp_dir, 8));
        assert_eq!(reader.scan_page(0).unwrap().len(), 3);
    }

    #[test]
    fn test_reopen_with_missing_entries_is_corruption() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            IndexWriter::open(layout(&temp_dir, 8), 3),
            Err(QueueError::Corruption { .. })
        ));
    }

    #[test]
    fn test_scan_page_ignores_partial_tail() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut writer = IndexWriter::open(layout(&temp_dir, 8), 0).unwrap();
            for seq in 0..3 {
                writer.append(&entry(seq)).unwrap();
            }
        }

        let path = temp_dir.path().join("q_0.idx");
        let mut data = std::fs::read(&path).unwrap();
        data.extend_from_slice(&[1, 2, 3]);
        std::fs::write(&path, data).unwrap();

        let reader = IndexReader::new(layout(&temp_dir, 8));
        let entries = reader.scan_page(0).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2], entry(2));
    }

    #[test]
    fn test_remove_page() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = IndexWriter::open(layout(&temp_dir, 2), 0).unwrap();
        for seq in 0..3 {
            writer.append(&entry(seq)).unwrap();
        }

        let reader = IndexReader::new(layout(&temp_dir, 2));
        assert_eq!(reader.lookup(0).unwrap(), entry(0));
        assert!(reader.remove_page(0).unwrap());
        assert!(!reader.remove_page(0).unwrap());
        assert!(reader.scan_page(0).unwrap().is_empty());
        assert!(matches!(
            reader.lookup(0),
            Err(QueueError::Corruption { .. })
        ));
        assert_eq!(reader.lookup(2).unwrap(), entry(2));
    }

    #[test]
    fn test_cached_page_sees_later_appends() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = IndexWriter::open(layout(&temp_dir, 8), 0).unwrap();
        let reader = IndexReader::new(layout(&temp_dir, 8));

        writer.append(&entry(0)).unwrap();
        assert_eq!(reader.lookup(0).unwrap(), entry(0));
        assert!(reader.lookup(1).is_err());

        writer.append(&entry(1)).unwrap();
        assert_eq!(reader.lookup(1).unwrap(), entry(1));
    }

    #[test]
    fn test_lookup_beyond_cache_capacity() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = IndexWriter::open(layout(&temp_dir, 1), 0).unwrap();
        for seq in 0..(MAX_CACHED_PAGES as u64 + 4) {
            writer.append(&entry(seq)).unwrap();
        }

        let reader = IndexReader::new(layout(&temp_dir, 1));
        for _ in 0..2 {
            for seq in 0..(MAX_CACHED_PAGES as u64 + 4) {
                assert_eq!(reader.lookup(seq).unwrap(), entry(seq));
            }
        }
        assert!(reader.pages.lock().len() <= MAX_CACHED_PAGES);
    }

    #[test]
    fn test_failed_commit_rewinds_entry() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = IndexWriter::open(layout(&temp_dir, 4), 0).unwrap();
        writer.append_with(&entry(0), true, || Ok(())).unwrap();

        let result = writer.append_with(&entry(1), true, || {
            InternalSnafu {
                message: "control write failed".to_string(),
            }
            .fail()
        });
        assert!(matches!(result, Err(QueueError::Internal { .. })));
        assert_eq!(writer.next_sequence(), 1);

        let reader = IndexReader::new(layout(&temp_dir, 4));
        assert!(reader.lookup(1).is_err());

        let retried = IndexEntry {
            offset: 96,
            ..entry(1)
        };
        writer.append_with(&retried, false, || Ok(())).unwrap();
        assert_eq!(reader.lookup(1).unwrap(), retried);
    }

    #[test]
    fn test_failed_commit_rewinds_across_page_roll() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = IndexWriter::open(layout(&temp_dir, 2), 0).unwrap();
        writer.append(&entry(0)).unwrap();
        writer.append(&entry(1)).unwrap();

        let result = writer.append_with(&entry(2), false, || {
            InternalSnafu {
                message: "control write failed".to_string(),
            }
            .fail()
        });
        assert!(result.is_err());
        assert_eq!(writer.next_sequence(), 2);

        writer.append(&entry(2)).unwrap();
        let reader = IndexReader::new(layout(&temp_dir, 2));
        assert_eq!(reader.lookup(2).unwrap(), entry(2));
    }
}
