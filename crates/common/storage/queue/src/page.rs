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

//! Memory-mapped data pages using mmap-io.
//!
//! A data page is a file pre-allocated to exactly `data_page_size` bytes.
//! Only the active page is mapped read-write; once the controller rolls to
//! the next page the previous one is sealed and only ever read again through
//! the shared read-only mappings cached by [`PageStore`].

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use bytes::Bytes;
use mmap_io::MemoryMappedFile;
use parking_lot::Mutex;
use snafu::ensure;
use tracing::debug;

use crate::{
    Result,
    codec::decode_i32,
    error::{CorruptionSnafu, MmapSnafu},
    index::IndexEntry,
    message::RECORD_HEADER_SIZE,
    path::data_page_path,
};

/// Upper bound on read-only mappings kept open by a [`PageStore`].
const MAX_CACHED_READERS: usize = 8;

/// Writable, memory-mapped data page.
pub struct DataPage {
    mmap: MemoryMappedFile,
    id:   u32,
    path: PathBuf,
    size: u64,
}

impl DataPage {
    /// Create a page file of `size` bytes, replacing any previous content.
    pub fn create<P: AsRef<Path>>(path: P, id: u32, size: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mmap = MemoryMappedFile::create_rw(&path, size).map_err(|e| {
            MmapSnafu {
                message: e.to_string(),
            }
            .build()
        })?;

        Ok(Self {
            mmap,
            id,
            path,
            size,
        })
    }

    /// Open an existing page file for further appends.
    pub fn open<P: AsRef<Path>>(path: P, id: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mmap = MemoryMappedFile::open_rw(&path).map_err(|e| {
            MmapSnafu {
                message: e.to_string(),
            }
            .build()
        })?;
        let size = mmap.len();

        Ok(Self {
            mmap,
            id,
            path,
            size,
        })
    }

    /// Write `data` at `offset`.
    ///
    /// The controller rolls to a fresh page before a record could overflow,
    /// so an out-of-range write means its bookkeeping is broken.
    #[inline]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        ensure!(
            offset + data.len() as u64 <= self.size,
            CorruptionSnafu {
                reason: format!(
                    "write of {} bytes at offset {offset} overflows data page {} ({} bytes)",
                    data.len(),
                    self.id,
                    self.size
                ),
            }
        );
        self.mmap.update_region(offset, data).map_err(|e| {
            MmapSnafu {
                message: e.to_string(),
            }
            .build()
        })
    }

    /// Flush the whole page to disk.
    pub fn sync(&self) -> Result<()> {
        self.mmap.flush().map_err(|e| {
            MmapSnafu {
                message: e.to_string(),
            }
            .build()
        })
    }

    /// Flush a byte range of the page to disk.
    pub fn sync_range(&self, offset: u64, len: u64) -> Result<()> {
        self.mmap.flush_range(offset, len).map_err(|e| {
            MmapSnafu {
                message: e.to_string(),
            }
            .build()
        })
    }

    pub const fn id(&self) -> u32 { self.id }

    pub const fn size(&self) -> u64 { self.size }

    pub fn path(&self) -> &Path { &self.path }
}

/// Read-only mapping of a data page.
pub struct ReadOnlyDataPage {
    mmap: MemoryMappedFile,
    size: u64,
}

impl ReadOnlyDataPage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mmap = MemoryMappedFile::open_ro(path.as_ref()).map_err(|e| {
            MmapSnafu {
                message: e.to_string(),
            }
            .build()
        })?;
        let size = mmap.len();

        Ok(Self { mmap, size })
    }

    #[inline]
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.mmap.read_into(offset, buf).map_err(|e| {
            MmapSnafu {
                message: e.to_string(),
            }
            .build()
        })
    }

    pub const fn size(&self) -> u64 { self.size }
}

/// Fixed-capacity byte storage addressed by `(page_id, offset, length)`.
///
/// Readers share cached read-only mappings and never touch the writer's
/// state, so reads of sealed pages proceed while an enqueue is in flight.
pub struct PageStore {
    dir:       PathBuf,
    name:      String,
    page_size: u64,
    readers:   Mutex<HashMap<u32, Arc<ReadOnlyDataPage>>>,
}

impl PageStore {
    pub fn new<P: Into<PathBuf>>(dir: P, name: impl Into<String>, page_size: u32) -> Self {
        Self {
            dir:       dir.into(),
            name:      name.into(),
            page_size: u64::from(page_size),
            readers:   Mutex::new(HashMap::new()),
        }
    }

    pub const fn page_size(&self) -> u64 { self.page_size }

    pub fn page_path(&self, page_id: u32) -> PathBuf {
        data_page_path(&self.dir, &self.name, page_id)
    }

    /// Create a fresh page file for `page_id`.
    pub fn allocate(&self, page_id: u32) -> Result<DataPage> {
        let path = self.page_path(page_id);
        debug!(path = ?path, page_id, "Allocating data page");
        self.evict(page_id);
        DataPage::create(path, page_id, self.page_size)
    }

    /// Reopen the active page after a restart, allocating it if it never made
    /// it to disk.
    pub fn open_active(&self, page_id: u32) -> Result<DataPage> {
        let path = self.page_path(page_id);
        if !path.exists() {
            return self.allocate(page_id);
        }

        let page = DataPage::open(&path, page_id)?;
        ensure!(
            page.size() == self.page_size,
            CorruptionSnafu {
                reason: format!(
                    "data page {page_id} is {} bytes, expected {}",
                    page.size(),
                    self.page_size
                ),
            }
        );
        Ok(page)
    }

    /// Read `length` bytes at `offset` of page `page_id`.
    pub fn read(&self, page_id: u32, offset: u64, length: usize) -> Result<Bytes> {
        let page = self.reader(page_id)?;
        ensure!(
            offset + length as u64 <= page.size(),
            CorruptionSnafu {
                reason: format!(
                    "range {offset}+{length} outside data page {page_id} ({} bytes)",
                    page.size()
                ),
            }
        );
        if length == 0 {
            return Ok(Bytes::new());
        }

        let mut buf = vec![0u8; length];
        page.read_at(offset, &mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Read the payload addressed by an index entry, checking that the
    /// length prefix on disk agrees with the index.
    pub fn read_record(&self, entry: &IndexEntry) -> Result<Bytes> {
        let header = self.read(entry.page_id, entry.offset, RECORD_HEADER_SIZE)?;
        let stored = decode_i32(&header)?;
        ensure!(
            i64::from(stored) == i64::from(entry.length),
            CorruptionSnafu {
                reason: format!(
                    "record {} in data page {} has length {stored}, index says {}",
                    entry.sequence, entry.page_id, entry.length
                ),
            }
        );

        self.read(
            entry.page_id,
            entry.offset + RECORD_HEADER_SIZE as u64,
            entry.length as usize,
        )
    }

    /// Delete the file of `page_id`. Returns whether a file was removed.
    pub fn remove(&self, page_id: u32) -> Result<bool> {
        self.evict(page_id);
        let path = self.page_path(page_id);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = ?path, page_id, "Removed data page");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn evict(&self, page_id: u32) { self.readers.lock().remove(&page_id); }

    /// Drop every cached mapping.
    pub fn clear(&self) { self.readers.lock().clear(); }

    fn reader(&self, page_id: u32) -> Result<Arc<ReadOnlyDataPage>> {
        if let Some(page) = self.readers.lock().get(&page_id) {
            return Ok(Arc::clone(page));
        }

        let path = self.page_path(page_id);
        ensure!(
            path.exists(),
            CorruptionSnafu {
                reason: format!("data page {page_id} is missing"),
            }
        );
        let page = Arc::new(ReadOnlyDataPage::open(&path)?);

        let mut readers = self.readers.lock();
        if readers.len() >= MAX_CACHED_READERS
            && let Some(&oldest) = readers.keys().min()
        {
            readers.remove(&oldest);
        }
        readers.insert(page_id, Arc::clone(&page));
        Ok(page)
    }
}
