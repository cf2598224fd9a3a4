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

//! Crash recovery for the persistent queue.
//!
//! Recovery trusts the control record and only looks at the index beyond it:
//! 1. Load the latest valid control slot
//! 2. Check the stored options against the requested ones
//! 3. Scan index entries from the recorded tail, accepting every entry whose
//!    record header in the data page agrees with it
//! 4. Return [`RecoveryInfo`] with the positions for resuming writes
//!
//! Without a control record the index pages are scanned from the lowest
//! surviving page. Leading entries whose data page was already reclaimed
//! count as consumed; the head falls back to the first entry that still has
//! its data, so records consumed before the control record was lost may be
//! delivered again.

use snafu::ensure;
use tracing::{debug, info, warn};

use crate::{
    QueueConfig, Result,
    error::{CorruptionSnafu, OptionsMismatchSnafu},
    index::{IndexEntry, IndexLayout, IndexReader},
    meta::{MetaFile, MetaRecord},
    page::PageStore,
    path::{DATA_PAGE_SUFFIX, INDEX_PAGE_SUFFIX, meta_path, scan_page_ids},
};

/// Positions needed to resume a queue.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryInfo {
    /// Next sequence to dequeue.
    pub head:             u64,
    /// Next sequence to assign.
    pub tail:             u64,
    /// Data page receiving appends.
    pub active_data_page: u32,
    /// Next free byte inside the active data page.
    pub write_offset:     u64,
}

impl RecoveryInfo {
    pub(crate) fn to_record(self, config: &QueueConfig) -> MetaRecord {
        MetaRecord {
            head:                 self.head,
            tail:                 self.tail,
            data_page_size:       config.options.data_page_size,
            index_items_per_page: config.options.index_items_per_page,
            active_data_page:     self.active_data_page,
            write_offset:         self.write_offset,
        }
    }

    fn advance(&mut self, entry: &IndexEntry) {
        self.tail = entry.sequence + 1;
        self.active_data_page = entry.page_id;
        self.write_offset = entry.end_offset();
    }
}

/// Result of recovery including the open control file.
pub struct RecoveryResult {
    pub info: RecoveryInfo,
    pub meta: MetaFile,
}

/// Rebuild the queue state from disk and persist it as the current control
/// record.
pub fn recover(config: &QueueConfig, store: &PageStore) -> Result<RecoveryResult> {
    info!(dir = ?config.dir, name = %config.name, "Starting queue recovery");

    std::fs::create_dir_all(&config.dir)?;
    let (mut meta, latest) = MetaFile::open(meta_path(&config.dir, &config.name))?;

    let reader = IndexReader::new(IndexLayout::new(
        &config.dir,
        config.name.as_str(),
        config.options.index_items_per_page,
    ));

    let info = match latest {
        None => recover_by_scan(config, &reader, store)?,
        Some(record) => recover_from_meta(config, &reader, store, record)?,
    };

    ensure!(
        info.write_offset <= store.page_size(),
        CorruptionSnafu {
            reason: format!(
                "write offset {} lies beyond the {}-byte data page",
                info.write_offset,
                store.page_size()
            ),
        }
    );

    if config.verify_on_startup {
        verify_live_records(&reader, store, &info)?;
    }

    meta.write(&info.to_record(config), true)?;

    info!(
        head = info.head,
        tail = info.tail,
        active_data_page = info.active_data_page,
        write_offset = info.write_offset,
        "Queue recovery complete"
    );

    Ok(RecoveryResult { info, meta })
}

fn recover_from_meta(
    config: &QueueConfig,
    reader: &IndexReader,
    store: &PageStore,
    record: MetaRecord,
) -> Result<RecoveryInfo> {
    ensure!(
        record.data_page_size == config.options.data_page_size
            && record.index_items_per_page == config.options.index_items_per_page,
        OptionsMismatchSnafu {
            stored_page_size:      record.data_page_size,
            stored_items_per_page: record.index_items_per_page,
            page_size:             config.options.data_page_size,
            items_per_page:        config.options.index_items_per_page,
        }
    );
    ensure!(
        record.head <= record.tail,
        CorruptionSnafu {
            reason: format!(
                "control record head {} is past tail {}",
                record.head, record.tail
            ),
        }
    );

    let mut info = RecoveryInfo {
        head:             record.head,
        tail:             record.tail,
        active_data_page: record.active_data_page,
        write_offset:     record.write_offset,
    };

    let recorded_tail = info.tail;
    catch_up(reader, store, &mut info)?;
    if info.tail > recorded_tail {
        info!(
            recovered = info.tail - recorded_tail,
            "Recovered records committed after the last control update"
        );
    }

    if info.tail > info.head {
        // The newest live record must be resolvable; anything else means the
        // index lost committed entries.
        let last = reader.lookup(info.tail - 1)?;
        debug!(sequence = last.sequence, page_id = last.page_id, "Last record located");
    }

    Ok(info)
}

/// Advance `info` over index entries written after it was recorded.
fn catch_up(reader: &IndexReader, store: &PageStore, info: &mut RecoveryInfo) -> Result<()> {
    let layout = reader.layout();
    let mut page_id = layout.page_of(info.tail)?;

    loop {
        let entries = reader.scan_page(page_id)?;
        let page_end = layout.first_sequence(page_id) + u64::from(layout.items_per_page());

        let from = info.tail;
        for entry in entries.iter().filter(|e| e.sequence >= from) {
            if !is_committed(store, info, entry) {
                return Ok(());
            }
            info.advance(entry);
        }

        if info.tail < page_end {
            return Ok(());
        }
        page_id += 1;
    }
}

/// Whether `entry` continues the log described by `info` and its record
/// header on disk agrees with it.
fn is_committed(store: &PageStore, info: &RecoveryInfo, entry: &IndexEntry) -> bool {
    let in_order = entry.sequence == info.tail
        && (entry.page_id > info.active_data_page
            || (entry.page_id == info.active_data_page && entry.offset >= info.write_offset));
    if !in_order {
        warn!(
            sequence = entry.sequence,
            page_id = entry.page_id,
            offset = entry.offset,
            "Index entry does not follow the recovered tail, ignoring the rest"
        );
        return false;
    }

    match store.read_record(entry) {
        Ok(_) => true,
        Err(e) => {
            warn!(
                sequence = entry.sequence,
                error = %e,
                "Record behind index entry is unreadable, ignoring the rest"
            );
            false
        }
    }
}

fn recover_by_scan(
    config: &QueueConfig,
    reader: &IndexReader,
    store: &PageStore,
) -> Result<RecoveryInfo> {
    let layout = reader.layout();
    let index_pages = scan_page_ids(&config.dir, &config.name, INDEX_PAGE_SUFFIX)?;

    let Some(&first_page) = index_pages.first() else {
        info!("No control record or index found, starting fresh");
        return Ok(RecoveryInfo {
            active_data_page: next_free_data_page(config)?,
            ..RecoveryInfo::default()
        });
    };

    warn!(
        index_pages = index_pages.len(),
        "Control record missing, rebuilding state from the index"
    );

    for pair in index_pages.windows(2) {
        ensure!(
            pair[1] == pair[0] + 1,
            CorruptionSnafu {
                reason: format!("index pages {} and {} are not adjacent", pair[0], pair[1]),
            }
        );
    }

    let first_entries = reader.scan_page(first_page)?;
    let head = first_entries
        .first()
        .map_or_else(|| layout.first_sequence(first_page), |e| e.sequence);

    let mut info = RecoveryInfo {
        head,
        tail: head,
        active_data_page: first_entries.first().map_or(0, |e| e.page_id),
        write_offset: first_entries.first().map_or(0, |e| e.offset),
    };

    let last_page = index_pages.last().copied().unwrap_or(first_page);
    for &page_id in &index_pages {
        let entries = if page_id == first_page {
            first_entries.clone()
        } else {
            reader.scan_page(page_id)?
        };

        for entry in &entries {
            if info.head == info.tail && !store.page_path(entry.page_id).exists() {
                // Data page already reclaimed, so the record was consumed.
                info.advance(entry);
                info.head = info.tail;
                continue;
            }
            if !is_committed(store, &info, entry) {
                break;
            }
            info.advance(entry);
        }

        let page_end = layout.first_sequence(page_id) + u64::from(layout.items_per_page());
        ensure!(
            page_id == last_page || info.tail == page_end,
            CorruptionSnafu {
                reason: format!(
                    "index page {page_id} ends at sequence {} but later pages exist",
                    info.tail
                ),
            }
        );
    }

    if info.tail == info.head {
        info.active_data_page = next_free_data_page(config)?;
        info.write_offset = 0;
    }

    Ok(info)
}

/// A data page id beyond every existing data page file.
fn next_free_data_page(config: &QueueConfig) -> Result<u32> {
    let ids = scan_page_ids(&config.dir, &config.name, DATA_PAGE_SUFFIX)?;
    Ok(ids.last().map_or(0, |id| id + 1))
}

fn verify_live_records(reader: &IndexReader, store: &PageStore, info: &RecoveryInfo) -> Result<()> {
    debug!(head = info.head, tail = info.tail, "Verifying live records");
    for sequence in info.head..info.tail {
        let entry = reader.lookup(sequence)?;
        store.read_record(&entry)?;
    }
    Ok(())
}
