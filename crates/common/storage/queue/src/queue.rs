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

//! Main queue handle and lifecycle management.
//!
//! The [`Queue`] owns the head and tail cursors and is the only component
//! that moves them. It manages:
//! - Recovery of existing data on open
//! - Appends to the active data page and the index
//! - Persisting the control record after every mutation
//! - Factory methods for [`Tailer`] and [`Subscription`]
//!
//! ## Usage
//!
//! ```ignore
//! let queue = Queue::open("/path/to/queue", "orders", QueueOptions::default())?;
//!
//! let sequence = queue.enqueue(b"hello")?;
//! let message = queue.dequeue()?;
//! assert_eq!(message.sequence, sequence);
//!
//! queue.close()?;
//! ```
//!
//! ## Locking
//!
//! Three mutexes, always taken in this order when nested:
//! writer (tail, active pages), dequeue (head), meta (control record).
//! Head and tail are also published through atomics, so `peek` and the
//! subscription threads never block behind an enqueue.

use std::{
    fmt,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Instant,
};

use bytes::Bytes;
use crossbeam::channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;
use snafu::{OptionExt, ensure};
use tracing::{debug, info, warn};

use crate::{
    FlushMode, QueueBuilder, QueueConfig, QueueError, QueueOptions, Result,
    error::{EmptySnafu, InternalSnafu, NotFoundSnafu, QueueClosedSnafu, RecordTooLargeSnafu},
    index::{IndexEntry, IndexLayout, IndexReader, IndexWriter},
    message::{Message, encode_record, record_disk_size},
    meta::{MetaFile, MetaRecord},
    page::{DataPage, PageStore},
    path::{DATA_PAGE_SUFFIX, INDEX_PAGE_SUFFIX, remove_queue_files, scan_page_ids},
    recovery::{RecoveryResult, recover},
    subscriber::Subscription,
    tailer::Tailer,
};

/// A persistent FIFO queue.
///
/// Cloning is cheap and every clone refers to the same open queue. Any
/// number of threads may enqueue, dequeue and peek concurrently; sequences
/// are assigned in enqueue order and never reused.
#[derive(Clone)]
pub struct Queue {
    inner: Arc<QueueInner>,
}

/// Point-in-time view of the queue cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    /// Next sequence to dequeue.
    pub head:             u64,
    /// Next sequence to assign.
    pub tail:             u64,
    /// Number of live records.
    pub len:              u64,
    /// Data page receiving appends.
    pub active_data_page: u32,
    /// Next free byte inside the active data page.
    pub write_offset:     u64,
    pub options:          QueueOptions,
    pub closed:           bool,
}

/// Files deleted by [`Queue::reclaim`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimStats {
    pub data_pages:  usize,
    pub index_pages: usize,
}

pub(crate) struct QueueInner {
    config:       QueueConfig,
    store:        PageStore,
    index:        IndexReader,
    /// Append side. `None` once the queue is closed.
    writer:       Mutex<Option<Writer>>,
    /// Serializes head movement and holds the time of the last synced head
    /// update.
    dequeue_lock: Mutex<Instant>,
    meta:         Mutex<MetaFileState>,
    head:         AtomicU64,
    tail:         AtomicU64,
    closed:       AtomicBool,
    /// One sender per live subscription, signalled after every enqueue.
    wakers:       Mutex<Vec<Sender<()>>>,
}

struct Writer {
    data:         DataPage,
    write_offset: u64,
    index:        IndexWriter,
    last_sync:    Instant,
}

struct MetaFileState {
    record: MetaRecord,
    file:   MetaFile,
}

impl Queue {
    /// Open (or create) queue `name` inside `dir` with the given geometry.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOptions` for unusable options, `OptionsMismatch` when
    /// an existing queue was created with different ones, and `Corruption`
    /// when recovery finds inconsistent files.
    pub fn open<P: AsRef<Path>>(dir: P, name: &str, options: QueueOptions) -> Result<Self> {
        QueueBuilder::new(dir.as_ref())
            .name(name)
            .options(options)
            .build()
    }

    /// Delete every file of queue `name` in `dir`.
    ///
    /// The queue must not be open. Returns the number of files removed.
    pub fn destroy<P: AsRef<Path>>(dir: P, name: &str) -> Result<usize> {
        info!(dir = ?dir.as_ref(), name, "Destroying queue");
        remove_queue_files(dir, name)
    }

    pub(crate) fn new(config: QueueConfig) -> Result<Self> {
        config.validate()?;

        let store = PageStore::new(
            &config.dir,
            config.name.as_str(),
            config.options.data_page_size,
        );
        let layout = IndexLayout::new(
            &config.dir,
            config.name.as_str(),
            config.options.index_items_per_page,
        );

        let RecoveryResult { info, meta } = recover(&config, &store)?;

        let index = IndexWriter::open(layout.clone(), info.tail)?;
        let data = store.open_active(info.active_data_page)?;

        info!(
            dir = ?config.dir,
            name = %config.name,
            head = info.head,
            tail = info.tail,
            active_data_page = info.active_data_page,
            "Queue opened"
        );

        let now = Instant::now();
        let inner = QueueInner {
            store,
            index: IndexReader::new(layout),
            writer: Mutex::new(Some(Writer {
                data,
                write_offset: info.write_offset,
                index,
                last_sync: now,
            })),
            dequeue_lock: Mutex::new(now),
            meta: Mutex::new(MetaFileState {
                record: info.to_record(&config),
                file:   meta,
            }),
            head: AtomicU64::new(info.head),
            tail: AtomicU64::new(info.tail),
            closed: AtomicBool::new(false),
            wakers: Mutex::new(Vec::new()),
            config,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Append `data` and return its sequence.
    ///
    /// The record is written to the data page, then indexed, then recorded
    /// in the control file; the sequence becomes visible to readers only
    /// after all three steps succeeded.
    ///
    /// # Errors
    ///
    /// Returns `RecordTooLarge` when the record cannot fit in one data page.
    /// Nothing is written in that case.
    pub fn enqueue(&self, data: &[u8]) -> Result<u64> {
        let inner = &*self.inner;

        let max = inner.config.options.max_payload_size();
        ensure!(
            data.len() <= max,
            RecordTooLargeSnafu {
                size: data.len(),
                max,
            }
        );
        let header = i32::try_from(data.len()).ok().context(RecordTooLargeSnafu {
            size: data.len(),
            max,
        })?;
        let length = u32::try_from(data.len()).ok().context(RecordTooLargeSnafu {
            size: data.len(),
            max,
        })?;

        let mut guard = inner.writer.lock();
        let writer = guard.as_mut().context(QueueClosedSnafu)?;

        let sequence = writer.index.next_sequence();
        let record_size = record_disk_size(data.len()) as u64;

        if writer.write_offset + record_size > inner.store.page_size() {
            inner.roll_data_page(writer)?;
        }

        let offset = writer.write_offset;
        writer.data.write_at(offset, &encode_record(header, data))?;

        let sync = inner.config.flush_mode.is_due(&mut writer.last_sync);
        if sync {
            if inner.config.flush_mode == FlushMode::Sync {
                writer.data.sync_range(offset, record_size)?;
            } else {
                writer.data.sync()?;
            }
        }

        let entry = IndexEntry {
            sequence,
            page_id: writer.data.id(),
            offset,
            length,
        };
        writer.index.append_with(&entry, sync, || {
            inner.persist_meta(sync, |record| {
                record.tail = sequence + 1;
                record.active_data_page = entry.page_id;
                record.write_offset = offset + record_size;
            })
        })?;

        writer.write_offset = offset + record_size;
        inner.tail.store(sequence + 1, Ordering::Release);
        drop(guard);

        debug!(
            sequence,
            page_id = entry.page_id,
            offset,
            len = data.len(),
            "Enqueued record"
        );
        inner.wake_subscribers();
        Ok(sequence)
    }

    /// Enqueue every item in order, returning their sequences.
    ///
    /// Stops at the first failure; items before it stay enqueued.
    pub fn enqueue_batch<I, T>(&self, items: I) -> Result<Vec<u64>>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        items
            .into_iter()
            .map(|item| self.enqueue(item.as_ref()))
            .collect()
    }

    /// Remove and return the record at the head.
    ///
    /// # Errors
    ///
    /// Returns `Empty` when there is nothing to dequeue. On any other error
    /// the head does not move.
    pub fn dequeue(&self) -> Result<Message> {
        let inner = &*self.inner;
        let mut last_sync = inner.dequeue_lock.lock();
        inner.ensure_open()?;

        let head = inner.head.load(Ordering::Acquire);
        let tail = inner.tail.load(Ordering::Acquire);
        ensure!(head < tail, EmptySnafu);

        let payload = inner.read_payload(head)?;

        let sync = inner.config.flush_mode.is_due(&mut last_sync);
        inner.persist_meta(sync, |record| record.head = head + 1)?;
        inner.head.store(head + 1, Ordering::Release);

        debug!(sequence = head, len = payload.len(), "Dequeued record");
        Ok(Message {
            sequence: head,
            payload,
        })
    }

    /// Read the payload at `sequence` without consuming it.
    ///
    /// # Errors
    ///
    /// Returns `Empty` when `sequence` has not been assigned yet and
    /// `NotFound` when it has already been consumed.
    pub fn peek(&self, sequence: u64) -> Result<Bytes> {
        let inner = &*self.inner;
        inner.ensure_open()?;

        let tail = inner.tail.load(Ordering::Acquire);
        ensure!(sequence < tail, EmptySnafu);
        let head = inner.head.load(Ordering::Acquire);
        ensure!(
            sequence >= head,
            NotFoundSnafu {
                sequence,
                head,
                tail
            }
        );

        inner.read_payload(sequence).or_else(|e| {
            // Reclamation may have removed the pages after the range check.
            let head = inner.head.load(Ordering::Acquire);
            if sequence < head {
                NotFoundSnafu {
                    sequence,
                    head,
                    tail,
                }
                .fail()
            } else {
                Err(e)
            }
        })
    }

    /// Read the record at the head without consuming it.
    pub fn peek_head(&self) -> Result<Message> {
        loop {
            let sequence = self.head();
            match self.peek(sequence) {
                Ok(payload) => return Ok(Message { sequence, payload }),
                // A concurrent dequeue moved the head; look again.
                Err(QueueError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Read up to `limit` records starting at `start` without consuming
    /// them.
    ///
    /// Returns fewer records when the tail is reached and an empty vector
    /// when `start` is at or past the tail.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when `start` lies before the head.
    pub fn peek_range(&self, start: u64, limit: usize) -> Result<Vec<Message>> {
        self.inner.ensure_open()?;

        let tail = self.tail();
        let end = tail.min(start.saturating_add(limit as u64));

        let mut messages = Vec::with_capacity(end.saturating_sub(start) as usize);
        for sequence in start..end {
            let payload = self.peek(sequence)?;
            messages.push(Message { sequence, payload });
        }
        Ok(messages)
    }

    /// Advance the head by up to `count` records without reading them.
    ///
    /// Returns the number of records skipped.
    pub fn skip(&self, count: u64) -> Result<u64> {
        let inner = &*self.inner;
        let mut last_sync = inner.dequeue_lock.lock();
        inner.ensure_open()?;

        let head = inner.head.load(Ordering::Acquire);
        let tail = inner.tail.load(Ordering::Acquire);
        let skipped = count.min(tail - head);
        if skipped == 0 {
            return Ok(0);
        }

        let sync = inner.config.flush_mode.is_due(&mut last_sync);
        inner.persist_meta(sync, |record| record.head = head + skipped)?;
        inner.head.store(head + skipped, Ordering::Release);

        debug!(from = head, skipped, "Skipped records");
        Ok(skipped)
    }

    /// Delete data and index pages holding only consumed records.
    ///
    /// The active data page and the index page receiving the next append are
    /// never removed.
    pub fn reclaim(&self) -> Result<ReclaimStats> {
        let inner = &*self.inner;
        let guard = inner.writer.lock();
        let writer = guard.as_ref().context(QueueClosedSnafu)?;
        let _head_guard = inner.dequeue_lock.lock();

        inner.reclaim_locked(writer)
    }

    /// Flush everything to disk and release the queue files.
    ///
    /// Subscriptions stop after their current callback. Closing an already
    /// closed queue is a no-op.
    pub fn close(&self) -> Result<()> { self.inner.close() }

    /// Create a cursor starting at the current head.
    pub fn tailer(&self) -> Result<Tailer> {
        self.inner.ensure_open()?;
        Ok(Tailer::new(self.clone(), self.head()))
    }

    /// Create a cursor starting at `sequence`.
    pub fn tailer_at(&self, sequence: u64) -> Result<Tailer> {
        self.inner.ensure_open()?;
        Ok(Tailer::new(self.clone(), sequence))
    }

    /// Deliver every record from the current head on to `callback`, in
    /// order, on a dedicated thread.
    ///
    /// Subscriptions only read; the head does not move.
    pub fn subscribe<F>(&self, callback: F) -> Result<Subscription>
    where
        F: FnMut(Result<Message>) + Send + 'static,
    {
        let tailer = self.tailer()?;
        Subscription::spawn(tailer, self.inner.register_waker(), callback)
    }

    #[must_use]
    pub fn head(&self) -> u64 { self.inner.head.load(Ordering::Acquire) }

    #[must_use]
    pub fn tail(&self) -> u64 { self.inner.tail.load(Ordering::Acquire) }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> u64 {
        let head = self.head();
        self.tail().saturating_sub(head)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    #[must_use]
    pub fn is_closed(&self) -> bool { self.inner.closed.load(Ordering::Acquire) }

    /// Snapshot of the cursors as last recorded in the control file.
    #[must_use]
    pub fn status(&self) -> QueueStatus {
        let record = self.inner.meta.lock().record;
        QueueStatus {
            head:             record.head,
            tail:             record.tail,
            len:              record.tail - record.head,
            active_data_page: record.active_data_page,
            write_offset:     record.write_offset,
            options:          self.inner.config.options,
            closed:           self.is_closed(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &QueueConfig { &self.inner.config }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("dir", &self.inner.config.dir)
            .field("name", &self.inner.config.name)
            .field("head", &self.head())
            .field("tail", &self.tail())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl QueueInner {
    fn ensure_open(&self) -> Result<()> {
        ensure!(!self.closed.load(Ordering::Acquire), QueueClosedSnafu);
        Ok(())
    }

    fn read_payload(&self, sequence: u64) -> Result<Bytes> {
        let entry = self.index.lookup(sequence)?;
        self.store.read_record(&entry)
    }

    /// Apply `update` to the control record and persist it. The in-memory
    /// record only changes when the write succeeded.
    fn persist_meta(&self, sync: bool, update: impl FnOnce(&mut MetaRecord)) -> Result<()> {
        let mut meta = self.meta.lock();
        let mut record = meta.record;
        update(&mut record);
        meta.file.write(&record, sync)?;
        meta.record = record;
        Ok(())
    }

    /// Seal the active data page and start the next one.
    fn roll_data_page(&self, writer: &mut Writer) -> Result<()> {
        let sealed = writer.data.id();
        let next = sealed.checked_add(1).context(InternalSnafu {
            message: "data page ids exhausted".to_string(),
        })?;

        writer.data.sync()?;
        writer.data = self.store.allocate(next)?;
        writer.write_offset = 0;

        info!(
            sealed,
            active = next,
            path = ?writer.data.path(),
            "Rolled to new data page"
        );
        Ok(())
    }

    /// Remove pages wholly below the head. Caller holds the writer and
    /// dequeue locks.
    fn reclaim_locked(&self, writer: &Writer) -> Result<ReclaimStats> {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        let layout = self.index.layout();
        let mut stats = ReclaimStats::default();

        let active_index_page = writer.index.page_id();
        for page_id in scan_page_ids(&self.config.dir, &self.config.name, INDEX_PAGE_SUFFIX)? {
            let page_end = layout.first_sequence(page_id) + u64::from(layout.items_per_page());
            if page_id < active_index_page && page_end <= head && self.index.remove_page(page_id)? {
                stats.index_pages += 1;
            }
        }

        let active_data_page = writer.data.id();
        let first_live_data_page = if head < tail {
            self.index.lookup(head)?.page_id
        } else {
            active_data_page
        };
        for page_id in scan_page_ids(&self.config.dir, &self.config.name, DATA_PAGE_SUFFIX)? {
            if page_id < first_live_data_page
                && page_id != active_data_page
                && self.store.remove(page_id)?
            {
                stats.data_pages += 1;
            }
        }

        if stats != ReclaimStats::default() {
            info!(
                head,
                data_pages = stats.data_pages,
                index_pages = stats.index_pages,
                "Reclaimed consumed pages"
            );
        }
        Ok(stats)
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.writer.lock();
        let Some(writer) = guard.take() else {
            return Ok(());
        };
        self.closed.store(true, Ordering::Release);
        let _head_guard = self.dequeue_lock.lock();

        let synced = writer.data.sync().and_then(|()| writer.index.sync());
        let reclaimed = if self.config.reclaim_on_close {
            self.reclaim_locked(&writer).map(|_| ())
        } else {
            Ok(())
        };
        let persisted = {
            let mut meta = self.meta.lock();
            let record = meta.record;
            meta.file.write(&record, true)
        };

        drop(writer);
        self.store.clear();
        self.index.clear();
        self.wake_subscribers();

        info!(
            name = %self.config.name,
            head = self.head.load(Ordering::Acquire),
            tail = self.tail.load(Ordering::Acquire),
            "Queue closed"
        );
        synced.and(reclaimed).and(persisted)
    }

    fn register_waker(&self) -> (Sender<()>, Receiver<()>) {
        let (tx, rx) = bounded(1);
        self.wakers.lock().push(tx.clone());
        (tx, rx)
    }

    fn wake_subscribers(&self) {
        self.wakers
            .lock()
            .retain(|tx| !matches!(tx.try_send(()), Err(TrySendError::Disconnected(()))));
    }
}

impl Drop for QueueInner {
    fn drop(&mut self) {
        if self.writer.get_mut().is_some()
            && let Err(e) = self.close()
        {
            warn!(name = %self.config.name, error = %e, "Failed to close queue on drop");
        }
    }
}
