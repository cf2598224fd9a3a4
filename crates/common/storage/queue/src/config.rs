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

use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::ensure;

use crate::{Result, error::InvalidOptionsSnafu, message::RECORD_HEADER_SIZE};

/// Default capacity of a data page: 128 MiB.
pub const DEFAULT_DATA_PAGE_SIZE: u32 = 128 * 1024 * 1024;

/// Default number of index entries per index page.
pub const DEFAULT_INDEX_ITEMS_PER_PAGE: u32 = 8192;

/// Default idle wait of a subscription between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// On-disk geometry of a queue.
///
/// Both values are recorded in the control record when the queue is created
/// and must match on every later open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct QueueOptions {
    /// Capacity in bytes of every data page file.
    #[default(DEFAULT_DATA_PAGE_SIZE)]
    pub data_page_size:       u32,
    /// Number of fixed-width entries held by one index page file.
    #[default(DEFAULT_INDEX_ITEMS_PER_PAGE)]
    pub index_items_per_page: u32,
}

impl QueueOptions {
    /// Rejects geometries the page and index layers cannot address.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.data_page_size as usize > RECORD_HEADER_SIZE,
            InvalidOptionsSnafu {
                reason: format!(
                    "data_page_size {} must exceed the {RECORD_HEADER_SIZE}-byte record header",
                    self.data_page_size
                ),
            }
        );
        ensure!(
            i32::try_from(self.data_page_size).is_ok(),
            InvalidOptionsSnafu {
                reason: format!(
                    "data_page_size {} does not fit a 32-bit page offset",
                    self.data_page_size
                ),
            }
        );
        ensure!(
            self.index_items_per_page > 0,
            InvalidOptionsSnafu {
                reason: "index_items_per_page must be at least 1".to_string(),
            }
        );
        Ok(())
    }

    /// Largest payload a single record may carry.
    #[must_use]
    pub const fn max_payload_size(&self) -> usize {
        self.data_page_size as usize - RECORD_HEADER_SIZE
    }
}

/// When writes are forced to stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    /// Sync data, index and control record on every mutation.
    #[default]
    Sync,
    /// Leave flushing to the OS; `close` still syncs everything.
    Async,
    /// Sync at most once per `interval`.
    Batch { interval: Duration },
}

impl FlushMode {
    /// Whether a mutation happening now must be synced, given the time of the
    /// last sync. Resets `last_sync` when it returns `true` in batch mode.
    pub(crate) fn is_due(&self, last_sync: &mut Instant) -> bool {
        match self {
            Self::Sync => true,
            Self::Async => false,
            Self::Batch { interval } => {
                let now = Instant::now();
                if now.duration_since(*last_sync) >= *interval {
                    *last_sync = now;
                    true
                } else {
                    false
                }
            }
        }
    }
}

/// Full configuration of one queue instance.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Directory holding the queue files.
    pub dir:               PathBuf,
    /// Queue name, used as the prefix of every file.
    pub name:              String,
    pub options:           QueueOptions,
    pub flush_mode:        FlushMode,
    /// Idle wait of subscriptions when no record is available.
    pub poll_interval:     Duration,
    /// Check every live record against its index entry during recovery.
    pub verify_on_startup: bool,
    /// Run [`Queue::reclaim`](crate::Queue::reclaim) as part of close.
    pub reclaim_on_close:  bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            dir:               PathBuf::from("./queue_data"),
            name:              "queue".to_string(),
            options:           QueueOptions::default(),
            flush_mode:        FlushMode::Sync,
            poll_interval:     DEFAULT_POLL_INTERVAL,
            verify_on_startup: false,
            reclaim_on_close:  false,
        }
    }
}

impl QueueConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        ensure!(
            !self.name.is_empty() && !self.name.contains(['/', '\\']),
            InvalidOptionsSnafu {
                reason: format!("queue name {:?} must be a non-empty file name", self.name),
            }
        );
        self.options.validate()
    }
}
