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

use std::{path::PathBuf, time::Duration};

use crate::{FlushMode, Queue, QueueConfig, QueueOptions, Result};

pub struct QueueBuilder {
    config: QueueConfig,
}

impl QueueBuilder {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            config: QueueConfig {
                dir: dir.into(),
                ..Default::default()
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub const fn options(mut self, options: QueueOptions) -> Self {
        self.config.options = options;
        self
    }

    pub const fn data_page_size(mut self, size: u32) -> Self {
        self.config.options.data_page_size = size;
        self
    }

    pub const fn index_items_per_page(mut self, items: u32) -> Self {
        self.config.options.index_items_per_page = items;
        self
    }

    pub const fn flush_mode(mut self, mode: FlushMode) -> Self {
        self.config.flush_mode = mode;
        self
    }

    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub const fn verify_on_startup(mut self, verify: bool) -> Self {
        self.config.verify_on_startup = verify;
        self
    }

    pub const fn reclaim_on_close(mut self, reclaim: bool) -> Self {
        self.config.reclaim_on_close = reclaim;
        self
    }

    pub fn build(self) -> Result<Queue> { Queue::new(self.config) }
}

impl From<QueueConfig> for QueueBuilder {
    fn from(config: QueueConfig) -> Self { Self { config } }
}
