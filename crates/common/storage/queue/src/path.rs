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

//! File naming for a queue `name` stored in directory `dir`:
//!
//! ```text
//! dir/name_<id>.dat   data pages
//! dir/name_<id>.idx   index pages
//! dir/name.meta       control record
//! ```

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::Result;

/// Suffix of data page files.
pub const DATA_PAGE_SUFFIX: &str = ".dat";

/// Suffix of index page files.
pub const INDEX_PAGE_SUFFIX: &str = ".idx";

/// Suffix of the control record file.
pub const META_SUFFIX: &str = ".meta";

/// Joins `prefix`, `id` and `suffix` into a file name.
pub fn page_file_name(prefix: &str, id: u32, suffix: &str) -> String {
    format!("{prefix}{id}{suffix}")
}

/// Returns `dir/name_<id>.dat`.
pub fn data_page_path<P: AsRef<Path>>(dir: P, name: &str, id: u32) -> PathBuf {
    dir.as_ref()
        .join(page_file_name(&page_prefix(name), id, DATA_PAGE_SUFFIX))
}

/// Returns `dir/name_<id>.idx`.
pub fn index_page_path<P: AsRef<Path>>(dir: P, name: &str, id: u32) -> PathBuf {
    dir.as_ref()
        .join(page_file_name(&page_prefix(name), id, INDEX_PAGE_SUFFIX))
}

/// Returns `dir/name.meta`.
pub fn meta_path<P: AsRef<Path>>(dir: P, name: &str) -> PathBuf {
    dir.as_ref().join(format!("{name}{META_SUFFIX}"))
}

fn page_prefix(name: &str) -> String { format!("{name}_") }

/// Extracts the page id from a file name of the form `name_<id><suffix>`.
fn parse_page_id(file_name: &str, name: &str, suffix: &str) -> Option<u32> {
    file_name
        .strip_prefix(name)?
        .strip_prefix('_')?
        .strip_suffix(suffix)
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))?
        .parse()
        .ok()
}

/// Lists the ids of the queue's page files with the given suffix, sorted.
///
/// Only regular files directly inside `dir` are considered; files of other
/// queues sharing the directory are ignored.
pub fn scan_page_ids<P: AsRef<Path>>(dir: P, name: &str, suffix: &str) -> Result<Vec<u32>> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut ids = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        if let Some(id) = file_name
            .to_str()
            .and_then(|file_name| parse_page_id(file_name, name, suffix))
        {
            ids.push(id);
        }
    }

    ids.sort_unstable();
    Ok(ids)
}

/// Removes every file belonging to queue `name` in `dir`.
///
/// Returns the number of files removed. Other queues in the same directory
/// are left alone.
pub fn remove_queue_files<P: AsRef<Path>>(dir: P, name: &str) -> Result<usize> {
    let dir = dir.as_ref();
    let mut removed = 0;

    for suffix in [DATA_PAGE_SUFFIX, INDEX_PAGE_SUFFIX] {
        for id in scan_page_ids(dir, name, suffix)? {
            let path = dir.join(page_file_name(&page_prefix(name), id, suffix));
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }

    let meta = meta_path(dir, name);
    if meta.exists() {
        std::fs::remove_file(&meta)?;
        removed += 1;
    }

    debug!(dir = ?dir, name, removed, "Removed queue files");
    Ok(removed)
}
