// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Directory Entries
//!
//! The contents of a mutable directory object: a case-sensitive mapping
//! from entry name to `Entry`. Directory objects are only ever replaced
//! wholesale through `CapabilityStore::update_mutable`.

use crate::domain::capability::{DirCap, DirRef, ObjectRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name -> entry mapping held by a directory object
pub type DirectoryEntries = BTreeMap<String, Entry>;

/// File entry metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Immutable object holding the file bytes
    pub object: ObjectRef,
    /// Commit time (Unix timestamp)
    pub mtime: i64,
}

impl FileEntry {
    pub fn size(&self) -> u64 {
        self.object.size
    }
}

/// Directory entry
///
/// The kind of an entry never changes once created. Overwriting a file
/// swaps its `ObjectRef`; a directory is always linked by capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Entry {
    File(FileEntry),
    Dir { cap: DirCap },
}

impl Entry {
    pub fn kind(&self) -> EntryKind {
        match self {
            Entry::File(_) => EntryKind::File,
            Entry::Dir { .. } => EntryKind::Directory,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Entry::Dir { .. })
    }
}

/// Entry kind as reported by stat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// Directory contents as observed at one version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySnapshot {
    pub dir: DirRef,
    pub entries: DirectoryEntries,
}

impl DirectorySnapshot {
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// Validate a single entry name
///
/// Names are non-empty, never `.` or `..`, and never contain `/` or NUL.
pub fn is_valid_entry_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\0'])
}
