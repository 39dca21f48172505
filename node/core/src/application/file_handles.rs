// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Virtual File Handle Manager
//!
//! The store has no partial writes and no in-place mutation, so handles
//! are local state:
//!
//! - A read handle pins the `ObjectRef` seen at open time. Bytes are fetched
//!   on first read and cached, so the handle never observes later commits.
//! - A write handle owns a private buffer. Nothing reaches the store until
//!   the handle is closed, at which point the buffer is stored as a new
//!   immutable object and linked into the parent directory.

use crate::application::mutation::DirectoryMutationEngine;
use crate::domain::capability::ObjectRef;
use crate::domain::directory::{Entry, FileEntry};
use crate::domain::vfs::{FsError, HandleId, Location};
use bytes::Bytes;
use chrono::Utc;
use std::collections::HashMap;
use tracing::debug;

/// Largest file a write handle will buffer
pub const MAX_FILE_SIZE: u64 = 1 << 30;

#[derive(Debug)]
pub struct ReadHandle {
    location: Location,
    object: ObjectRef,
    position: u64,
    content: Option<Bytes>,
}

#[derive(Debug)]
pub struct WriteHandle {
    location: Location,
    buffer: Vec<u8>,
    position: u64,
}

impl WriteHandle {
    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[derive(Debug)]
pub enum OpenHandle {
    Read(ReadHandle),
    Write(WriteHandle),
}

impl OpenHandle {
    pub fn location(&self) -> &Location {
        match self {
            OpenHandle::Read(h) => &h.location,
            OpenHandle::Write(h) => &h.location,
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, OpenHandle::Write(_))
    }
}

/// Per-session handle table
///
/// Owned by exactly one session and dropped with it.
#[derive(Debug, Default)]
pub struct HandleTable {
    next_id: u32,
    handles: HashMap<HandleId, OpenHandle>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: OpenHandle) -> HandleId {
        self.next_id = self.next_id.wrapping_add(1);
        while self.handles.contains_key(&HandleId(self.next_id)) {
            self.next_id = self.next_id.wrapping_add(1);
        }
        let id = HandleId(self.next_id);
        self.handles.insert(id, handle);
        id
    }

    pub fn get_mut(&mut self, id: HandleId) -> Result<&mut OpenHandle, FsError> {
        self.handles.get_mut(&id).ok_or(FsError::InvalidHandle(id))
    }

    pub fn remove(&mut self, id: HandleId) -> Result<OpenHandle, FsError> {
        self.handles.remove(&id).ok_or(FsError::InvalidHandle(id))
    }

    /// Put a handle back under its old id after a failed close
    pub fn restore(&mut self, id: HandleId, handle: OpenHandle) {
        self.handles.insert(id, handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Drop every handle; returns how many uncommitted writes were discarded
    pub fn clear(&mut self) -> usize {
        let discarded = self.handles.values().filter(|h| h.is_write()).count();
        self.handles.clear();
        discarded
    }
}

#[derive(Clone)]
pub struct FileHandleManager {
    engine: DirectoryMutationEngine,
}

impl FileHandleManager {
    pub fn new(engine: DirectoryMutationEngine) -> Self {
        Self { engine }
    }

    /// Open an existing file for reading
    pub async fn open_read(&self, location: &Location) -> Result<OpenHandle, FsError> {
        match self.engine.resolver().resolve(location).await? {
            Entry::File(file) => Ok(OpenHandle::Read(ReadHandle {
                location: location.clone(),
                object: file.object,
                position: 0,
                content: None,
            })),
            Entry::Dir { .. } => Err(FsError::IsADirectory(location.to_string())),
        }
    }

    /// Open a file for writing
    ///
    /// The parent must already exist. Without `truncate`, an existing
    /// file's bytes seed the buffer.
    pub async fn open_write(&self, location: &Location, truncate: bool) -> Result<OpenHandle, FsError> {
        let (parent, name) = self.engine.resolver().resolve_parent(location).await?;
        let buffer = match parent.entries.get(&name) {
            Some(Entry::Dir { .. }) => return Err(FsError::IsADirectory(location.to_string())),
            Some(Entry::File(file)) if !truncate => {
                self.engine.resolver().store().get(&file.object).await?.to_vec()
            }
            _ => Vec::new(),
        };

        Ok(OpenHandle::Write(WriteHandle {
            location: location.clone(),
            buffer,
            position: 0,
        }))
    }

    /// Read up to `length` bytes, optionally seeking to `offset` first
    ///
    /// Returns fewer bytes near the end and none at EOF.
    pub async fn read(&self, handle: &mut OpenHandle, offset: Option<u64>, length: usize) -> Result<Bytes, FsError> {
        let handle = match handle {
            OpenHandle::Read(h) => h,
            OpenHandle::Write(h) => {
                return Err(FsError::PermissionDenied(format!(
                    "{} is open for writing",
                    h.location
                )))
            }
        };

        if let Some(offset) = offset {
            handle.position = offset;
        }

        let content = match &handle.content {
            Some(content) => content.clone(),
            None => {
                let fetched = self.engine.resolver().store().get(&handle.object).await?;
                handle.content = Some(fetched.clone());
                fetched
            }
        };

        let len = content.len() as u64;
        let start = handle.position.min(len);
        let end = start.saturating_add(length as u64).min(len);
        handle.position = end;
        Ok(content.slice(start as usize..end as usize))
    }

    /// Write `data` at `offset` (or the current position) into the buffer
    ///
    /// Writing past the end pads the gap with zero bytes.
    pub fn write(&self, handle: &mut OpenHandle, offset: Option<u64>, data: &[u8]) -> Result<usize, FsError> {
        let handle = match handle {
            OpenHandle::Write(h) => h,
            OpenHandle::Read(h) => {
                return Err(FsError::PermissionDenied(format!(
                    "{} is open for reading",
                    h.location
                )))
            }
        };

        let start = offset.unwrap_or(handle.position);
        let end = start
            .checked_add(data.len() as u64)
            .filter(|end| *end <= MAX_FILE_SIZE)
            .ok_or_else(|| {
                FsError::InvalidArgument(format!("write beyond {} byte limit", MAX_FILE_SIZE))
            })?;

        let (start, end) = (start as usize, end as usize);
        if handle.buffer.len() < end {
            handle.buffer.resize(end, 0);
        }
        handle.buffer[start..end].copy_from_slice(data);
        handle.position = end as u64;
        Ok(data.len())
    }

    /// Store the buffer and link it at the handle's path
    ///
    /// The handle is left untouched so a failed commit can be retried.
    pub async fn commit(&self, handle: &WriteHandle) -> Result<FileEntry, FsError> {
        let data = Bytes::copy_from_slice(&handle.buffer);
        let object = self.engine.resolver().store().put(data).await?;
        let file = FileEntry {
            object,
            mtime: Utc::now().timestamp(),
        };
        self.engine.link_file(&handle.location, file.clone()).await?;

        metrics::counter!("capgrid_bytes_committed_total").increment(file.size());
        debug!(path = %handle.location, size = file.size(), "Committed file");
        Ok(file)
    }
}
