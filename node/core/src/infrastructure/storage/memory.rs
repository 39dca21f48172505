// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! In-memory capability store, for tests and throwaway nodes

use crate::domain::capability::{ContentDigest, DirCap, DirRef, ObjectRef, Version};
use crate::domain::directory::{DirectoryEntries, DirectorySnapshot};
use crate::domain::storage::{CapabilityStore, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct InMemoryCapabilityStore {
    objects: RwLock<HashMap<ContentDigest, Bytes>>,
    directories: RwLock<HashMap<DirCap, (Version, DirectoryEntries)>>,
}

impl InMemoryCapabilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct immutable objects held
    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }
}

#[async_trait]
impl CapabilityStore for InMemoryCapabilityStore {
    async fn put(&self, data: Bytes) -> Result<ObjectRef, StoreError> {
        let object = ObjectRef::for_content(&data);
        self.objects.write().entry(object.digest).or_insert(data);
        Ok(object)
    }

    async fn get(&self, object: &ObjectRef) -> Result<Bytes, StoreError> {
        let data = self
            .objects
            .read()
            .get(&object.digest)
            .cloned()
            .ok_or_else(|| StoreError::ObjectNotFound(object.to_string()))?;
        if data.len() as u64 != object.size {
            return Err(StoreError::Corrupt(object.to_string()));
        }
        Ok(data)
    }

    async fn put_mutable(&self, entries: DirectoryEntries) -> Result<DirRef, StoreError> {
        let cap = DirCap::generate();
        self.directories.write().insert(cap, (Version::INITIAL, entries));
        Ok(DirRef::new(cap, Version::INITIAL))
    }

    async fn get_mutable(&self, dir: &DirCap) -> Result<DirectorySnapshot, StoreError> {
        let directories = self.directories.read();
        let (version, entries) = directories
            .get(dir)
            .ok_or(StoreError::DirectoryNotFound(*dir))?;
        Ok(DirectorySnapshot {
            dir: DirRef::new(*dir, *version),
            entries: entries.clone(),
        })
    }

    async fn update_mutable(&self, dir: &DirRef, entries: DirectoryEntries) -> Result<DirRef, StoreError> {
        let mut directories = self.directories.write();
        let (version, stored) = directories
            .get_mut(&dir.cap)
            .ok_or(StoreError::DirectoryNotFound(dir.cap))?;
        if *version != dir.version {
            return Err(StoreError::Conflict {
                dir: dir.cap,
                expected: dir.version,
                actual: *version,
            });
        }
        *version = version.next();
        *stored = entries;
        Ok(DirRef::new(dir.cap, *version))
    }
}
