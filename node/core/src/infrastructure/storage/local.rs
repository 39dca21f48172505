// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Local Filesystem Capability Store
//!
//! Single-node store used by `capgrid run` and by `add-account` to mint
//! account roots. Layout under the base path:
//!
//! ```text
//! objects/<hex sha-256>   immutable object bytes
//! dirs/<dir id>           bincode DirectoryRecord
//! ```
//!
//! **Limitations:**
//! - No erasure coding or replication
//! - Directory updates are serialized within one process only

use crate::domain::capability::{DirCap, DirRef, ObjectRef, Version};
use crate::domain::directory::{DirectoryEntries, DirectorySnapshot};
use crate::domain::storage::{CapabilityStore, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
struct DirectoryRecord {
    version: Version,
    entries: DirectoryEntries,
}

pub struct LocalCapabilityStore {
    base_path: PathBuf,
    /// Held for the read-compare-write of a directory update
    update_lock: Mutex<()>,
}

impl LocalCapabilityStore {
    /// Create a store rooted at `base_path`, creating its directories
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_path = base_path.into();
        for sub in ["objects", "dirs"] {
            std::fs::create_dir_all(base_path.join(sub)).map_err(|e| {
                StoreError::IoError(format!(
                    "Failed to create store directory {}: {}",
                    base_path.join(sub).display(),
                    e
                ))
            })?;
        }

        Ok(Self {
            base_path,
            update_lock: Mutex::new(()),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn object_path(&self, object: &ObjectRef) -> PathBuf {
        self.base_path.join("objects").join(object.digest.to_hex())
    }

    fn dir_path(&self, cap: &DirCap) -> PathBuf {
        self.base_path.join("dirs").join(cap.0.simple().to_string())
    }

    async fn read_record(&self, cap: &DirCap) -> Result<DirectoryRecord, StoreError> {
        let raw = match tokio::fs::read(self.dir_path(cap)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::DirectoryNotFound(*cap)),
            Err(e) => return Err(e.into()),
        };
        Ok(bincode::deserialize(&raw)?)
    }

    async fn write_record(&self, cap: &DirCap, record: &DirectoryRecord) -> Result<(), StoreError> {
        let encoded = bincode::serialize(record)?;
        write_atomically(&self.dir_path(cap), &encoded).await
    }
}

/// Write to a sibling temp file, then rename over `path`
async fn write_atomically(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));
    tokio::fs::write(&tmp, data).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[async_trait]
impl CapabilityStore for LocalCapabilityStore {
    async fn put(&self, data: Bytes) -> Result<ObjectRef, StoreError> {
        let object = ObjectRef::for_content(&data);
        let path = self.object_path(&object);
        if tokio::fs::try_exists(&path).await? {
            return Ok(object);
        }
        write_atomically(&path, &data).await?;
        debug!(object = %object, "Stored object");
        Ok(object)
    }

    async fn get(&self, object: &ObjectRef) -> Result<Bytes, StoreError> {
        let data = match tokio::fs::read(self.object_path(object)).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::ObjectNotFound(object.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if ObjectRef::for_content(&data).digest != object.digest || data.len() as u64 != object.size {
            return Err(StoreError::Corrupt(object.to_string()));
        }
        Ok(Bytes::from(data))
    }

    async fn put_mutable(&self, entries: DirectoryEntries) -> Result<DirRef, StoreError> {
        let cap = DirCap::generate();
        let record = DirectoryRecord {
            version: Version::INITIAL,
            entries,
        };
        self.write_record(&cap, &record).await?;
        Ok(DirRef::new(cap, Version::INITIAL))
    }

    async fn get_mutable(&self, dir: &DirCap) -> Result<DirectorySnapshot, StoreError> {
        let record = self.read_record(dir).await?;
        Ok(DirectorySnapshot {
            dir: DirRef::new(*dir, record.version),
            entries: record.entries,
        })
    }

    async fn update_mutable(&self, dir: &DirRef, entries: DirectoryEntries) -> Result<DirRef, StoreError> {
        let _guard = self.update_lock.lock().await;
        let current = self.read_record(&dir.cap).await?;
        if current.version != dir.version {
            return Err(StoreError::Conflict {
                dir: dir.cap,
                expected: dir.version,
                actual: current.version,
            });
        }

        let record = DirectoryRecord {
            version: current.version.next(),
            entries,
        };
        self.write_record(&dir.cap, &record).await?;
        Ok(DirRef::new(dir.cap, record.version))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let objects = self.base_path.join("objects");
        match tokio::fs::metadata(&objects).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(StoreError::Unavailable(format!("{} is not a directory", objects.display()))),
            Err(e) => Err(StoreError::Unavailable(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::directory::{Entry, FileEntry};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_objects_persist_across_instances() {
        let temp = TempDir::new().unwrap();
        let object = {
            let store = LocalCapabilityStore::new(temp.path()).unwrap();
            store.put(Bytes::from_static(b"payload")).await.unwrap()
        };
        let reopened = LocalCapabilityStore::new(temp.path()).unwrap();
        assert_eq!(reopened.get(&object).await.unwrap(), Bytes::from_static(b"payload"));
    }

    #[tokio::test]
    async fn test_corrupt_object_detected() {
        let temp = TempDir::new().unwrap();
        let store = LocalCapabilityStore::new(temp.path()).unwrap();
        let object = store.put(Bytes::from_static(b"payload")).await.unwrap();
        std::fs::write(store.object_path(&object), b"tampered").unwrap();
        assert!(matches!(store.get(&object).await, Err(StoreError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_directory_versions() {
        let temp = TempDir::new().unwrap();
        let store = LocalCapabilityStore::new(temp.path()).unwrap();
        let dir = store.put_mutable(DirectoryEntries::new()).await.unwrap();

        let object = store.put(Bytes::from_static(b"abc")).await.unwrap();
        let mut entries = DirectoryEntries::new();
        entries.insert("f".to_string(), Entry::File(FileEntry { object, mtime: 7 }));
        let updated = store.update_mutable(&dir, entries).await.unwrap();

        let snapshot = store.get_mutable(&dir.cap).await.unwrap();
        assert_eq!(snapshot.dir, updated);
        assert_eq!(snapshot.names(), vec!["f"]);

        let stale = store.update_mutable(&dir, DirectoryEntries::new()).await;
        assert!(matches!(stale, Err(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_unknown_directory() {
        let temp = TempDir::new().unwrap();
        let store = LocalCapabilityStore::new(temp.path()).unwrap();
        let cap = DirCap::generate();
        assert!(matches!(
            store.get_mutable(&cap).await,
            Err(StoreError::DirectoryNotFound(c)) if c == cap
        ));
        assert!(store.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_health_check_detects_missing_objects() {
        let temp = TempDir::new().unwrap();
        let store = LocalCapabilityStore::new(temp.path()).unwrap();
        std::fs::remove_dir_all(temp.path().join("objects")).unwrap();
        assert!(matches!(
            store.health_check().await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
