// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Path Resolver
//!
//! Walks a normalized path from a base directory capability to its target
//! entry, fetching one directory object per segment. Nothing is cached:
//! every walk observes the directories as they are at that moment.

use crate::domain::capability::DirCap;
use crate::domain::directory::{DirectorySnapshot, Entry};
use crate::domain::path_sanitizer::VirtualPath;
use crate::domain::storage::CapabilityStore;
use crate::domain::vfs::{FsError, Location};
use std::sync::Arc;

#[derive(Clone)]
pub struct PathResolver {
    store: Arc<dyn CapabilityStore>,
}

impl PathResolver {
    pub fn new(store: Arc<dyn CapabilityStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CapabilityStore> {
        &self.store
    }

    /// Resolve `location` to its entry
    ///
    /// The empty path resolves to the base directory itself.
    ///
    /// # Errors
    /// * `NotFound` - a segment is missing
    /// * `NotADirectory` - a non-final segment names a file
    pub async fn resolve(&self, location: &Location) -> Result<Entry, FsError> {
        let segments = location.path.segments();
        let mut current = location.base;

        for (index, name) in segments.iter().enumerate() {
            let snapshot = self.store.get_mutable(&current).await?;
            let entry = snapshot
                .entries
                .get(name)
                .ok_or_else(|| FsError::NotFound(display_prefix(location, index + 1)))?;

            if index + 1 == segments.len() {
                return Ok(entry.clone());
            }

            match entry {
                Entry::Dir { cap } => current = *cap,
                Entry::File(_) => {
                    return Err(FsError::NotADirectory(display_prefix(location, index + 1)));
                }
            }
        }

        Ok(Entry::Dir { cap: current })
    }

    /// Resolve `location` and fetch it as a directory
    pub async fn resolve_directory(&self, location: &Location) -> Result<DirectorySnapshot, FsError> {
        match self.resolve(location).await? {
            Entry::Dir { cap } => self.fetch_directory(&cap).await,
            Entry::File(_) => Err(FsError::NotADirectory(location.to_string())),
        }
    }

    /// Resolve the parent directory of `location` and return it with the final name
    ///
    /// The base directory has no parent reachable from here, so an empty
    /// path is refused with `PermissionDenied`.
    pub async fn resolve_parent(&self, location: &Location) -> Result<(DirectorySnapshot, String), FsError> {
        let (parent_path, name) = location
            .path
            .split_last()
            .ok_or_else(|| FsError::PermissionDenied(location.to_string()))?;

        let parent = Location::new(location.base, parent_path, parent_of(&location.absolute));
        let snapshot = self.resolve_directory(&parent).await?;
        Ok((snapshot, name.to_string()))
    }

    pub async fn fetch_directory(&self, cap: &DirCap) -> Result<DirectorySnapshot, FsError> {
        Ok(self.store.get_mutable(cap).await?)
    }
}

fn parent_of(path: &VirtualPath) -> VirtualPath {
    path.split_last()
        .map(|(parent, _)| parent)
        .unwrap_or_default()
}

/// Root-relative text of the first `len` segments of `location.path`
fn display_prefix(location: &Location, len: usize) -> String {
    let base_depth = location
        .absolute
        .segments()
        .len()
        .saturating_sub(location.path.segments().len());
    location.absolute.prefix(base_depth + len).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::capability::ObjectRef;
    use crate::domain::directory::{DirectoryEntries, FileEntry};
    use crate::domain::path_sanitizer::PathSanitizer;
    use crate::infrastructure::storage::InMemoryCapabilityStore;

    fn at(root: DirCap, path: &str) -> Location {
        let normalized = PathSanitizer::new().normalize(path, &VirtualPath::root()).unwrap();
        Location::from_root(root, normalized.absolute)
    }

    async fn tree() -> (PathResolver, DirCap) {
        let store = Arc::new(InMemoryCapabilityStore::new());
        let mut child = DirectoryEntries::new();
        child.insert(
            "file".to_string(),
            Entry::File(FileEntry {
                object: ObjectRef::for_content(b"abc"),
                mtime: 0,
            }),
        );
        let child = store.put_mutable(child).await.unwrap();
        let mut root = DirectoryEntries::new();
        root.insert("dir".to_string(), Entry::Dir { cap: child.cap });
        let root = store.put_mutable(root).await.unwrap();
        (PathResolver::new(store), root.cap)
    }

    #[tokio::test]
    async fn test_resolve_nested_file() {
        let (resolver, root) = tree().await;
        let entry = resolver.resolve(&at(root, "/dir/file")).await.unwrap();
        assert!(matches!(entry, Entry::File(ref f) if f.size() == 3));
    }

    #[tokio::test]
    async fn test_empty_path_is_base() {
        let (resolver, root) = tree().await;
        let entry = resolver.resolve(&at(root, "")).await.unwrap();
        assert_eq!(entry, Entry::Dir { cap: root });
    }

    #[tokio::test]
    async fn test_missing_and_file_segments() {
        let (resolver, root) = tree().await;
        match resolver.resolve(&at(root, "/dir/nope/x")).await {
            Err(FsError::NotFound(path)) => assert_eq!(path, "/dir/nope"),
            other => panic!("unexpected: {:?}", other),
        }
        match resolver.resolve(&at(root, "/dir/file/x")).await {
            Err(FsError::NotADirectory(path)) => assert_eq!(path, "/dir/file"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolve_parent() {
        let (resolver, root) = tree().await;
        let (parent, name) = resolver.resolve_parent(&at(root, "/dir/new")).await.unwrap();
        assert_eq!(name, "new");
        assert_eq!(parent.names(), vec!["file"]);

        assert!(matches!(
            resolver.resolve_parent(&at(root, "/")).await,
            Err(FsError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_relative_location_reports_absolute_paths() {
        let (resolver, root) = tree().await;
        let Entry::Dir { cap: dir } = resolver.resolve(&at(root, "/dir")).await.unwrap() else {
            panic!("expected directory");
        };
        let sanitizer = PathSanitizer::new();
        let cwd = sanitizer.normalize("/dir", &VirtualPath::root()).unwrap().absolute;
        let normalized = sanitizer.normalize("missing", &cwd).unwrap();
        let location = Location::new(dir, normalized.relative, normalized.absolute);

        match resolver.resolve(&location).await {
            Err(FsError::NotFound(path)) => assert_eq!(path, "/dir/missing"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
