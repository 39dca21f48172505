// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Directory Mutation Engine
//!
//! Every namespace change is the same loop: resolve the parent, compute the
//! parent's new entry map, then `update_mutable` against the version that
//! was read. Losing a version race re-resolves from scratch and tries again,
//! up to `max_attempts` times, after which the caller gets `Conflict`.
//!
//! No lock is held across a store call. Two sessions racing on the same
//! directory serialize through the store's compare-and-swap alone.

use crate::application::resolver::PathResolver;
use crate::domain::capability::{DirCap, DirRef};
use crate::domain::directory::{DirectoryEntries, DirectorySnapshot, Entry, FileEntry};
use crate::domain::vfs::{FileStat, FsError, Location};
use tracing::{debug, warn};

pub const DEFAULT_COMMIT_RETRIES: u32 = 5;

#[derive(Clone)]
pub struct DirectoryMutationEngine {
    resolver: PathResolver,
    max_attempts: u32,
}

impl DirectoryMutationEngine {
    pub fn new(resolver: PathResolver, max_attempts: u32) -> Self {
        Self {
            resolver,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Create an empty directory at `location`
    pub async fn mkdir(&self, location: &Location) -> Result<DirCap, FsError> {
        let mut created: Option<DirCap> = None;

        for attempt in 1..=self.max_attempts {
            let (parent, name) = self.resolver.resolve_parent(location).await?;
            if parent.entries.contains_key(&name) {
                return Err(FsError::AlreadyExists(location.to_string()));
            }

            let cap = match created {
                Some(cap) => cap,
                None => {
                    let dir = self.resolver.store().put_mutable(DirectoryEntries::new()).await?;
                    created = Some(dir.cap);
                    dir.cap
                }
            };

            let mut entries = parent.entries.clone();
            entries.insert(name, Entry::Dir { cap });
            if self.try_update(&parent, entries, location, attempt).await?.is_some() {
                debug!(path = %location, "Created directory");
                return Ok(cap);
            }
        }

        Err(self.exhausted(location))
    }

    /// Remove an empty directory
    pub async fn rmdir(&self, location: &Location) -> Result<(), FsError> {
        for attempt in 1..=self.max_attempts {
            let (parent, name) = self.resolver.resolve_parent(location).await?;
            match parent.entries.get(&name) {
                None => return Err(FsError::NotFound(location.to_string())),
                Some(Entry::File(_)) => return Err(FsError::NotADirectory(location.to_string())),
                Some(Entry::Dir { cap }) => {
                    let child = self.resolver.fetch_directory(cap).await?;
                    if !child.entries.is_empty() {
                        return Err(FsError::NotEmpty(location.to_string()));
                    }
                }
            }

            let mut entries = parent.entries.clone();
            entries.remove(&name);
            if self.try_update(&parent, entries, location, attempt).await?.is_some() {
                debug!(path = %location, "Removed directory");
                return Ok(());
            }
        }

        Err(self.exhausted(location))
    }

    /// Unlink a file. The object itself stays in the store.
    pub async fn remove(&self, location: &Location) -> Result<(), FsError> {
        for attempt in 1..=self.max_attempts {
            let (parent, name) = self.resolver.resolve_parent(location).await?;
            match parent.entries.get(&name) {
                None => return Err(FsError::NotFound(location.to_string())),
                Some(Entry::Dir { .. }) => return Err(FsError::IsADirectory(location.to_string())),
                Some(Entry::File(_)) => {}
            }

            let mut entries = parent.entries.clone();
            entries.remove(&name);
            if self.try_update(&parent, entries, location, attempt).await?.is_some() {
                debug!(path = %location, "Removed file");
                return Ok(());
            }
        }

        Err(self.exhausted(location))
    }

    /// Insert or replace a file entry at `location`
    ///
    /// Used by write-handle commits. Last commit wins.
    pub async fn link_file(&self, location: &Location, file: FileEntry) -> Result<(), FsError> {
        for attempt in 1..=self.max_attempts {
            let (parent, name) = self.resolver.resolve_parent(location).await?;
            if let Some(Entry::Dir { .. }) = parent.entries.get(&name) {
                return Err(FsError::IsADirectory(location.to_string()));
            }

            let mut entries = parent.entries.clone();
            entries.insert(name, Entry::File(file.clone()));
            if self.try_update(&parent, entries, location, attempt).await?.is_some() {
                return Ok(());
            }
        }

        Err(self.exhausted(location))
    }

    /// Move an entry by reference
    ///
    /// Both locations must be anchored at the same root so that the
    /// "beneath itself" check can be done on paths.
    pub async fn rename(&self, from: &Location, to: &Location) -> Result<(), FsError> {
        if from.absolute == to.absolute {
            self.resolver.resolve(from).await?;
            return Ok(());
        }

        for attempt in 1..=self.max_attempts {
            let (source, source_name) = self.resolver.resolve_parent(from).await?;
            let entry = source
                .entries
                .get(&source_name)
                .cloned()
                .ok_or_else(|| FsError::NotFound(from.to_string()))?;

            if entry.is_dir() && to.absolute.is_strictly_under(&from.absolute) {
                return Err(FsError::InvalidArgument(format!(
                    "cannot move {} beneath itself",
                    from
                )));
            }

            let (target, target_name) = self.resolver.resolve_parent(to).await?;
            self.check_rename_target(&entry, target.entries.get(&target_name), to)
                .await?;

            if source.dir.cap == target.dir.cap {
                let mut entries = source.entries.clone();
                entries.remove(&source_name);
                entries.insert(target_name, entry);
                if self.try_update(&source, entries, from, attempt).await?.is_some() {
                    debug!(from = %from, to = %to, "Renamed entry");
                    return Ok(());
                }
                continue;
            }

            let mut entries = target.entries.clone();
            entries.insert(target_name, entry.clone());
            if self.try_update(&target, entries, to, attempt).await?.is_none() {
                continue;
            }

            self.unlink_if_unchanged(from, &entry).await?;
            debug!(from = %from, to = %to, "Moved entry across directories");
            return Ok(());
        }

        Err(self.exhausted(from))
    }

    /// List entry names of the directory at `location`
    pub async fn list(&self, location: &Location) -> Result<Vec<String>, FsError> {
        Ok(self.resolver.resolve_directory(location).await?.names())
    }

    pub async fn stat(&self, location: &Location) -> Result<FileStat, FsError> {
        let entry = self.resolver.resolve(location).await?;
        let (size, mtime) = match &entry {
            Entry::File(file) => (file.size(), file.mtime),
            Entry::Dir { .. } => (0, 0),
        };
        Ok(FileStat {
            kind: entry.kind(),
            size,
            mtime,
        })
    }

    async fn check_rename_target(
        &self,
        moving: &Entry,
        existing: Option<&Entry>,
        to: &Location,
    ) -> Result<(), FsError> {
        match (moving, existing) {
            (_, None) => Ok(()),
            (Entry::File(_), Some(Entry::Dir { .. })) => Err(FsError::IsADirectory(to.to_string())),
            (Entry::Dir { .. }, Some(Entry::File(_))) => Err(FsError::NotADirectory(to.to_string())),
            (Entry::File(_), Some(Entry::File(_))) => Ok(()),
            (Entry::Dir { .. }, Some(Entry::Dir { cap })) => {
                let existing = self.resolver.fetch_directory(cap).await?;
                if existing.entries.is_empty() {
                    Ok(())
                } else {
                    Err(FsError::NotEmpty(to.to_string()))
                }
            }
        }
    }

    /// Second half of a cross-directory move
    ///
    /// Leaves the source alone if someone replaced or removed it meanwhile.
    async fn unlink_if_unchanged(&self, from: &Location, moved: &Entry) -> Result<(), FsError> {
        for attempt in 1..=self.max_attempts {
            let (source, name) = self.resolver.resolve_parent(from).await?;
            if source.entries.get(&name) != Some(moved) {
                return Ok(());
            }
            let mut entries = source.entries.clone();
            entries.remove(&name);
            if self.try_update(&source, entries, from, attempt).await?.is_some() {
                return Ok(());
            }
        }

        Err(self.exhausted(from))
    }

    /// One compare-and-swap; `None` when another writer won the race
    async fn try_update(
        &self,
        parent: &DirectorySnapshot,
        entries: DirectoryEntries,
        location: &Location,
        attempt: u32,
    ) -> Result<Option<DirRef>, FsError> {
        match self.resolver.store().update_mutable(&parent.dir, entries).await {
            Ok(dir) => Ok(Some(dir)),
            Err(e) if e.is_conflict() => {
                warn!(
                    path = %location,
                    attempt,
                    max_attempts = self.max_attempts,
                    "Directory update lost a version race, retrying"
                );
                metrics::counter!("capgrid_commit_conflicts_total").increment(1);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn exhausted(&self, location: &Location) -> FsError {
        FsError::Conflict {
            path: location.to_string(),
            attempts: self.max_attempts,
        }
    }
}
