// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Virtual Filesystem Vocabulary
//!
//! Types shared by the resolver, the handle manager, the mutation engine
//! and the session orchestrator: the error taxonomy surfaced to clients,
//! handle identifiers, open modes and stat results.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Protocol-independent filesystem types

use crate::domain::capability::DirCap;
use crate::domain::directory::EntryKind;
use crate::domain::path_sanitizer::{PathSanitizerError, VirtualPath};
use crate::domain::storage::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors returned to a client session
///
/// Every variant maps to a stable protocol error code (see `code`).
/// `AuthenticationFailed` carries no detail on purpose.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("No such file or directory: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Directory not empty: {0}")]
    NotEmpty(String),

    #[error("Concurrent update conflict on {path} after {attempts} attempts")]
    Conflict { path: String, attempts: u32 },

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid file handle: {0}")]
    InvalidHandle(HandleId),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl FsError {
    /// Protocol error code
    pub fn code(&self) -> &'static str {
        match self {
            FsError::NotFound(_) => "not_found",
            FsError::NotADirectory(_) => "not_a_directory",
            FsError::IsADirectory(_) => "is_a_directory",
            FsError::AlreadyExists(_) => "already_exists",
            FsError::NotEmpty(_) => "not_empty",
            FsError::Conflict { .. } => "conflict",
            FsError::AuthenticationFailed => "authentication_failed",
            FsError::NotAuthenticated => "not_authenticated",
            FsError::StoreUnavailable(_) => "store_unavailable",
            FsError::PermissionDenied(_) => "permission_denied",
            FsError::InvalidHandle(_) => "invalid_handle",
            FsError::InvalidArgument(_) => "invalid_argument",
        }
    }

    /// Errors after which a failed commit leaves the write handle open
    pub fn is_retryable_commit(&self) -> bool {
        matches!(self, FsError::StoreUnavailable(_) | FsError::Conflict { .. })
    }
}

impl From<StoreError> for FsError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { dir, .. } => FsError::Conflict {
                path: dir.to_string(),
                attempts: 1,
            },
            other => FsError::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<PathSanitizerError> for FsError {
    fn from(err: PathSanitizerError) -> Self {
        match err {
            PathSanitizerError::PathTraversal(path) => FsError::PermissionDenied(path),
            other => FsError::InvalidArgument(other.to_string()),
        }
    }
}

/// Session-scoped file handle identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleId(pub u32);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// File open mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write { truncate: bool },
}

/// Result of a stat call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    pub kind: EntryKind,
    pub size: u64,
    /// Unix timestamp; zero for directories
    pub mtime: i64,
}

impl FileStat {
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// A path pinned to the directory it is resolved from
///
/// `base` is either the session root or the working directory capability.
/// `absolute` is the same location relative to the session root, used for
/// messages, events and lexical checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub base: DirCap,
    pub path: VirtualPath,
    pub absolute: VirtualPath,
}

impl Location {
    pub fn new(base: DirCap, path: VirtualPath, absolute: VirtualPath) -> Self {
        Self { base, path, absolute }
    }

    /// Location rooted directly at `root`
    pub fn from_root(root: DirCap, path: VirtualPath) -> Self {
        Self {
            base: root,
            absolute: path.clone(),
            path,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.absolute.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::capability::Version;

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            FsError::NotFound("a".into()),
            FsError::NotADirectory("a".into()),
            FsError::IsADirectory("a".into()),
            FsError::AlreadyExists("a".into()),
            FsError::NotEmpty("a".into()),
            FsError::Conflict { path: "a".into(), attempts: 5 },
            FsError::AuthenticationFailed,
            FsError::StoreUnavailable("down".into()),
        ];
        let mut codes: Vec<_> = errors.iter().map(FsError::code).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_store_error_mapping() {
        let conflict = StoreError::Conflict {
            dir: DirCap::generate(),
            expected: Version::INITIAL,
            actual: Version::INITIAL.next(),
        };
        assert!(matches!(FsError::from(conflict), FsError::Conflict { .. }));
        assert!(matches!(
            FsError::from(StoreError::Unavailable("gone".into())),
            FsError::StoreUnavailable(_)
        ));
    }

    #[test]
    fn test_traversal_maps_to_permission_denied() {
        let err = FsError::from(PathSanitizerError::PathTraversal("/..".into()));
        assert_eq!(err.code(), "permission_denied");
    }
}
