// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Capability Store Trait - Anti-Corruption Layer for the grid
//!
//! Abstracts the external engine that turns bytes into redundant encrypted
//! shares. The gateway only ever sees five primitives:
//!
//! - `put` / `get` for immutable, content-addressed objects
//! - `put_mutable` / `get_mutable` / `update_mutable` for directory objects
//!
//! `update_mutable` is the only compare-and-swap in the system. It must
//! succeed for at most one of two racing writers holding the same
//! `DirRef`; the loser gets `StoreError::Conflict` and retries against the
//! newer version.

use crate::domain::capability::{DirCap, DirRef, ObjectRef, Version};
use crate::domain::directory::{DirectoryEntries, DirectorySnapshot};
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Store interface consumed by the gateway
///
/// Every method is a suspension point. Implementations own timeouts and
/// transport retries; the gateway never retries `Unavailable`.
#[async_trait]
pub trait CapabilityStore: Send + Sync {
    /// Store an immutable object
    ///
    /// Storing identical bytes twice yields equal references.
    async fn put(&self, data: Bytes) -> Result<ObjectRef, StoreError>;

    /// Fetch an immutable object
    ///
    /// # Returns
    /// * `Ok(Bytes)` - Exactly the bytes passed to `put`
    /// * `Err(StoreError::ObjectNotFound)` - Unknown reference
    async fn get(&self, object: &ObjectRef) -> Result<Bytes, StoreError>;

    /// Create a new mutable directory object
    async fn put_mutable(&self, entries: DirectoryEntries) -> Result<DirRef, StoreError>;

    /// Fetch the current contents and version of a directory object
    async fn get_mutable(&self, dir: &DirCap) -> Result<DirectorySnapshot, StoreError>;

    /// Replace a directory's entries if its version is still `dir.version`
    ///
    /// # Returns
    /// * `Ok(DirRef)` - The directory at its new version
    /// * `Err(StoreError::Conflict)` - Another writer got there first
    async fn update_mutable(&self, dir: &DirRef, entries: DirectoryEntries) -> Result<DirRef, StoreError>;

    /// Check health of the store
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Directory not found: {0}")]
    DirectoryNotFound(DirCap),

    #[error("Version conflict on {dir}: expected {expected}, found {actual}")]
    Conflict {
        dir: DirCap,
        expected: Version,
        actual: Version,
    },

    #[error("Integrity check failed: {0}")]
    Corrupt(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::IoError(err.to_string())
    }
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
