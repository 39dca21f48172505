// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Storage Infrastructure Module
//!
//! Concrete `CapabilityStore` implementations. Neither performs erasure
//! coding; both honour the versioned directory update contract.

pub mod memory;
pub mod local;

pub use local::LocalCapabilityStore;
pub use memory::InMemoryCapabilityStore;

use crate::domain::storage::{CapabilityStore, StoreError};
use std::path::PathBuf;
use std::sync::Arc;

/// Storage backend configuration
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// Content-addressed files under a node's `grid/` directory
    Local { base_path: PathBuf },

    /// Ephemeral, process-local store
    Memory,
}

/// Factory function to create a store from configuration
pub fn create_capability_store(backend: StorageBackend) -> Result<Arc<dyn CapabilityStore>, StoreError> {
    match backend {
        StorageBackend::Local { base_path } => Ok(Arc::new(LocalCapabilityStore::new(base_path)?)),
        StorageBackend::Memory => Ok(Arc::new(InMemoryCapabilityStore::new())),
    }
}
