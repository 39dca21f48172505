// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Capability References
//!
//! Value types naming objects held by the capability store. Nothing in
//! here points at memory: a reference is an identifier (plus a version for
//! mutable directories) and can be copied, compared and written to disk.
//!
//! - `ObjectRef` names an immutable, content-addressed blob.
//! - `DirCap` names a mutable directory. It is what directory entries and
//!   account tables hold.
//! - `DirRef` is a `DirCap` observed at a particular `Version`. The version
//!   is what `update_mutable` compares to detect concurrent writers.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Capability value types and their `URI:` text forms

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

const CHK_PREFIX: &str = "URI:CHK:";
const DIR_PREFIX: &str = "URI:DIR2:";

/// Capability text parsing errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CapabilityParseError {
    #[error("Unrecognized capability: {0}")]
    UnknownPrefix(String),

    #[error("Malformed capability: {0}")]
    Malformed(String),
}

/// SHA-256 digest of an object's content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentDigest(pub [u8; 32]);

impl ContentDigest {
    /// Digest `data`
    pub fn of(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, CapabilityParseError> {
        let bytes = hex::decode(s).map_err(|_| CapabilityParseError::Malformed(s.to_string()))?;
        let digest: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CapabilityParseError::Malformed(s.to_string()))?;
        Ok(Self(digest))
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Optional per-object integrity key supplied by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntegrityKey(pub [u8; 16]);

impl IntegrityKey {
    fn from_hex(s: &str) -> Result<Self, CapabilityParseError> {
        let bytes = hex::decode(s).map_err(|_| CapabilityParseError::Malformed(s.to_string()))?;
        let key: [u8; 16] = bytes
            .try_into()
            .map_err(|_| CapabilityParseError::Malformed(s.to_string()))?;
        Ok(Self(key))
    }
}

/// Reference to an immutable content-addressed blob
///
/// Never mutated once created. Replacing a file's content produces a new
/// `ObjectRef`; the old object stays in the store until the store's own
/// garbage collection decides otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub digest: ContentDigest,
    pub size: u64,
    pub key: Option<IntegrityKey>,
}

impl ObjectRef {
    /// Reference for `data` without an integrity key
    pub fn for_content(data: &[u8]) -> Self {
        Self {
            digest: ContentDigest::of(data),
            size: data.len() as u64,
            key: None,
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}{}:{}:{}", CHK_PREFIX, hex::encode(key.0), self.digest, self.size),
            None => write!(f, "{}{}:{}", CHK_PREFIX, self.digest, self.size),
        }
    }
}

impl FromStr for ObjectRef {
    type Err = CapabilityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix(CHK_PREFIX)
            .ok_or_else(|| CapabilityParseError::UnknownPrefix(s.to_string()))?;
        let parts: Vec<&str> = body.split(':').collect();
        let (key, digest, size) = match parts.as_slice() {
            [digest, size] => (None, *digest, *size),
            [key, digest, size] => (Some(IntegrityKey::from_hex(key)?), *digest, *size),
            _ => return Err(CapabilityParseError::Malformed(s.to_string())),
        };
        Ok(Self {
            digest: ContentDigest::from_hex(digest)?,
            size: size
                .parse()
                .map_err(|_| CapabilityParseError::Malformed(s.to_string()))?,
            key,
        })
    }
}

/// Capability for a mutable directory object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DirCap(pub Uuid);

impl DirCap {
    /// Mint a fresh, unguessable directory capability
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for DirCap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", DIR_PREFIX, self.0.simple())
    }
}

impl FromStr for DirCap {
    type Err = CapabilityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix(DIR_PREFIX)
            .ok_or_else(|| CapabilityParseError::UnknownPrefix(s.to_string()))?;
        Uuid::parse_str(body)
            .map(Self)
            .map_err(|_| CapabilityParseError::Malformed(s.to_string()))
    }
}

/// Monotonic version of a mutable directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version(pub u64);

impl Version {
    pub const INITIAL: Version = Version(1);

    pub fn next(self) -> Self {
        Version(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A directory capability observed at a specific version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirRef {
    pub cap: DirCap,
    pub version: Version,
}

impl DirRef {
    pub fn new(cap: DirCap, version: Version) -> Self {
        Self { cap, version }
    }
}

impl fmt::Display for DirRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.cap, self.version)
    }
}
