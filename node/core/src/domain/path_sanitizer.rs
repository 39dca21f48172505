// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0
//! Path Sanitizer Domain Service
//!
//! Normalizes client-supplied paths into segment lists and keeps every
//! session inside its own root capability. Clients may use `..`, but only
//! lexically: it pops a segment of the path being built and can never climb
//! above the session root.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Path normalization and traversal prevention

use crate::domain::directory::is_valid_entry_name;
use std::fmt;
use thiserror::Error;

/// Path sanitization errors
#[derive(Debug, Error)]
pub enum PathSanitizerError {
    #[error("Path traversal above session root: {0}")]
    PathTraversal(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path too long: {0}")]
    PathTooLong(String),
}

/// A normalized path, as a list of entry names
///
/// The empty path is the directory the path is anchored at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VirtualPath {
    segments: Vec<String>,
}

impl VirtualPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Split into parent path and final name
    pub fn split_last(&self) -> Option<(VirtualPath, &str)> {
        let (last, parent) = self.segments.split_last()?;
        Some((
            VirtualPath {
                segments: parent.to_vec(),
            },
            last.as_str(),
        ))
    }

    pub fn join(&self, other: &VirtualPath) -> VirtualPath {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        VirtualPath { segments }
    }

    /// First `len` segments
    pub fn prefix(&self, len: usize) -> VirtualPath {
        VirtualPath {
            segments: self.segments[..len.min(self.segments.len())].to_vec(),
        }
    }

    /// True if `self` lies strictly beneath `ancestor`
    pub fn is_strictly_under(&self, ancestor: &VirtualPath) -> bool {
        self.segments.len() > ancestor.segments.len()
            && self.segments.starts_with(&ancestor.segments)
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

/// Where a normalized path starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathAnchor {
    /// The session root capability
    Root,
    /// The session's current working directory
    WorkingDirectory,
}

/// Output of `PathSanitizer::normalize`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPath {
    pub anchor: PathAnchor,
    /// Path relative to `anchor`
    pub relative: VirtualPath,
    /// The same path relative to the session root
    pub absolute: VirtualPath,
}

/// Path sanitizer domain service
///
/// # Rules
/// - Empty segments and `.` are dropped
/// - A leading `/` anchors the path at the session root
/// - `..` pops one segment; popping past the session root is rejected
/// - Paths containing `..` are rewritten into root-anchored paths
/// - NUL bytes are rejected
pub struct PathSanitizer {
    /// Maximum allowed path length (default: 4096)
    max_path_len: usize,
}

impl PathSanitizer {
    /// Create a new path sanitizer with default settings
    pub fn new() -> Self {
        Self { max_path_len: 4096 }
    }

    /// Create a path sanitizer with custom max length
    pub fn with_max_length(max_path_len: usize) -> Self {
        Self { max_path_len }
    }

    /// Normalize `path` as seen from `cwd` (a root-relative path)
    ///
    /// # Examples
    /// ```
    /// use capgrid_core::domain::path_sanitizer::{PathAnchor, PathSanitizer, VirtualPath};
    ///
    /// let sanitizer = PathSanitizer::new();
    /// let cwd = sanitizer.normalize("/childdir", &VirtualPath::root()).unwrap().absolute;
    ///
    /// let p = sanitizer.normalize("myfile2", &cwd).unwrap();
    /// assert_eq!(p.anchor, PathAnchor::WorkingDirectory);
    /// assert_eq!(p.absolute.to_string(), "/childdir/myfile2");
    ///
    /// let up = sanitizer.normalize("../other", &cwd).unwrap();
    /// assert_eq!(up.anchor, PathAnchor::Root);
    /// assert_eq!(up.relative.to_string(), "/other");
    ///
    /// assert!(sanitizer.normalize("../..", &cwd).is_err());
    /// ```
    pub fn normalize(&self, path: &str, cwd: &VirtualPath) -> Result<NormalizedPath, PathSanitizerError> {
        if path.len() > self.max_path_len {
            return Err(PathSanitizerError::PathTooLong(path.to_string()));
        }

        if path.contains('\0') {
            tracing::warn!(path = %path.escape_debug(), "Path contains null byte");
            return Err(PathSanitizerError::InvalidPath(
                "Path contains null byte".to_string(),
            ));
        }

        let absolute_input = path.starts_with('/');
        let parts: Vec<&str> = path
            .split('/')
            .filter(|part| !part.is_empty() && *part != ".")
            .collect();

        if parts.contains(&"..") {
            let mut segments = if absolute_input {
                Vec::new()
            } else {
                cwd.segments.clone()
            };
            for part in parts {
                if part == ".." {
                    if segments.pop().is_none() {
                        tracing::warn!(path = %path, "Path climbs above session root");
                        return Err(PathSanitizerError::PathTraversal(path.to_string()));
                    }
                } else {
                    segments.push(validated(part, path)?);
                }
            }
            let absolute = VirtualPath { segments };
            return Ok(NormalizedPath {
                anchor: PathAnchor::Root,
                relative: absolute.clone(),
                absolute,
            });
        }

        let relative = VirtualPath {
            segments: parts
                .into_iter()
                .map(|part| validated(part, path))
                .collect::<Result<_, _>>()?,
        };

        if absolute_input {
            Ok(NormalizedPath {
                anchor: PathAnchor::Root,
                absolute: relative.clone(),
                relative,
            })
        } else {
            Ok(NormalizedPath {
                anchor: PathAnchor::WorkingDirectory,
                absolute: cwd.join(&relative),
                relative,
            })
        }
    }
}

fn validated(part: &str, path: &str) -> Result<String, PathSanitizerError> {
    if is_valid_entry_name(part) {
        Ok(part.to_string())
    } else {
        Err(PathSanitizerError::InvalidPath(path.to_string()))
    }
}

impl Default for PathSanitizer {
    fn default() -> Self {
        Self::new()
    }
}
